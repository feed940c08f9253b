pub mod stage0_parse;
pub mod stage1_segment;
pub mod stage2_resolve;
pub mod stage3_persist;

pub use stage0_parse::*;
pub use stage1_segment::*;
pub use stage2_resolve::*;
pub use stage3_persist::*;
