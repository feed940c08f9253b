pub mod debate;
pub mod sitting;
pub mod speech;
pub mod talker;

pub use debate::*;
pub use sitting::*;
pub use speech::*;
pub use talker::*;
