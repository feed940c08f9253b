pub mod input;
pub mod output;
pub mod xml_tree;

pub use input::*;
pub use output::*;
