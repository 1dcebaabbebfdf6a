pub mod control;
pub mod decision;

pub use control::*;
pub use decision::*;
