pub mod logs;
pub mod twitter;

pub use logs::*;
