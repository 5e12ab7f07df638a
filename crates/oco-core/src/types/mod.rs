//! Core data types: enums, symbol metadata, and the order records the
//! registry persists.

pub mod enums;
pub mod symbol;
pub mod trading;

pub use enums::*;
pub use symbol::*;
pub use trading::*;
