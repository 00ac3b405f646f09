//! Core data types: enums, instruments, catalog and published snapshots.

pub mod enums;
pub mod market_data;

pub use enums::*;
pub use market_data::*;
