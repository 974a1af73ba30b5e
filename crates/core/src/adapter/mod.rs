//! Table platform adapter contract

pub mod ports;

pub use ports::*;
