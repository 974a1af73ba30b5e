//! # TableSync Domain
//!
//! Business domain types for the table sync engine.
//!
//! This crate contains:
//! - Records, envelopes and platform connection profiles
//! - Sync job, progress and strategy types
//! - The `SyncError` taxonomy and Result alias
//! - Engine configuration structures and policy constants
//!
//! ## Architecture
//! - No dependencies on other TableSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
