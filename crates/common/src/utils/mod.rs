//! Common utility helpers
//!
//! - **[`serde`]**: serde adapters for `Duration` fields stored as milliseconds

pub mod serde;

pub use self::serde::duration_millis;
