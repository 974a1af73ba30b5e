//! Shared test helpers for `tablesync-core` integration tests.
//!
//! These helpers provide scripted adapters, an in-memory store and record
//! fixtures so engine tests can focus on behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod adapters;
pub mod fixtures;
pub mod store;

pub use adapters::{MockFactory, ScriptedAdapter};
pub use fixtures::{feishu_config, rewrite_record, rewrite_records};
pub use store::InMemoryStore;
