//! # TableSync Infrastructure
//!
//! Concrete implementations of the ports defined in `tablesync-core`:
//!
//! - **HTTP adapters** for Feishu Bitable, DingTalk Notable and WeCom Smart
//!   Sheet, each with a token cache and rate-limit bookkeeping
//! - **Adapter factory** handing those adapters to the table service
//! - **Key-value stores** in memory and on SQLite
//! - **Configuration** loading from the environment or JSON/TOML files
//! - **Logging** setup for `tracing`

pub mod adapters;
pub mod config;
pub mod errors;
pub mod factory;
pub mod http;
pub mod logging;
pub mod storage;

pub use adapters::{DingtalkAdapter, FeishuAdapter, RateLimitTracker, TokenCache, WecomAdapter};
pub use errors::InfraError;
pub use factory::HttpAdapterFactory;
pub use http::HttpClient;
pub use logging::init_tracing;
pub use storage::{MemoryStore, SqliteStore};
