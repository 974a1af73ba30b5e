//! Sync policy constants
//!
//! Observed platform limits and engine defaults. Most values can be
//! overridden through `EngineConfig`.

// Authentication
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

// HTTP
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_USER_AGENT: &str = concat!("tablesync/", env!("CARGO_PKG_VERSION"));

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

// Retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

// Strategy selection
pub const CONSERVATIVE_MAX_RECORDS: usize = 10;
pub const BALANCED_MAX_RECORDS: usize = 100;
pub const NATIVE_BATCH_THRESHOLD: usize = 10;

// Platform batch limits
pub const FEISHU_BATCH_CAP: usize = 100;
pub const FEISHU_BATCH_DELAY_MS: u64 = 100;
pub const WECOM_BATCH_CAP: usize = 100;
pub const WECOM_CHUNK_DELAY_MS: u64 = 500;
pub const DEFAULT_ADAPTER_CONCURRENCY: usize = 5;

// History
pub const JOB_HISTORY_LIMIT: usize = 100;
pub const ERROR_HISTORY_LIMIT: usize = 10;

// Storage keys
pub const RECORDS_KEY: &str = "records";
pub const PLATFORM_CONFIGS_KEY: &str = "platform_configs";
pub const SYNC_HISTORY_KEY: &str = "sync_history";

// Field coercion
pub const ARRAY_DELIMITER: &str = ", ";
pub const BOOL_TRUE_TOKEN: &str = "是";
pub const BOOL_FALSE_TOKEN: &str = "否";

// Record naming
pub const MAX_RECORD_NAME_CHARS: usize = 30;
pub const LOCAL_SOURCE: &str = "local";
