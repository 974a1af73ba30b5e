//! HTTP adapters for the supported table platforms

mod batch;
pub mod dingtalk;
pub mod feishu;
pub mod rate_limit;
mod response;
pub mod token;
pub mod wecom;

pub use dingtalk::DingtalkAdapter;
pub use feishu::FeishuAdapter;
pub use rate_limit::{parse_retry_after, RateLimitTracker};
pub use token::{fingerprint, MintedToken, TokenCache};
pub use wecom::WecomAdapter;
