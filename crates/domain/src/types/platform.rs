//! Platforms and connection profiles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ADAPTER_CONCURRENCY, FEISHU_BATCH_CAP, WECOM_BATCH_CAP};
use crate::errors::{Result, SyncError};

/// Supported table platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Feishu Bitable
    Feishu,
    /// DingTalk Notable
    Dingtalk,
    /// WeCom Smart Sheet
    Wecom,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Feishu, Self::Dingtalk, Self::Wecom];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feishu => "feishu",
            Self::Dingtalk => "dingtalk",
            Self::Wecom => "wecom",
        }
    }

    /// Observed batch and rate limits
    #[must_use]
    pub const fn capabilities(self) -> PlatformCapabilities {
        match self {
            Self::Feishu => PlatformCapabilities {
                native_batch: true,
                max_batch_size: FEISHU_BATCH_CAP,
                max_concurrency: DEFAULT_ADAPTER_CONCURRENCY,
                requests_per_second: 50,
            },
            Self::Dingtalk => PlatformCapabilities {
                native_batch: false,
                max_batch_size: 1,
                max_concurrency: DEFAULT_ADAPTER_CONCURRENCY,
                requests_per_second: 20,
            },
            Self::Wecom => PlatformCapabilities {
                native_batch: false,
                max_batch_size: WECOM_BATCH_CAP,
                max_concurrency: DEFAULT_ADAPTER_CONCURRENCY,
                requests_per_second: 10,
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "feishu" | "lark" => Ok(Self::Feishu),
            "dingtalk" | "ding" => Ok(Self::Dingtalk),
            "wecom" | "wework" | "wechat_work" => Ok(Self::Wecom),
            _ => Err(SyncError::UnsupportedPlatform(s.to_string())),
        }
    }
}

/// Batch and rate characteristics of a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub native_batch: bool,
    pub max_batch_size: usize,
    pub max_concurrency: usize,
    pub requests_per_second: u32,
}

/// App credentials used to mint access tokens
///
/// Platform-native names are accepted as aliases (`app_key`, `corp_id`,
/// `corp_secret`).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, alias = "app_key", alias = "corp_id")]
    pub app_id: String,
    #[serde(default, alias = "corp_secret")]
    pub app_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Where records are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Feishu `app_token`, DingTalk `base_id`, WeCom `doc_id`
    #[serde(default, alias = "app_token", alias = "base_id", alias = "doc_id")]
    pub workspace_id: String,
    /// Feishu `table_id`, DingTalk and WeCom `sheet_id`
    #[serde(default, alias = "sheet_id")]
    pub table_id: String,
    /// DingTalk operator union id
    #[serde(default)]
    pub operator_id: Option<String>,
}

/// One user-supplied connection profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub id: String,
    /// Raw platform identifier as entered by the user
    pub platform: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub destination: Destination,
    /// Overrides the platform's public API origin
    #[serde(default)]
    pub base_url: Option<String>,
}

impl PlatformConfig {
    pub fn new(id: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: id.into(),
            platform: platform.as_str().to_string(),
            name: None,
            credentials: Credentials::default(),
            destination: Destination::default(),
            base_url: None,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.credentials = Credentials { app_id: app_id.into(), app_secret: app_secret.into() };
        self
    }

    #[must_use]
    pub fn with_destination(
        mut self,
        workspace_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        self.destination.workspace_id = workspace_id.into();
        self.destination.table_id = table_id.into();
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator_id: impl Into<String>) -> Self {
        self.destination.operator_id = Some(operator_id.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Resolve the platform identifier
    ///
    /// # Errors
    /// Returns `SyncError::UnsupportedPlatform` for unrecognized identifiers.
    pub fn resolve_platform(&self) -> Result<Platform> {
        self.platform.parse()
    }
}

/// Check that every named field is non-blank
///
/// # Errors
/// Returns `SyncError::Configuration` listing every blank field, in the
/// order given.
pub fn require_fields(platform: Platform, fields: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| (*name).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Configuration { platform: platform.to_string(), missing })
    }
}
