//! Access-token cache shared by the concurrent callers of one adapter

use std::future::Future;
use std::time::Duration;

use tablesync_domain::constants::TOKEN_REFRESH_MARGIN_SECS;
use tablesync_domain::{Credentials, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Token returned by a platform's token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub token: String,
    pub expires_in: Duration,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
    fingerprint: String,
}

/// Single-slot token cache
///
/// The lock is held while a token is minted, so concurrent callers wait for
/// one refresh instead of each minting their own.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    margin: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").field("margin", &self.margin).finish_non_exhaustive()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        let margin = u64::try_from(TOKEN_REFRESH_MARGIN_SECS).unwrap_or_default();
        Self::with_margin(Duration::from_secs(margin))
    }

    /// Cache that refreshes tokens `margin` before they expire
    pub fn with_margin(margin: Duration) -> Self {
        Self { slot: Mutex::new(None), margin }
    }

    /// Return the cached token or mint a new one
    ///
    /// A token is reused only when it was minted for the same credential
    /// fingerprint and stays valid for longer than the refresh margin.
    ///
    /// # Errors
    /// Propagates the error returned by `mint`; the slot is left empty.
    pub async fn get_or_refresh<F, Fut>(&self, fingerprint: &str, mint: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MintedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            let fresh = cached.expires_at > Instant::now() + self.margin;
            if cached.fingerprint == fingerprint && fresh {
                return Ok(cached.token.clone());
            }
        }

        *slot = None;
        let minted = mint().await?;
        debug!(expires_in_secs = minted.expires_in.as_secs(), "minted access token");
        *slot = Some(CachedToken {
            token: minted.token.clone(),
            expires_at: Instant::now() + minted.expires_in,
            fingerprint: fingerprint.to_string(),
        });
        Ok(minted.token)
    }

    /// Drop the cached token so the next call mints a fresh one
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

/// BLAKE3 fingerprint of the credentials that mint a token
pub fn fingerprint(credentials: &Credentials) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(credentials.app_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(credentials.app_secret.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}
