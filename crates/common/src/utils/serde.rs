//! Serde adapters for durations
//!
//! Configuration files and persisted sync snapshots store every duration as a
//! plain millisecond count so they stay readable in TOML and JSON alike.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde result type shared by the adapters below
type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

fn to_millis(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `Duration` stored as milliseconds (u64)
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use serde::{Deserialize, Serialize};
/// use tablesync_common::duration_millis;
///
/// #[derive(Serialize, Deserialize)]
/// struct Pacing {
///     #[serde(with = "duration_millis")]
///     batch_delay: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{to_millis, Deserialize, Deserializer, Duration, SerializeResult, Serializer};

    /// Serialize a Duration as milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(to_millis(duration))
    }

    /// Deserialize milliseconds into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
