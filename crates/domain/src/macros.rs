//! Macro for implementing Display and FromStr for label enums
//!
//! Job statuses, strategies, record types and error kinds all travel as
//! lowercase labels in persisted JSON and log fields. This macro keeps the
//! label table in one place per enum.
//!
//! # Example
//!
//! ```rust
//! use tablesync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Queued,
//!     Running,
//!     Done,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Queued => "queued",
//!     Running => "running",
//!     Done => "done",
//! });
//!
//! assert_eq!(Phase::Running.to_string(), "running");
//! assert_eq!("DONE".parse::<Phase>(), Ok(Phase::Done));
//! ```

/// Implements Display and FromStr for a fieldless enum
///
/// Parsing is case-insensitive; output is the label exactly as written.
/// Unknown labels produce `"Invalid <Enum>: <input>"`.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
