//! Testing utilities and helpers
//!
//! - **[`fixtures`]**: seeded random generators for property-style tests
//!
//! ## Usage
//!
//! ```rust
//! use rand::SeedableRng;
//! use tablesync_common::testing::fixtures::random_fields;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let fields = random_fields(&mut rng, 4);
//! assert_eq!(fields.len(), 4);
//! ```

pub mod fixtures;

pub use crate::resilience::MockClock;
