//! Data mapping between local records and platform rows

pub mod fields;
pub mod mapper;
pub mod migration;
pub mod schema;
pub mod transform;

pub use fields::{coerce, FieldCodec};
pub use mapper::DataMapper;
pub use migration::{migrate, MigrationStep};
pub use schema::{FieldKind, FieldRule, RecordSchema};
pub use transform::{flatten_text_segments, transform_for_platform};
