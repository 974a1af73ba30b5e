//! Table service facade and adapter registry

pub mod facade;
pub mod registry;

pub use facade::TableService;
pub use registry::AdapterRegistry;
