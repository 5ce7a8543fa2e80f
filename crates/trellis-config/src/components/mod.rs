//! Configuration sections.

mod execution;
mod logging;
mod sources;

pub use execution::ExecutionConfig;
pub use logging::LoggingConfig;
pub use sources::{SchemaConfig, StoreConfig};
