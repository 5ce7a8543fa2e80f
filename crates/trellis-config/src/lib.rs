//! # Trellis configuration
//!
//! TOML configuration for the `trellis` tools:
//!
//! ```toml
//! [schema]
//! seed_path = "demos/bakery/schema.toml"
//!
//! [store]
//! fixtures_path = "demos/bakery/fixtures.json"
//!
//! [execution]
//! timeout_secs = 5
//!
//! [logging]
//! level = "info"
//! ansi = true
//! ```
//!
//! `TRELLIS_LOG` overrides `logging.level`.

mod components;
mod config;
mod error;

pub use components::*;
pub use config::*;
pub use error::ConfigError;
