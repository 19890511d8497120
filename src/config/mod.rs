//! Configuration for sitemill projects (`mill.toml`)

pub mod loader;
pub mod schema;

pub use loader::{default_config, find_config, load_config, CliOverrides, ConfigError};
pub use schema::*;
