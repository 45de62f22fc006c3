//! Configuration for the gscore runtime.
//!
//! Settings are layered with figment (defaults, files, environment) and
//! checked by [`validate_config`] before the runtime uses them.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CoreConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SessionConfig, SpanEventConfig,
    StoreConfig, StoreKind,
};
pub use validation::validate_config;
