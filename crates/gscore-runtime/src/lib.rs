//! gscore Runtime - orchestration layer for the message-routing core.
//!
//! This crate provides:
//! - Connection lifecycle and the dispatch loop ([`Runtime`])
//! - Layered configuration loading and validation ([`config`])
//! - Logging setup ([`logging`])
//!
//! ```ignore
//! use gscore_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::new();
//!     let help = runtime.sv("help", Default::default()).await?;
//!     help.on_fullmatch("help", |_bot, _event| async { "commands: help" });
//!
//!     let (handle, outbound) = ConnectionHandle::channel("onebot", 64);
//!     runtime.run_until_signal(runtime.serve(handle, frames)).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, CoreConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder, wait_for_shutdown};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
