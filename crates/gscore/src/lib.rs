//! # gscore
//!
//! Message-routing core for a multi-platform chat-bot runtime.
//!
//! Feature code is grouped into named modules ("service verticals"), each
//! with its own policy (priority, enabled, permission, scope, black list)
//! and an ordered set of text triggers. Inbound messages are matched against
//! the triggers of every admitting module, in priority order, and the first
//! match runs its handler. Handlers reply through a [`Bot`](prelude::Bot)
//! bound to the connection the message came from.
//!
//! ```text
//! ┌────────────┐  frames  ┌─────────┐  Event  ┌────────────┐        ┌──────────────────┐
//! │ transport  │─────────▶│ Runtime │────────▶│ Dispatcher │───────▶│ handler(Bot, Ev) │
//! └────────────┘          └─────────┘         └────────────┘        └────────┬─────────┘
//!        ▲                                                                   │
//!        └──────────────── MessageSend envelopes ◀── Session ◀───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gscore::prelude::*;
//!
//! async fn ping(_bot: Bot, _event: Event) -> &'static str {
//!     "pong"
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::new();
//!     let sv = runtime.sv("ping", SvConfig::default()).await?;
//!     sv.on_fullmatch("ping", ping);
//!     // hand frames from a transport to `runtime.serve(...)`
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use gscore_core as core;
pub use gscore_framework as framework;
pub use gscore_runtime as runtime;

/// Commonly used types for writing modules and handlers.
pub mod prelude {
    pub use gscore_runtime::{CoreConfig, Runtime};

    pub use gscore_framework::{
        Area, Bot, HandlerResponse, HandlerService, Layer, ServiceBuilder, Sv, SvConfig,
        SvUpdate, TriggerKind,
    };

    pub use gscore_core::{ConnectionHandle, Event, Payload, Segment, TargetType};
}
