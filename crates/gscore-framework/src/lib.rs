//! gscore Framework - modules, triggers and dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────────────────────┐
//! │   Runtime    │────▶│ Dispatcher │────▶│ SvRegistry (priority order)  │
//! │ (per frame)  │     │            │     │  └─ Sv "dice"                │
//! └──────────────┘     └─────┬──────┘     │      ├─ prefix  "!roll "     │
//!                            │            │      └─ fullmatch "dice"     │
//!                            ▼            └──────────────────────────────┘
//!                     Session task set ──▶ handler(Bot, Event) ──▶ Session::send
//! ```
//!
//! - **SvRegistry**: one [`Sv`] per name, policy persisted in a config store
//! - **Sv**: ordered trigger table plus policy (priority, enabled, permission, area, black list)
//! - **Trigger**: `(kind, pattern, handler)`; handlers are `tower` services
//! - **Dispatcher**: picks the first admitted, matching trigger and spawns it
//! - **Session / Bot**: outbound side of a connection, and its event-bound view
//!
//! # Example
//!
//! ```rust,ignore
//! use gscore_framework::{Bot, SvConfig, SvRegistry};
//! use gscore_core::{Event, MemoryStore};
//!
//! async fn roll(_bot: Bot, event: Event) -> anyhow::Result<String> {
//!     let sides: u32 = event.text.trim().parse()?;
//!     Ok(format!("d{sides}"))
//! }
//!
//! let registry = SvRegistry::new(Arc::new(MemoryStore::new()));
//! let sv = registry.get_or_create("dice", SvConfig::default()).await?;
//! sv.on_prefix("!roll ", roll);
//! ```

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod registry;
pub mod session;
pub mod sv;
pub mod trigger;

pub use dispatcher::{Dispatcher, Resolved};
pub use error::{SvError, SvResult};
pub use handler::{HandlerResponse, HandlerService};
pub use registry::SvRegistry;
pub use session::{Bot, Session};
pub use sv::{Area, Registered, SV_NAMESPACE, Sv, SvConfig, SvUpdate};
pub use trigger::{BoxedTriggerService, IntoPatterns, Trigger, TriggerKind};

pub use tower::{BoxError, Layer, ServiceBuilder};
