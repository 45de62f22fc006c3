//! Service verticals (SV): named modules of triggers plus policy.
//!
//! A [`Sv`] owns an ordered trigger table and a policy record
//! ([`SvConfig`]). Modules are created through
//! [`SvRegistry::get_or_create`](crate::registry::SvRegistry::get_or_create),
//! which guarantees one live module per name.
//!
//! # Policy updates
//!
//! The policy is held as an `Arc<SvConfig>` snapshot. [`Sv::set`] builds the
//! next record, persists it, and only then swaps the snapshot in, so readers
//! never observe a half-applied update and a failed write changes nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! let sv = registry.get_or_create("dice", SvConfig::default().with_priority(3)).await?;
//! sv.on_prefix("!roll ", roll);
//! sv.on_fullmatch(["roll", "dice"], roll_d6);
//! sv.disable().await?;
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower::{BoxError, Service};
use tracing::{debug, info, warn};

use crate::error::{SvError, SvResult};
use crate::handler::{HandlerResponse, HandlerService};
use crate::session::Bot;
use crate::trigger::{IntoPatterns, Trigger, TriggerKind};
use gscore_core::{BoxedConfigStore, Event, TargetType};

/// Store namespace holding one record per module.
pub const SV_NAMESPACE: &str = "sv";

// =============================================================================
// Policy
// =============================================================================

/// Scopes a module may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Area {
    /// Group chats only.
    Group,
    /// Direct messages only.
    Direct,
    /// Every scope.
    #[default]
    All,
}

impl Area {
    /// Returns whether events of scope kind `target` are admitted.
    pub fn admits(self, target: TargetType) -> bool {
        match self {
            Self::All => true,
            Self::Group => target == TargetType::Group,
            Self::Direct => target == TargetType::Direct,
        }
    }
}

/// Persisted policy of a module.
///
/// Missing fields in a stored record fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvConfig {
    /// Lower runs first.
    pub priority: i32,
    pub enabled: bool,
    /// Least privileged caller ordinal admitted (0 owner, 1 superuser, 2 chat admin, 3 everyone).
    pub permission: u8,
    /// Target ids the module ignores.
    pub black_list: Vec<String>,
    pub area: Area,
}

impl Default for SvConfig {
    fn default() -> Self {
        Self {
            priority: 5,
            enabled: true,
            permission: 3,
            black_list: Vec::new(),
            area: Area::All,
        }
    }
}

impl SvConfig {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_permission(mut self, permission: u8) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_area(mut self, area: Area) -> Self {
        self.area = area;
        self
    }

    pub fn with_black_list<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.black_list = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Returns why this policy rejects `event`, or `None` if it is admitted.
    pub fn rejection(&self, event: &Event) -> Option<&'static str> {
        if !self.enabled {
            Some("disabled")
        } else if !self.area.admits(event.user_type) {
            Some("scope")
        } else if self.black_list.iter().any(|id| id == event.target_id()) {
            Some("blacklisted")
        } else if event.user_pm > self.permission {
            Some("permission")
        } else {
            None
        }
    }

    fn apply(&self, update: SvUpdate) -> Self {
        Self {
            priority: update.priority.unwrap_or(self.priority),
            enabled: update.enabled.unwrap_or(self.enabled),
            permission: update.permission.unwrap_or(self.permission),
            black_list: update.black_list.unwrap_or_else(|| self.black_list.clone()),
            area: update.area.unwrap_or(self.area),
        }
    }
}

/// A partial policy change; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SvUpdate {
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub permission: Option<u8>,
    pub black_list: Option<Vec<String>>,
    pub area: Option<Area>,
}

impl SvUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn permission(mut self, permission: u8) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn black_list<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.black_list = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn area(mut self, area: Area) -> Self {
        self.area = Some(area);
        self
    }
}

// =============================================================================
// Registration report
// =============================================================================

/// Outcome of one registration call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registered {
    /// Patterns inserted by this call.
    pub added: Vec<String>,
    /// Patterns already present, left bound to their first handler.
    pub skipped: Vec<String>,
}

impl Registered {
    /// Returns `true` if nothing new was inserted.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

// =============================================================================
// Sv
// =============================================================================

/// A named module of triggers with its policy.
pub struct Sv {
    name: String,
    /// Position in registration order, used to break priority ties.
    seq: usize,
    config: RwLock<Arc<SvConfig>>,
    /// Serializes writers so persisted records are applied whole and in order.
    write_lock: tokio::sync::Mutex<()>,
    triggers: RwLock<Vec<Arc<Trigger>>>,
    store: BoxedConfigStore,
}

impl Sv {
    pub(crate) fn new(name: String, seq: usize, config: SvConfig, store: BoxedConfigStore) -> Self {
        Self {
            name,
            seq,
            config: RwLock::new(Arc::new(config)),
            write_lock: tokio::sync::Mutex::new(()),
            triggers: RwLock::new(Vec::new()),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn seq(&self) -> usize {
        self.seq
    }

    /// Current policy snapshot.
    pub fn config(&self) -> Arc<SvConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn priority(&self) -> i32 {
        self.config.read().priority
    }

    pub fn is_enabled(&self) -> bool {
        self.config.read().enabled
    }

    // -------------------------------------------------------------------------
    // Policy
    // -------------------------------------------------------------------------

    /// Applies `update`, persisting the full record before it takes effect.
    ///
    /// On a store failure the in-memory policy is left untouched.
    pub async fn set(&self, update: SvUpdate) -> SvResult<()> {
        let _guard = self.write_lock.lock().await;

        let next = self.config().apply(update);
        let record = serde_json::to_value(&next).map_err(|e| SvError::InvalidRecord {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.store.set(SV_NAMESPACE, &self.name, record).await?;

        *self.config.write() = Arc::new(next);
        debug!(sv = %self.name, "Module policy updated");
        Ok(())
    }

    pub async fn enable(&self) -> SvResult<()> {
        self.set(SvUpdate::new().enabled(true)).await
    }

    pub async fn disable(&self) -> SvResult<()> {
        self.set(SvUpdate::new().enabled(false)).await
    }

    // -------------------------------------------------------------------------
    // Triggers
    // -------------------------------------------------------------------------

    /// Registers `handler` for every pattern not yet present in this module.
    pub fn on<P, F, Fut, R>(&self, kind: TriggerKind, patterns: P, handler: F) -> Registered
    where
        P: IntoPatterns,
        F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResponse,
    {
        self.on_service(kind, patterns, HandlerService::new(handler))
    }

    /// Registers an arbitrary service, e.g. a handler wrapped in tower layers.
    pub fn on_service<P, S>(&self, kind: TriggerKind, patterns: P, service: S) -> Registered
    where
        P: IntoPatterns,
        S: Service<Bot, Response = ()> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        let mut report = Registered::default();
        let mut triggers = self.triggers.write();

        for pattern in patterns.into_patterns() {
            if let Some(existing) = triggers.iter().find(|t| t.pattern() == pattern) {
                if existing.kind() != kind {
                    warn!(
                        sv = %self.name,
                        pattern = %pattern,
                        existing = %existing.kind(),
                        requested = %kind,
                        "Pattern already registered with a different kind, keeping the first"
                    );
                }
                report.skipped.push(pattern);
                continue;
            }

            info!(sv = %self.name, kind = %kind, pattern = %pattern, "Trigger loaded");
            triggers.push(Arc::new(Trigger::new(kind, pattern.clone(), service.clone())));
            report.added.push(pattern);
        }

        report
    }

    pub fn on_prefix<P, F, Fut, R>(&self, patterns: P, handler: F) -> Registered
    where
        P: IntoPatterns,
        F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResponse,
    {
        self.on(TriggerKind::Prefix, patterns, handler)
    }

    pub fn on_suffix<P, F, Fut, R>(&self, patterns: P, handler: F) -> Registered
    where
        P: IntoPatterns,
        F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResponse,
    {
        self.on(TriggerKind::Suffix, patterns, handler)
    }

    pub fn on_keyword<P, F, Fut, R>(&self, patterns: P, handler: F) -> Registered
    where
        P: IntoPatterns,
        F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResponse,
    {
        self.on(TriggerKind::Keyword, patterns, handler)
    }

    pub fn on_fullmatch<P, F, Fut, R>(&self, patterns: P, handler: F) -> Registered
    where
        P: IntoPatterns,
        F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResponse,
    {
        self.on(TriggerKind::FullMatch, patterns, handler)
    }

    /// Snapshot of the trigger table in registration order.
    pub fn triggers(&self) -> Vec<Arc<Trigger>> {
        self.triggers.read().clone()
    }

    /// First trigger matching `text`, with the text its handler should see.
    pub fn find_trigger(&self, text: &str) -> Option<(Arc<Trigger>, String)> {
        self.triggers
            .read()
            .iter()
            .find_map(|t| t.matches(text).map(|rest| (Arc::clone(t), rest)))
    }
}

impl std::fmt::Debug for Sv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sv")
            .field("name", &self.name)
            .field("config", &self.config())
            .field("trigger_count", &self.triggers.read().len())
            .finish()
    }
}
