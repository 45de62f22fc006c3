//! Runtime orchestration: connection lifecycle and the dispatch loop.
//!
//! The runtime owns the module registry and one [`Session`] per live
//! backend connection. A transport hands it frames; the runtime decodes
//! them, dispatches the resulting events and tears sessions down when
//! connections go away.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gscore_runtime::Runtime;
//!
//! let runtime = Runtime::builder().config_file("gscore.toml").build()?;
//! let dice = runtime.sv("dice", SvConfig::default()).await?;
//! dice.on_prefix("!roll ", roll);
//!
//! let (handle, outbound) = ConnectionHandle::channel("onebot", 64);
//! runtime.serve(handle, inbound_frames).await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::signal;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, CoreConfig, StoreKind};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use gscore_core::{BoxedConfigStore, ConnectionHandle, JsonFileStore, MemoryStore, MessageReceive};
use gscore_framework::{Dispatcher, Session, Sv, SvConfig, SvRegistry};

/// The message-routing runtime.
pub struct Runtime {
    config: CoreConfig,
    registry: Arc<SvRegistry>,
    dispatcher: Dispatcher,
    /// Live sessions keyed by connection id.
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Runtime {
    /// Creates a runtime from the default configuration sources.
    ///
    /// Falls back to built-in defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                CoreConfig::default()
            });
        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from `config`, initializing logging and the config store.
    pub fn from_config(config: &CoreConfig) -> Self {
        logging::init_from_config(&config.logging);

        let store: BoxedConfigStore = match config.store.kind {
            StoreKind::Json => Arc::new(JsonFileStore::new(&config.store.path)),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };

        info!(
            log_level = %config.logging.level,
            store = ?config.store.kind,
            "Runtime initialized from configuration"
        );
        Self::with_store(config.clone(), store)
    }

    /// Creates a runtime over an existing store. Logging is left untouched.
    pub fn with_store(config: CoreConfig, store: BoxedConfigStore) -> Self {
        let registry = Arc::new(SvRegistry::new(store));
        Self {
            config,
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SvRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the module named `name`, creating it with `defaults` on first use.
    pub async fn sv(&self, name: &str, defaults: SvConfig) -> RuntimeResult<Arc<Sv>> {
        Ok(self.registry.get_or_create(name, defaults).await?)
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens a session for a new connection and returns its outbound frames.
    pub async fn connect(
        &self,
        connection_id: impl Into<String>,
    ) -> (Arc<Session>, mpsc::Receiver<Vec<u8>>) {
        let (handle, outbound) =
            ConnectionHandle::channel(connection_id, self.config.session.outbound_buffer);
        (self.attach(handle).await, outbound)
    }

    /// Opens a session over a handle the transport already created.
    ///
    /// A session already registered under the same id is closed and drained
    /// in the background.
    pub async fn attach(&self, handle: ConnectionHandle) -> Arc<Session> {
        let id = handle.id.clone();
        let session = Arc::new(Session::new(handle));

        let previous = self
            .sessions
            .write()
            .await
            .insert(id.clone(), Arc::clone(&session));
        if let Some(previous) = previous {
            warn!(connection = %id, "Connection replaced, draining previous session");
            previous.close();
            let grace = self.config.session.drain_timeout();
            tokio::spawn(async move {
                previous.drain(grace).await;
            });
        }

        info!(connection = %id, "Connection opened");
        session
    }

    pub async fn session(&self, connection_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(connection_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Decodes one inbound frame and dispatches it on the connection's session.
    ///
    /// Returns the handler task if a trigger matched.
    pub async fn on_message(
        &self,
        connection_id: &str,
        frame: &[u8],
    ) -> RuntimeResult<Option<JoinHandle<()>>> {
        let session = self
            .session(connection_id)
            .await
            .ok_or_else(|| RuntimeError::UnknownConnection(connection_id.to_string()))?;
        self.dispatch_frame(&session, frame)
    }

    fn dispatch_frame(
        &self,
        session: &Arc<Session>,
        frame: &[u8],
    ) -> RuntimeResult<Option<JoinHandle<()>>> {
        let connection_id = session.bot_id();
        let event = MessageReceive::decode(frame)
            .map_err(|source| RuntimeError::Decode {
                connection: connection_id.to_string(),
                source,
            })?
            .into_event();

        debug!(
            connection = %connection_id,
            user_id = %event.user_id,
            user_type = %event.user_type,
            text = %event.raw_text,
            "Message received"
        );
        Ok(self.dispatcher.dispatch(session, event))
    }

    /// Stops dispatching to the connection, waits for its handlers, then
    /// closes its session.
    ///
    /// Running handlers may still reply until the configured drain timeout;
    /// any left after it are cancelled. Returns `false` if no such connection
    /// was open.
    pub async fn disconnect(&self, connection_id: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(connection_id) else {
            return false;
        };
        self.close_session(&session).await;
        true
    }

    /// Like [`disconnect`](Self::disconnect), but only unregisters `session`
    /// if it still owns its connection id.
    async fn disconnect_session(&self, session: &Arc<Session>) {
        {
            let mut sessions = self.sessions.write().await;
            let id = session.bot_id();
            if sessions
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(id);
            }
        }
        self.close_session(session).await;
    }

    async fn close_session(&self, session: &Session) {
        let finished = session.drain(self.config.session.drain_timeout()).await;
        session.close();
        if finished {
            info!(connection = %session.bot_id(), "Connection closed");
        } else {
            warn!(
                connection = %session.bot_id(),
                "Connection closed, unfinished handlers were cancelled"
            );
        }
    }

    /// Runs one connection until its frame stream ends or it is closed.
    ///
    /// Frames go to the session this call attached, even if a later
    /// connection takes over the same id. Malformed frames are logged and
    /// skipped. The session is drained on exit.
    pub async fn serve<S>(&self, handle: ConnectionHandle, frames: S)
    where
        S: Stream<Item = Vec<u8>>,
    {
        let mut closed = handle.subscribe();
        let session = self.attach(handle).await;
        let id = session.bot_id().to_string();

        let mut frames = std::pin::pin!(frames);
        loop {
            tokio::select! {
                frame = frames.next() => {
                    let Some(frame) = frame else {
                        debug!(connection = %id, "Inbound stream ended");
                        break;
                    };
                    if let Err(e) = self.dispatch_frame(&session, &frame) {
                        warn!(connection = %id, error = %e, "Dropping inbound frame");
                    }
                }
                _ = async { let _ = closed.wait_for(|closed| *closed).await; } => {
                    debug!(connection = %id, "Connection closed");
                    break;
                }
            }
        }

        self.disconnect_session(&session).await;
    }

    /// Disconnects every open connection.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        info!(connections = ids.len(), "Shutting down runtime");
        for id in ids {
            self.disconnect(&id).await;
        }
    }

    /// Runs `work` until it finishes or a shutdown signal arrives, then shuts down.
    pub async fn run_until_signal<F>(&self, work: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = work => {}
            _ = wait_for_shutdown() => {}
        }
        self.shutdown().await;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`Runtime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    store: Option<BoxedConfigStore>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            store: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CoreConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `store` instead of the one named in the configuration.
    pub fn store(mut self, store: BoxedConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> ConfigResult<Runtime> {
        let config = self.config_loader.load()?;
        Ok(match self.store {
            Some(store) => {
                logging::init_from_config(&config.logging);
                Runtime::with_store(config, store)
            }
            None => Runtime::from_config(&config),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
