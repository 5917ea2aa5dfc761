//! The debugger bridge
//!
//! Owns the connection registry, the browser connector and the bridge
//! configuration. Connection lifecycle lives here; debugger commands,
//! validation and event ingestion are further `impl` blocks in their own
//! modules.

use crate::config::BridgeConfig;
use crate::connection::{Connection, ConnectionSummary, PageHandle};
use crate::debugger::DebuggerState;
use crate::error::DebuggerError;
use crate::protocol::{
    BrowserLink, ChromiumConnector, ConnectTarget, Connector, EventSink, LaunchOptions, PageInfo,
};
use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Instant;

/// Attach number of a connection's first page
const FIRST_PAGE: u64 = 1;

pub struct DebugBridge {
    config: BridgeConfig,
    connector: Arc<dyn Connector>,
    registry: ConnectionRegistry,
}

impl DebugBridge {
    pub fn new(config: BridgeConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Bridge backed by a real browser through `chromiumoxide`
    pub fn with_chromium(config: BridgeConfig) -> Self {
        let connector = Arc::new(ChromiumConnector::new(config.chrome_executable.clone()));
        Self::new(config, connector)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Attach to a browser already running with remote debugging enabled.
    /// Returns the connection id (generated when `id` is `None`).
    pub async fn connect(
        &self,
        id: Option<&str>,
        target: &ConnectTarget,
    ) -> Result<String, DebuggerError> {
        self.ensure_free(id)?;
        let link = self.connector.connect(target).await?;
        self.adopt(id, link).await
    }

    /// Start a browser and attach to it. The id defaults to `chrome-<port>`.
    pub async fn launch(
        &self,
        id: Option<&str>,
        options: &LaunchOptions,
    ) -> Result<String, DebuggerError> {
        let id = id.map_or_else(|| options.default_connection_id(), str::to_string);
        self.ensure_free(Some(&id))?;

        let mut options = options.clone();
        if options.executable.is_none() {
            options.executable.clone_from(&self.config.chrome_executable);
        }
        let link = self.connector.launch(&options).await?;
        self.adopt(Some(&id), link).await
    }

    fn ensure_free(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        match id {
            Some(id) if self.registry.contains(id) => {
                Err(DebuggerError::ConnectionExists { id: id.to_string() })
            }
            _ => Ok(()),
        }
    }

    /// Attach the first page of `link` and register the connection
    async fn adopt(
        &self,
        id: Option<&str>,
        link: Arc<dyn BrowserLink>,
    ) -> Result<String, DebuggerError> {
        let (events, events_rx) = EventSink::channel(FIRST_PAGE);
        let page = match link.attach(None, events.clone()).await {
            Ok(page) => page,
            Err(e) => {
                link.close().await;
                return Err(e);
            }
        };

        let registered = self.registry.register(id, |id| {
            Arc::new(Connection::new(
                id,
                link.clone(),
                page.clone(),
                events,
                self.config.max_console_messages,
            ))
        });
        let (id, conn) = match registered {
            Ok(registered) => registered,
            Err(e) => {
                // Lost a race for the id
                page.detach();
                link.close().await;
                return Err(e);
            }
        };

        conn.spawn_event_loop(events_rx);
        tracing::info!(
            connection_id = %id,
            endpoint = %link.endpoint(),
            target_id = %page.info().target_id,
            "Connected to Chrome"
        );
        Ok(id)
    }

    /// Drop a connection immediately. Commands still waiting on it fail with
    /// [`DebuggerError::ConnectionLost`].
    pub async fn disconnect(&self, id: &str) -> Result<(), DebuggerError> {
        let conn = self
            .registry
            .remove(id)
            .ok_or_else(|| DebuggerError::not_connected(Some(id)))?;
        conn.shutdown();
        conn.link().close().await;
        tracing::info!(connection_id = %id, "Disconnected");
        Ok(())
    }

    /// Drop every connection
    pub async fn disconnect_all(&self) {
        for conn in self.registry.drain() {
            conn.shutdown();
            conn.link().close().await;
            tracing::info!(connection_id = %conn.id(), "Disconnected");
        }
    }

    /// Make `id` the default for calls that do not name a connection
    pub fn switch_active(&self, id: &str) -> Result<(), DebuggerError> {
        self.registry.switch_active(id)?;
        tracing::info!(connection_id = %id, "Active connection switched");
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        self.registry.active_id()
    }

    /// Connection ids, sorted
    pub fn list(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn summaries(&self) -> Vec<ConnectionSummary> {
        let active = self.registry.active_id();
        self.registry
            .list()
            .into_iter()
            .filter_map(|id| self.registry.get(Some(&id)))
            .map(|conn| conn.summary(active.as_deref() == Some(conn.id())))
            .collect()
    }

    /// Page targets open in the connection's browser
    pub async fn pages(&self, id: Option<&str>) -> Result<Vec<PageInfo>, DebuggerError> {
        let conn = self.require_connection(id)?;
        conn.link().pages().await
    }

    /// Move the connection to another page target. The debugger goes back to
    /// disabled and the console starts a new lifecycle. Notifications the old
    /// page queued before the switch are dropped, not applied to the new one.
    pub async fn select_page(
        &self,
        id: Option<&str>,
        target_id: &str,
    ) -> Result<PageInfo, DebuggerError> {
        let conn = self.require_connection(id)?;
        let generation = conn.state().next_page_generation();
        let page = conn
            .link()
            .attach(Some(target_id), conn.events_for(generation))
            .await
            .map_err(|e| match e {
                DebuggerError::PageNotFound { target_id, .. } => DebuggerError::PageNotFound {
                    id: conn.id().to_string(),
                    target_id,
                },
                other => other,
            })?;

        if conn.is_closed() {
            page.detach();
            return Err(DebuggerError::ConnectionLost {
                id: conn.id().to_string(),
            });
        }

        let info = page.info();
        let previous = {
            let mut state = conn.state();
            let previous = std::mem::replace(&mut state.page, PageHandle::new(page, generation));
            state.debugger = DebuggerState::Disabled;
            state.console.navigate(Instant::now());
            previous
        };
        previous.session.detach();

        tracing::info!(
            connection_id = %conn.id(),
            from = %previous.info.target_id,
            to = %info.target_id,
            "Switched page, debugger reset"
        );
        Ok(info)
    }
}
