//! One tracked browser connection
//!
//! The record owns the browser link, the attached page, and the mutable
//! state behind a short-held mutex. Notifications from the page are queued
//! on an unbounded channel and applied by a per-connection event loop, so
//! every notification-driven mutation goes through a single path in arrival
//! order.

use crate::correlator::ConsoleState;
use crate::debugger::DebuggerState;
use crate::error::DebuggerError;
use crate::protocol::{
    BrowserLink, Command, Envelope, EventSink, PageInfo, PageSession, ProtocolEvent, Reply,
    TransportError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The page a connection is attached to
#[derive(Clone)]
pub struct PageHandle {
    pub(crate) session: Arc<dyn PageSession>,
    pub info: PageInfo,
    /// Attach number on this connection; notifications carry it
    pub(crate) generation: u64,
}

impl PageHandle {
    pub(crate) fn new(session: Arc<dyn PageSession>, generation: u64) -> Self {
        let info = session.info();
        Self {
            session,
            info,
            generation,
        }
    }
}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("info", &self.info)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Mutable per-connection state. Only touched under [`Connection::state`].
#[derive(Debug)]
pub struct ConnectionState {
    pub page: PageHandle,
    pub debugger: DebuggerState,
    pub console: ConsoleState,
    next_generation: u64,
    next_page: u64,
}

impl ConnectionState {
    fn new(page: PageHandle, console_capacity: usize) -> Self {
        let next_page = page.generation;
        Self {
            page,
            debugger: DebuggerState::Disabled,
            console: ConsoleState::new(console_capacity),
            next_generation: 0,
            next_page,
        }
    }

    /// Fresh id for a debugger session on this connection
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Fresh attach number for the next page this connection moves to
    pub(crate) fn next_page_generation(&mut self) -> u64 {
        self.next_page += 1;
        self.next_page
    }
}

/// Read-only view of a connection for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub endpoint: String,
    pub active: bool,
    pub page: PageInfo,
    pub debugger_enabled: bool,
    pub paused: bool,
    pub breakpoints: usize,
    pub navigation_epoch: u64,
    pub console_messages: usize,
    pub connected_at: DateTime<Utc>,
}

pub struct Connection {
    id: String,
    link: Arc<dyn BrowserLink>,
    /// Sink of the first attach; later attaches derive theirs from it
    events: EventSink,
    cancel: CancellationToken,
    state: Mutex<ConnectionState>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    connected_at: DateTime<Utc>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.link.endpoint())
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        id: &str,
        link: Arc<dyn BrowserLink>,
        page: Arc<dyn PageSession>,
        events: EventSink,
        console_capacity: usize,
    ) -> Self {
        let page = PageHandle::new(page, events.page());
        Self {
            id: id.to_string(),
            link,
            events,
            cancel: CancellationToken::new(),
            state: Mutex::new(ConnectionState::new(page, console_capacity)),
            event_loop: Mutex::new(None),
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    pub(crate) fn link(&self) -> &Arc<dyn BrowserLink> {
        &self.link
    }

    /// Sink for attach number `page`
    pub(crate) fn events_for(&self, page: u64) -> EventSink {
        self.events.for_page(page)
    }

    /// Sequence number the next queued notification will get
    pub(crate) fn next_event_seq(&self) -> u64 {
        self.events.next_seq()
    }

    /// Lock the state. Never hold the guard across an await.
    pub(crate) fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn summary(&self, active: bool) -> ConnectionSummary {
        let state = self.state();
        let (debugger_enabled, paused, breakpoints) = match &state.debugger {
            DebuggerState::Disabled => (false, false, 0),
            DebuggerState::Enabled(enabled) => (
                true,
                state.debugger.paused().is_some(),
                enabled.breakpoints.len(),
            ),
        };
        ConnectionSummary {
            id: self.id.clone(),
            endpoint: self.link.endpoint(),
            active,
            page: state.page.info.clone(),
            debugger_enabled,
            paused,
            breakpoints,
            navigation_epoch: state.console.navigation_epoch(),
            console_messages: state.console.len(),
            connected_at: self.connected_at,
        }
    }

    /// Apply one queued notification, unless it belongs to a page or a
    /// debugger session this connection has already moved past
    pub(crate) fn deliver(
        &self,
        envelope: Envelope,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), DebuggerError> {
        let mut state = self.state();
        if let Some(reason) = state.staleness(&envelope) {
            tracing::debug!(connection_id = %self.id, seq = envelope.seq, reason, "Dropped stale notification");
            return Ok(());
        }
        state.apply(&self.id, envelope.event, now, wall)
    }

    /// Apply one notification under the state lock
    pub(crate) fn apply(
        &self,
        event: ProtocolEvent,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), DebuggerError> {
        self.state().apply(&self.id, event, now, wall)
    }

    /// Send `command` to `page`, racing the reply against disconnect and the
    /// command timeout
    pub(crate) async fn execute(
        &self,
        page: &Arc<dyn PageSession>,
        command: Command,
        timeout: Duration,
    ) -> Result<Reply, DebuggerError> {
        let method = command.method();
        tracing::debug!(connection_id = %self.id, method, "Sending command");

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(DebuggerError::ConnectionLost { id: self.id.clone() });
            }
            outcome = tokio::time::timeout(timeout, page.execute(command)) => outcome,
        };

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(TransportError::Rejected(message))) => {
                tracing::debug!(connection_id = %self.id, method, error = %message, "Command rejected");
                Err(DebuggerError::Protocol {
                    method: method.to_string(),
                    message,
                })
            }
            Ok(Err(TransportError::Closed)) => {
                Err(DebuggerError::ConnectionLost { id: self.id.clone() })
            }
            Ok(Err(TransportError::Timeout)) => Err(DebuggerError::Protocol {
                method: method.to_string(),
                message: TransportError::Timeout.to_string(),
            }),
            Err(_) => Err(DebuggerError::Protocol {
                method: method.to_string(),
                message: format!("no response within {}ms", timeout.as_millis()),
            }),
        }
    }

    /// Start draining `events` into this connection's state
    pub(crate) fn spawn_event_loop(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<Envelope>) {
        let conn = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let id = self.id.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(conn) = conn.upgrade() else {
                    break;
                };
                if let Err(e) = conn.deliver(event, Instant::now(), Utc::now()) {
                    tracing::debug!(connection_id = %id, error = %e, "Dropped notification");
                }
            }
            tracing::debug!(connection_id = %id, "Event loop finished");
        });

        *self.event_loop.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Tear down local resources. Commands still in flight resolve with
    /// [`DebuggerError::ConnectionLost`].
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
        self.state().page.session.detach();
        if let Some(handle) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
