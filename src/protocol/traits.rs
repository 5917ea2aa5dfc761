//! Trait abstractions for the browser transport
//!
//! These let the state machine run against mock browsers in tests.

use super::types::{Command, ConnectTarget, LaunchOptions, PageInfo, ProtocolEvent, Reply};
use crate::error::DebuggerError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A notification plus where it sits in the connection's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Attach that produced it
    pub page: u64,
    /// Position in the connection's notification stream, starting at 0
    pub seq: u64,
    pub event: ProtocolEvent,
}

/// Where a page session pushes its notifications.
///
/// One channel serves a whole connection. Each attach gets its own sink from
/// [`EventSink::for_page`], so anything still queued from a page that was
/// switched away from can be recognised and dropped. Sequence numbers are
/// shared across all sinks of a channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Envelope>,
    page: u64,
    next_seq: Arc<AtomicU64>,
}

impl EventSink {
    /// New channel. The returned sink is tagged with attach `page`.
    pub fn channel(page: u64) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            page,
            next_seq: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    /// Sink on the same channel for attach `page`
    pub fn for_page(&self, page: u64) -> Self {
        Self {
            tx: self.tx.clone(),
            page,
            next_seq: self.next_seq.clone(),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    /// Sequence number the next notification on this channel will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Queue `event`. Fails once the receiving side is gone.
    pub fn send(&self, event: ProtocolEvent) -> Result<(), TransportError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(Envelope {
                page: self.page,
                seq,
                event,
            })
            .map_err(|_| TransportError::Closed)
    }
}

/// Transport-level command failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The browser answered with a protocol error
    #[error("{0}")]
    Rejected(String),
    /// The underlying channel is gone
    #[error("connection closed")]
    Closed,
    /// The transport gave up waiting for the reply
    #[error("transport timed out waiting for a reply")]
    Timeout,
}

/// Opens browser links
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attach to an already running browser
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn BrowserLink>, DebuggerError>;

    /// Start a browser and attach to it
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserLink>, DebuggerError>;
}

/// A live link to one browser instance
#[async_trait]
pub trait BrowserLink: Send + Sync {
    /// WebSocket URL the link talks to
    fn endpoint(&self) -> String;

    /// Page targets currently open
    async fn pages(&self) -> Result<Vec<PageInfo>, DebuggerError>;

    /// Attach to a page (the first one when `target_id` is `None`) and start
    /// forwarding its notifications into `events`
    async fn attach(
        &self,
        target_id: Option<&str>,
        events: EventSink,
    ) -> Result<Arc<dyn PageSession>, DebuggerError>;

    /// Drop the link. Pending commands fail with [`TransportError::Closed`].
    async fn close(&self);
}

/// Command channel to one attached page
#[async_trait]
pub trait PageSession: Send + Sync {
    fn info(&self) -> PageInfo;

    async fn execute(&self, command: Command) -> Result<Reply, TransportError>;

    /// Stop forwarding notifications
    fn detach(&self);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        (**self).connect(target).await
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        (**self).launch(options).await
    }
}
