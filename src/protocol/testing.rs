//! Mock transport for testing
//!
//! Browsers and pages that record every command and answer from a queue,
//! so the bridge can be driven without a real Chrome.

use super::traits::*;
use super::types::*;
use crate::error::DebuggerError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Pause event with the given frames and protocol breakpoint ids
pub fn paused_at(frame_ids: &[&str], hit_breakpoints: &[&str]) -> PausedEvent {
    PausedEvent {
        reason: "other".to_string(),
        call_frames: frame_ids
            .iter()
            .enumerate()
            .map(|(i, id)| CallFrame {
                call_frame_id: (*id).to_string(),
                function_name: format!("fn{i}"),
                url: "http://localhost/app.js".to_string(),
                line: u32::try_from(i).unwrap() + 10,
                column: 0,
                scopes: vec!["local".to_string(), "global".to_string()],
            })
            .collect(),
        hit_breakpoints: hit_breakpoints.iter().map(|s| (*s).to_string()).collect(),
    }
}

// ============================================================================
// Mock Connector
// ============================================================================

/// Connector handing out a fresh [`MockBrowser`] per connect or launch
#[derive(Default)]
pub struct MockConnector {
    browsers: Mutex<Vec<Arc<MockBrowser>>>,
    launched: Mutex<Vec<u16>>,
    connects: AtomicU32,
    next_error: Mutex<Option<DebuggerError>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next connect or launch with `err`
    pub fn fail_next(&self, err: DebuggerError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    /// The `index`-th browser handed out
    pub fn browser(&self, index: usize) -> Arc<MockBrowser> {
        self.browsers.lock().unwrap()[index].clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn launched_ports(&self) -> Vec<u16> {
        self.launched.lock().unwrap().clone()
    }

    fn open(&self, endpoint: String) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        if let Some(err) = self.next_error.lock().unwrap().take() {
            return Err(err);
        }
        let browser = Arc::new(MockBrowser::new(endpoint));
        self.browsers.lock().unwrap().push(browser.clone());
        Ok(browser)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.open(format!("ws://{}:{}/devtools/browser/mock", target.host, target.port))
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        self.launched.lock().unwrap().push(options.debug_port);
        self.open(format!(
            "ws://127.0.0.1:{}/devtools/browser/mock",
            options.debug_port
        ))
    }
}

// ============================================================================
// Mock Browser
// ============================================================================

/// Browser with two page targets, `page-1` and `page-2`
pub struct MockBrowser {
    endpoint: String,
    targets: Vec<PageInfo>,
    attached: Mutex<Vec<(Arc<MockPage>, EventSink)>>,
    closed: AtomicBool,
}

impl MockBrowser {
    fn new(endpoint: String) -> Self {
        let targets = (1..=2)
            .map(|n| PageInfo {
                target_id: format!("page-{n}"),
                url: format!("http://localhost:5173/{n}"),
                title: format!("Page {n}"),
            })
            .collect();
        Self {
            endpoint,
            targets,
            attached: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Most recently attached page
    pub fn current_page(&self) -> Arc<MockPage> {
        self.attached
            .lock()
            .unwrap()
            .last()
            .map(|(page, _)| page.clone())
            .unwrap()
    }

    /// Push a notification as the most recently attached page
    pub fn emit(&self, event: ProtocolEvent) {
        let attached = self.attached.lock().unwrap();
        let (_, sink) = attached.last().unwrap();
        sink.send(event).unwrap();
    }

    /// Push a notification as the `index`-th page attached, even after the
    /// connection has moved on from it
    pub fn emit_from(&self, index: usize, event: ProtocolEvent) {
        let attached = self.attached.lock().unwrap();
        attached[index].1.send(event).unwrap();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLink for MockBrowser {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn pages(&self) -> Result<Vec<PageInfo>, DebuggerError> {
        Ok(self.targets.clone())
    }

    async fn attach(
        &self,
        target_id: Option<&str>,
        events: EventSink,
    ) -> Result<Arc<dyn PageSession>, DebuggerError> {
        let info = match target_id {
            None => self.targets[0].clone(),
            Some(wanted) => self
                .targets
                .iter()
                .find(|t| t.target_id == wanted)
                .cloned()
                .ok_or_else(|| DebuggerError::PageNotFound {
                    id: self.endpoint.clone(),
                    target_id: wanted.to_string(),
                })?,
        };
        let page = Arc::new(MockPage::new(info));
        self.attached.lock().unwrap().push((page.clone(), events));
        Ok(page)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock Page
// ============================================================================

/// Page session answering from a queue, with sensible defaults
pub struct MockPage {
    info: PageInfo,
    commands: Mutex<Vec<Command>>,
    replies: Mutex<VecDeque<Result<Reply, TransportError>>>,
    next_breakpoint: AtomicU32,
    hang: AtomicBool,
    detached: AtomicBool,
}

impl MockPage {
    pub fn new(info: PageInfo) -> Self {
        Self {
            info,
            commands: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            next_breakpoint: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    /// Answer the next command with `reply` instead of the default
    pub fn queue_reply(&self, reply: Result<Reply, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Never answer commands from now on
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Commands received so far, in order
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn default_reply(&self, command: &Command) -> Reply {
        match command {
            Command::SetBreakpointByUrl { .. } => {
                let n = self.next_breakpoint.fetch_add(1, Ordering::SeqCst) + 1;
                Reply::BreakpointSet {
                    breakpoint_id: format!("mock-bp-{n}"),
                    locations: Vec::new(),
                }
            }
            Command::EvaluateOnCallFrame { .. } => Reply::Evaluated(Evaluation {
                kind: "undefined".to_string(),
                value: None,
                description: None,
                exception: None,
            }),
            _ => Reply::Ack,
        }
    }
}

#[async_trait]
impl PageSession for MockPage {
    fn info(&self) -> PageInfo {
        self.info.clone()
    }

    async fn execute(&self, command: Command) -> Result<Reply, TransportError> {
        self.commands.lock().unwrap().push(command.clone());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let queued = self.replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(self.default_reply(&command)))
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}
