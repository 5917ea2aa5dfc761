//! `chromiumoxide`-backed transport

use super::console_text::render_args;
use super::sequencer::{Batch, ContextMessage, Sequencer};
use super::traits::{BrowserLink, Connector, EventSink, PageSession, TransportError};
use super::types::{
    CallFrame, Command, ConnectTarget, ConsoleLevel, Evaluation, LaunchOptions, PageInfo,
    PauseOnExceptions, PausedEvent, RawConsoleMessage, Reply, SourceLocation,
    StepDirection,
};
use crate::error::DebuggerError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::cdp::js_protocol::debugger::{
    self, BreakpointId, CallFrameId, EvaluateOnCallFrameParams, EventPaused, EventResumed,
    EventScriptParsed, Location, RemoveBreakpointParams, SetBreakpointByUrlParams,
    SetPauseOnExceptionsParams, SetPauseOnExceptionsState,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExecutionContextCreated,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Timeout for the `/json/version` discovery request
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Production connector speaking CDP through `chromiumoxide`
#[derive(Debug, Default, Clone)]
pub struct ChromiumConnector {
    /// Fallback executable for launches that do not name one
    chrome_executable: Option<PathBuf>,
}

impl ChromiumConnector {
    pub fn new(chrome_executable: Option<PathBuf>) -> Self {
        Self { chrome_executable }
    }

    /// Resolve the browser-level WebSocket URL from the HTTP endpoint
    async fn discover_ws_url(target: &ConnectTarget) -> Result<String, DebuggerError> {
        #[derive(Deserialize)]
        struct VersionInfo {
            #[serde(rename = "webSocketDebuggerUrl")]
            web_socket_debugger_url: String,
        }

        let endpoint = target.http_endpoint();
        let failed = |message: String| DebuggerError::ConnectFailed {
            endpoint: endpoint.clone(),
            message,
        };

        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .map_err(|e| failed(e.to_string()))?;
        let info: VersionInfo = client
            .get(format!("{endpoint}/json/version"))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| failed(format!("unexpected /json/version response: {e}")))?;
        Ok(info.web_socket_debugger_url)
    }

    fn launch_config(&self, options: &LaunchOptions) -> Result<BrowserConfig, DebuggerError> {
        let user_data_dir = options.user_data_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("chrome-debugger-{}", uuid::Uuid::new_v4()))
        });

        let mut builder = BrowserConfig::builder()
            .port(options.debug_port)
            .user_data_dir(user_data_dir)
            .args(options.extra_args.clone());
        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(path) = options.executable.as_ref().or(self.chrome_executable.as_ref()) {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(DebuggerError::LaunchFailed)
    }
}

#[async_trait]
impl Connector for ChromiumConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        let ws_url = Self::discover_ws_url(target).await?;
        tracing::debug!(ws_url = %ws_url, "Connecting to browser");

        let (browser, handler) =
            Browser::connect(ws_url.clone())
                .await
                .map_err(|e| DebuggerError::ConnectFailed {
                    endpoint: ws_url.clone(),
                    message: e.to_string(),
                })?;

        Ok(Arc::new(ChromiumLink::new(browser, handler, ws_url, false)))
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserLink>, DebuggerError> {
        let config = self.launch_config(options)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| DebuggerError::LaunchFailed(e.to_string()))?;
        let ws_url = browser.websocket_address().clone();
        tracing::info!(port = options.debug_port, ws_url = %ws_url, "Chrome launched");

        Ok(Arc::new(ChromiumLink::new(browser, handler, ws_url, true)))
    }
}

// ============================================================================
// Browser link
// ============================================================================

struct ChromiumLink {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    ws_url: String,
    /// Launched browsers are closed with the link; attached ones are left running
    owned: bool,
}

impl ChromiumLink {
    fn new(browser: Browser, mut handler: chromiumoxide::Handler, ws_url: String, owned: bool) -> Self {
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("CDP handler error: {e}");
                }
            }
        });
        Self {
            browser: Mutex::new(browser),
            handler_task,
            ws_url,
            owned,
        }
    }

    async fn page_info(page: &Page) -> PageInfo {
        PageInfo {
            target_id: page.target_id().inner().clone(),
            url: page.url().await.ok().flatten().unwrap_or_default(),
            title: page.get_title().await.ok().flatten().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl BrowserLink for ChromiumLink {
    fn endpoint(&self) -> String {
        self.ws_url.clone()
    }

    async fn pages(&self) -> Result<Vec<PageInfo>, DebuggerError> {
        let pages = self.browser.lock().await.pages().await.map_err(|e| {
            DebuggerError::Protocol {
                method: "Target.getTargets".into(),
                message: e.to_string(),
            }
        })?;
        let mut infos = Vec::with_capacity(pages.len());
        for page in &pages {
            infos.push(Self::page_info(page).await);
        }
        Ok(infos)
    }

    async fn attach(
        &self,
        target_id: Option<&str>,
        events: EventSink,
    ) -> Result<Arc<dyn PageSession>, DebuggerError> {
        let page = {
            let browser = self.browser.lock().await;
            let pages = browser.pages().await.map_err(|e| DebuggerError::Protocol {
                method: "Target.getTargets".into(),
                message: e.to_string(),
            })?;
            let found = match target_id {
                Some(wanted) => pages.into_iter().find(|p| p.target_id().inner() == wanted),
                None => pages.into_iter().next(),
            };
            match (found, target_id) {
                (Some(page), _) => page,
                (None, None) => browser.new_page("about:blank").await.map_err(|e| {
                    DebuggerError::Protocol {
                        method: "Target.createTarget".into(),
                        message: e.to_string(),
                    }
                })?,
                (None, Some(wanted)) => {
                    return Err(DebuggerError::PageNotFound {
                        id: self.ws_url.clone(),
                        target_id: wanted.to_string(),
                    })
                }
            }
        };

        let info = Self::page_info(&page).await;
        let pump = spawn_event_pump(&page, events).await.map_err(|e| {
            DebuggerError::Protocol {
                method: "event subscription".into(),
                message: e.to_string(),
            }
        })?;
        tracing::debug!(target_id = %info.target_id, url = %info.url, "Attached to page");

        Ok(Arc::new(ChromiumPage {
            page,
            info,
            pump: StdMutex::new(Some(pump)),
        }))
    }

    async fn close(&self) {
        if self.owned {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "Failed to close launched browser");
            }
            if let Err(e) = browser.wait().await {
                tracing::warn!(error = %e, "Failed to reap launched browser");
            }
        }
        self.handler_task.abort();
    }
}

impl Drop for ChromiumLink {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Per-kind notification streams of one page
struct PageStreams {
    scripts: EventStream<EventScriptParsed>,
    contexts: EventStream<EventExecutionContextCreated>,
    console: EventStream<EventConsoleApiCalled>,
    navigated: EventStream<EventFrameNavigated>,
    paused: EventStream<EventPaused>,
    resumed: EventStream<EventResumed>,
}

/// Raw notifications collected at one wakeup
#[derive(Default)]
struct Pending {
    scripts: Vec<Arc<EventScriptParsed>>,
    contexts: Vec<Arc<EventExecutionContextCreated>>,
    console: Vec<Arc<EventConsoleApiCalled>>,
    navigated: Vec<Arc<EventFrameNavigated>>,
    paused: Vec<Arc<EventPaused>>,
    resumed: usize,
}

impl PageStreams {
    async fn subscribe(page: &Page) -> Result<Self, CdpError> {
        Ok(Self {
            scripts: page.event_listener::<EventScriptParsed>().await?,
            contexts: page.event_listener::<EventExecutionContextCreated>().await?,
            console: page.event_listener::<EventConsoleApiCalled>().await?,
            navigated: page.event_listener::<EventFrameNavigated>().await?,
            paused: page.event_listener::<EventPaused>().await?,
            resumed: page.event_listener::<EventResumed>().await?,
        })
    }

    /// Wait for a notification of any kind. `None` once every stream ended.
    async fn wait(&mut self, pending: &mut Pending) -> Option<()> {
        tokio::select! {
            Some(ev) = self.scripts.next() => pending.scripts.push(ev),
            Some(ev) = self.contexts.next() => pending.contexts.push(ev),
            Some(ev) = self.console.next() => pending.console.push(ev),
            Some(ev) = self.navigated.next() => pending.navigated.push(ev),
            Some(ev) = self.paused.next() => pending.paused.push(ev),
            Some(_) = self.resumed.next() => pending.resumed += 1,
            else => return None,
        }
        Some(())
    }

    /// Take whatever is already queued, without waiting
    fn drain_ready(&mut self, pending: &mut Pending) {
        while let Some(Some(ev)) = self.scripts.next().now_or_never() {
            pending.scripts.push(ev);
        }
        while let Some(Some(ev)) = self.contexts.next().now_or_never() {
            pending.contexts.push(ev);
        }
        while let Some(Some(ev)) = self.console.next().now_or_never() {
            pending.console.push(ev);
        }
        while let Some(Some(ev)) = self.navigated.next().now_or_never() {
            pending.navigated.push(ev);
        }
        while let Some(Some(ev)) = self.paused.next().now_or_never() {
            pending.paused.push(ev);
        }
        while let Some(Some(_)) = self.resumed.next().now_or_never() {
            pending.resumed += 1;
        }
    }
}

impl Pending {
    /// Convert to transport-neutral form. `scripts` maps script ids to URLs
    /// for the page's current lifecycle.
    fn into_batch(self, scripts: &mut HashMap<String, String>) -> Batch {
        // Child frames navigate independently of the page lifecycle
        let navigations: Vec<String> = self
            .navigated
            .iter()
            .filter(|ev| ev.frame.parent_id.is_none())
            .map(|ev| ev.frame.url.clone())
            .collect();
        if !navigations.is_empty() {
            scripts.clear();
        }
        for ev in &self.scripts {
            scripts.insert(ev.script_id.inner().clone(), ev.url.clone());
        }

        Batch {
            contexts_created: self.contexts.iter().map(|ev| *ev.context.id.inner()).collect(),
            console: self
                .console
                .iter()
                .map(|ev| ContextMessage {
                    context: *ev.execution_context_id.inner(),
                    message: RawConsoleMessage::new(
                        ConsoleLevel::from_api_type(&format!("{:?}", ev.r#type).to_lowercase()),
                        render_args(&ev.args),
                    ),
                })
                .collect(),
            navigations,
            paused: self.paused.iter().map(|ev| convert_paused(ev, scripts)).collect(),
            resumed: self.resumed,
        }
    }
}

/// Forward the page's notifications into `events`. Each wakeup sweeps every
/// stream and the [`Sequencer`] puts the batch back in protocol order.
async fn spawn_event_pump(page: &Page, events: EventSink) -> Result<JoinHandle<()>, CdpError> {
    let mut streams = PageStreams::subscribe(page).await?;

    Ok(tokio::spawn(async move {
        let mut sequencer = Sequencer::default();
        let mut scripts = HashMap::new();
        'pump: loop {
            let mut pending = Pending::default();
            if streams.wait(&mut pending).await.is_none() {
                break;
            }
            streams.drain_ready(&mut pending);
            for event in sequencer.order(pending.into_batch(&mut scripts)) {
                if events.send(event).is_err() {
                    break 'pump;
                }
            }
        }
        tracing::debug!("Page event pump finished");
    }))
}

fn convert_location(location: &Location) -> SourceLocation {
    SourceLocation {
        script_id: location.script_id.inner().clone(),
        line: wire_line_to_u32(location.line_number) + 1,
        column: location.column_number.map_or(0, wire_line_to_u32),
    }
}

fn wire_line_to_u32(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

fn convert_paused(event: &EventPaused, scripts: &HashMap<String, String>) -> PausedEvent {
    PausedEvent {
        reason: format!("{:?}", event.reason).to_lowercase(),
        call_frames: event
            .call_frames
            .iter()
            .map(|frame| {
                let location = convert_location(&frame.location);
                CallFrame {
                    call_frame_id: frame.call_frame_id.inner().clone(),
                    function_name: frame.function_name.clone(),
                    url: scripts.get(&location.script_id).cloned().unwrap_or_default(),
                    line: location.line,
                    column: location.column,
                    scopes: frame
                        .scope_chain
                        .iter()
                        .map(|s| format!("{:?}", s.r#type).to_lowercase())
                        .collect(),
                }
            })
            .collect(),
        hit_breakpoints: event.hit_breakpoints.clone().unwrap_or_default(),
    }
}

// ============================================================================
// Page session
// ============================================================================

struct ChromiumPage {
    page: Page,
    info: PageInfo,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

fn transport_error(err: CdpError) -> TransportError {
    match err {
        CdpError::Chrome(e) => TransportError::Rejected(e.message),
        CdpError::NoResponse | CdpError::ChannelSendError(_) | CdpError::Ws(_) => {
            TransportError::Closed
        }
        CdpError::Timeout => TransportError::Timeout,
        other => TransportError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl PageSession for ChromiumPage {
    fn info(&self) -> PageInfo {
        self.info.clone()
    }

    async fn execute(&self, command: Command) -> Result<Reply, TransportError> {
        let page = &self.page;
        match command {
            Command::Enable => {
                page.execute(debugger::EnableParams::default())
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::Disable => {
                page.execute(debugger::DisableParams::default())
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::SetBreakpointByUrl {
                url,
                line_number,
                column_number,
                condition,
            } => {
                let mut builder = SetBreakpointByUrlParams::builder()
                    .url(url)
                    .line_number(i64::from(line_number))
                    .column_number(i64::from(column_number));
                if let Some(condition) = condition {
                    builder = builder.condition(condition);
                }
                let params = builder.build().map_err(TransportError::Rejected)?;
                let response = page.execute(params).await.map_err(transport_error)?;
                Ok(Reply::BreakpointSet {
                    breakpoint_id: response.result.breakpoint_id.inner().clone(),
                    locations: response.result.locations.iter().map(convert_location).collect(),
                })
            }
            Command::RemoveBreakpoint { breakpoint_id } => {
                page.execute(RemoveBreakpointParams::new(BreakpointId::new(breakpoint_id)))
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::Pause => {
                page.execute(debugger::PauseParams::default())
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::Resume => {
                page.execute(debugger::ResumeParams::default())
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::Step(direction) => {
                let sent = match direction {
                    StepDirection::Over => page
                        .execute(debugger::StepOverParams::default())
                        .await
                        .map(|_| ()),
                    StepDirection::Into => page
                        .execute(debugger::StepIntoParams::default())
                        .await
                        .map(|_| ()),
                    StepDirection::Out => page
                        .execute(debugger::StepOutParams::default())
                        .await
                        .map(|_| ()),
                };
                sent.map_err(transport_error)?;
                Ok(Reply::Ack)
            }
            Command::EvaluateOnCallFrame {
                call_frame_id,
                expression,
            } => {
                let params =
                    EvaluateOnCallFrameParams::new(CallFrameId::new(call_frame_id), expression);
                let response = page.execute(params).await.map_err(transport_error)?;
                let result = &response.result;
                Ok(Reply::Evaluated(Evaluation {
                    kind: format!("{:?}", result.result.r#type).to_lowercase(),
                    value: result.result.value.clone(),
                    description: result.result.description.clone(),
                    exception: result.exception_details.as_ref().map(|details| {
                        details
                            .exception
                            .as_ref()
                            .and_then(|e| e.description.clone())
                            .unwrap_or_else(|| details.text.clone())
                    }),
                }))
            }
            Command::SetPauseOnExceptions(mode) => {
                let state = match mode {
                    PauseOnExceptions::None => SetPauseOnExceptionsState::None,
                    PauseOnExceptions::Uncaught => SetPauseOnExceptionsState::Uncaught,
                    PauseOnExceptions::All => SetPauseOnExceptionsState::All,
                };
                page.execute(SetPauseOnExceptionsParams::new(state))
                    .await
                    .map_err(transport_error)?;
                Ok(Reply::Ack)
            }
        }
    }

    fn detach(&self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(task) = pump.take() {
                task.abort();
            }
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.detach();
    }
}
