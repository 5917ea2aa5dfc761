//! Protocol-level value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use crate::error::DebuggerError;

// ============================================================================
// Debugger commands
// ============================================================================

/// Where to break. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub url: String,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub condition: Option<String>,
}

impl BreakpointSpec {
    pub fn new(url: impl Into<String>, line: u32) -> Self {
        Self {
            url: url.into(),
            line,
            column: 0,
            condition: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = column;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    Over,
    Into,
    Out,
}

impl FromStr for StepDirection {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "over" => Ok(Self::Over),
            "into" => Ok(Self::Into),
            "out" => Ok(Self::Out),
            other => Err(DebuggerError::invalid_argument(format!(
                "step direction must be 'over', 'into', or 'out' (got '{other}')"
            ))),
        }
    }
}

/// When the debugger should stop on thrown exceptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseOnExceptions {
    #[default]
    None,
    Uncaught,
    All,
}

impl PauseOnExceptions {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uncaught => "uncaught",
            Self::All => "all",
        }
    }
}

impl FromStr for PauseOnExceptions {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "uncaught" => Ok(Self::Uncaught),
            "all" => Ok(Self::All),
            other => Err(DebuggerError::invalid_argument(format!(
                "state must be 'none', 'uncaught', or 'all' (got '{other}')"
            ))),
        }
    }
}

/// A command sent over a page's protocol session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    SetBreakpointByUrl {
        url: String,
        /// 0-based, as the wire expects
        line_number: u32,
        column_number: u32,
        condition: Option<String>,
    },
    RemoveBreakpoint {
        breakpoint_id: String,
    },
    Pause,
    Resume,
    Step(StepDirection),
    EvaluateOnCallFrame {
        call_frame_id: String,
        expression: String,
    },
    SetPauseOnExceptions(PauseOnExceptions),
}

impl Command {
    pub fn set_breakpoint(spec: &BreakpointSpec) -> Self {
        Self::SetBreakpointByUrl {
            url: spec.url.clone(),
            line_number: spec.line.saturating_sub(1),
            column_number: spec.column,
            condition: spec.condition.clone(),
        }
    }

    /// Protocol method name, for logs and error messages
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enable => "Debugger.enable",
            Self::Disable => "Debugger.disable",
            Self::SetBreakpointByUrl { .. } => "Debugger.setBreakpointByUrl",
            Self::RemoveBreakpoint { .. } => "Debugger.removeBreakpoint",
            Self::Pause => "Debugger.pause",
            Self::Resume => "Debugger.resume",
            Self::Step(StepDirection::Over) => "Debugger.stepOver",
            Self::Step(StepDirection::Into) => "Debugger.stepInto",
            Self::Step(StepDirection::Out) => "Debugger.stepOut",
            Self::EvaluateOnCallFrame { .. } => "Debugger.evaluateOnCallFrame",
            Self::SetPauseOnExceptions(_) => "Debugger.setPauseOnExceptions",
        }
    }
}

/// A resolved script position. Lines here are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub script_id: String,
    pub line: u32,
    pub column: u32,
}

/// Result of `Debugger.evaluateOnCallFrame`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Remote object type (`number`, `object`, `undefined`, ...)
    pub kind: String,
    pub value: Option<Value>,
    pub description: Option<String>,
    /// Set when the expression threw
    pub exception: Option<String>,
}

/// Successful response to a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    BreakpointSet {
        breakpoint_id: String,
        locations: Vec<SourceLocation>,
    },
    Evaluated(Evaluation),
}

// ============================================================================
// Notifications
// ============================================================================

/// One stack frame captured when execution was suspended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub url: String,
    /// 1-based
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Payload of a `Debugger.paused` notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedEvent {
    pub reason: String,
    pub call_frames: Vec<CallFrame>,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

impl PausedEvent {
    pub fn has_frame(&self, call_frame_id: &str) -> bool {
        self.call_frames
            .iter()
            .any(|f| f.call_frame_id == call_frame_id)
    }

    pub fn frame_ids(&self) -> Vec<String> {
        self.call_frames
            .iter()
            .map(|f| f.call_frame_id.clone())
            .collect()
    }
}

/// Console severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warning,
    Error,
}

impl ConsoleLevel {
    /// Map a `Runtime.consoleAPICalled` type name onto a level
    pub fn from_api_type(api_type: &str) -> Self {
        match api_type {
            "debug" | "trace" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" | "assert" => Self::Error,
            _ => Self::Log,
        }
    }
}

impl FromStr for ConsoleLevel {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "log" => Ok(Self::Log),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(DebuggerError::invalid_argument(format!(
                "console level must be one of debug, log, info, warning, error (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Log => "log",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Console output as delivered by the transport, before epoch tagging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
}

impl RawConsoleMessage {
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Console output as stored on a connection
#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
    pub captured: Instant,
    pub captured_at: DateTime<Utc>,
    /// Navigation epoch of the page lifecycle that produced it
    pub epoch: u64,
}

/// Notification pushed by the transport for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Top-level page load
    Navigated { url: String },
    Console(RawConsoleMessage),
    Paused(PausedEvent),
    Resumed,
}

// ============================================================================
// Targets
// ============================================================================

/// Where to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// How to start a fresh browser
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub debug_port: u16,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub executable: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn on_port(debug_port: u16) -> Self {
        Self {
            debug_port,
            ..Self::default()
        }
    }

    /// Connection id used when the caller does not pick one
    pub fn default_connection_id(&self) -> String {
        format!("chrome-{}", self.debug_port)
    }
}

/// A page target the browser exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub target_id: String,
    pub url: String,
    pub title: String,
}
