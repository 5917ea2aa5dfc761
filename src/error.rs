//! Error taxonomy for debugger operations
//!
//! Every message names the call that resolves it. The typical caller is an
//! agent with no documentation at hand, so the text is the contract.

use thiserror::Error;

/// Failure of a connection or debugger operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    #[error("No Chrome connection{} found. Use connect() or launch() first.", quoted(.id.as_deref()))]
    ChromeNotConnected { id: Option<String> },

    #[error("Connection '{id}' was lost while the command was in flight. Reconnect with connect() or launch().")]
    ConnectionLost { id: String },

    #[error("Connection '{id}' already exists. Use disconnect('{id}') first or pick another id.")]
    ConnectionExists { id: String },

    #[error("Debugger is not enabled on connection '{id}'. Call enable_debugger() first.")]
    DebuggerNotEnabled { id: String },

    #[error("Debugger is already enabled on connection '{id}'. Breakpoints and pause state are kept; call disable_debugger() first to start clean.")]
    DebuggerAlreadyEnabled { id: String },

    #[error("Execution is not paused on connection '{id}'. Set a breakpoint and trigger it, or call pause() and wait for the pause notification.")]
    ExecutionNotPaused { id: String },

    #[error("Execution is already paused on connection '{id}'. Inspect with call_stack()/evaluate(), or continue with resume() or step().")]
    ExecutionAlreadyPaused { id: String },

    #[error("Call frame '{frame_id}' is not part of the current pause on connection '{id}'. Read call_stack() again and use one of: {}.", .known.join(", "))]
    InvalidCallFrame {
        id: String,
        frame_id: String,
        known: Vec<String>,
    },

    #[error("Breakpoint '{breakpoint_id}' is not set on connection '{id}'. List current ones with breakpoints().")]
    BreakpointNotFound { id: String, breakpoint_id: String },

    #[error("Page target '{target_id}' not found on connection '{id}'. List available targets with pages().")]
    PageNotFound { id: String, target_id: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{method} rejected by the browser: {message}")]
    Protocol { method: String, message: String },

    #[error("Failed to connect to Chrome at {endpoint}: {message}. Make sure Chrome runs with --remote-debugging-port.")]
    ConnectFailed { endpoint: String, message: String },

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),
}

fn quoted(id: Option<&str>) -> String {
    id.map(|id| format!(" '{id}'")).unwrap_or_default()
}

/// Copyable classification of a [`DebuggerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ChromeNotConnected,
    ConnectionLost,
    ConnectionExists,
    DebuggerNotEnabled,
    DebuggerAlreadyEnabled,
    ExecutionNotPaused,
    ExecutionAlreadyPaused,
    InvalidCallFrame,
    BreakpointNotFound,
    PageNotFound,
    InvalidArgument,
    Protocol,
    ConnectFailed,
    LaunchFailed,
}

impl DebuggerError {
    pub fn not_connected(id: Option<&str>) -> Self {
        Self::ChromeNotConnected {
            id: id.map(str::to_string),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChromeNotConnected { .. } => ErrorKind::ChromeNotConnected,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::ConnectionExists { .. } => ErrorKind::ConnectionExists,
            Self::DebuggerNotEnabled { .. } => ErrorKind::DebuggerNotEnabled,
            Self::DebuggerAlreadyEnabled { .. } => ErrorKind::DebuggerAlreadyEnabled,
            Self::ExecutionNotPaused { .. } => ErrorKind::ExecutionNotPaused,
            Self::ExecutionAlreadyPaused { .. } => ErrorKind::ExecutionAlreadyPaused,
            Self::InvalidCallFrame { .. } => ErrorKind::InvalidCallFrame,
            Self::BreakpointNotFound { .. } => ErrorKind::BreakpointNotFound,
            Self::PageNotFound { .. } => ErrorKind::PageNotFound,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            Self::LaunchFailed(_) => ErrorKind::LaunchFailed,
        }
    }

    /// True when the connection is gone, whether it was never there or was
    /// dropped mid-command. Callers handle both the same way.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ChromeNotConnected { .. } | Self::ConnectionLost { .. }
        )
    }

    /// The remediation step on its own, without the diagnosis
    pub fn remedy(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ChromeNotConnected | ErrorKind::ConnectionLost => {
                "Use connect() or launch() first."
            }
            ErrorKind::ConnectionExists => "Use disconnect() first or choose another id.",
            ErrorKind::DebuggerNotEnabled => "Call enable_debugger() first.",
            ErrorKind::DebuggerAlreadyEnabled => "Call disable_debugger() first.",
            ErrorKind::ExecutionNotPaused => {
                "Trigger a breakpoint or call pause() and wait for the pause."
            }
            ErrorKind::ExecutionAlreadyPaused => "Call resume() or step() first.",
            ErrorKind::InvalidCallFrame => "Read call_stack() and use a current frame id.",
            ErrorKind::BreakpointNotFound => "List current breakpoints with breakpoints().",
            ErrorKind::PageNotFound => "List available targets with pages().",
            ErrorKind::InvalidArgument => "Fix the argument and retry.",
            ErrorKind::Protocol => "Check the command arguments against the page state.",
            ErrorKind::ConnectFailed => "Start Chrome with --remote-debugging-port.",
            ErrorKind::LaunchFailed => "Check the Chrome executable path and port.",
        }
    }
}
