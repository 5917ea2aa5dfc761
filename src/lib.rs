//! Chrome debugger bridge
//!
//! Tracks live remote-debugging connections to Chrome, enforces the legal
//! order of debugger operations, and correlates protocol notifications with
//! the connection and page lifecycle they belong to.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod bridge;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod debugger;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod validation;

pub use bridge::DebugBridge;
pub use config::BridgeConfig;
pub use connection::{Connection, ConnectionSummary, PageHandle};
pub use correlator::{ConsoleReport, Freshness};
pub use debugger::{Breakpoint, BreakpointInfo, DebuggerSession, DebuggerState, RunState};
pub use error::{DebuggerError, ErrorKind};
pub use protocol::{
    BreakpointSpec, CallFrame, ConnectTarget, ConsoleLevel, ConsoleMessage, Evaluation,
    LaunchOptions, PageInfo, PauseOnExceptions, PausedEvent, RawConsoleMessage, StepDirection,
};
pub use validation::PausedContext;
