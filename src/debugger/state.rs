//! Per-connection debugger state
//!
//! `Disabled` or `Enabled`, and when enabled either `Running` or `Paused`.
//! A pause without an enabled debugger cannot be expressed.

use crate::error::DebuggerError;
use crate::protocol::{PageSession, PauseOnExceptions, PausedEvent, SourceLocation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Protocol session handle, present only while the debugger is enabled
#[derive(Clone)]
pub struct DebuggerSession {
    page: Arc<dyn PageSession>,
    /// Distinguishes this enable from earlier ones on the same connection
    generation: u64,
    /// Queued notifications numbered below this predate the enable
    first_seq: u64,
}

impl DebuggerSession {
    pub(crate) fn new(page: Arc<dyn PageSession>, generation: u64, first_seq: u64) -> Self {
        Self {
            page,
            generation,
            first_seq,
        }
    }

    pub(crate) fn page(&self) -> &Arc<dyn PageSession> {
        &self.page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn first_seq(&self) -> u64 {
        self.first_seq
    }
}

impl fmt::Debug for DebuggerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerSession")
            .field("target_id", &self.page.info().target_id)
            .field("generation", &self.generation)
            .field("first_seq", &self.first_seq)
            .finish()
    }
}

/// A breakpoint as the caller set it, plus what the browser resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointInfo {
    pub url: String,
    /// 1-based
    pub line: u32,
    pub column: u32,
    pub condition: Option<String>,
    /// Id assigned by the browser
    pub protocol_id: String,
    pub locations: Vec<SourceLocation>,
}

/// A breakpoint together with its caller-visible id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: String,
    #[serde(flatten)]
    pub info: BreakpointInfo,
}

/// Caller-visible breakpoint id → breakpoint
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    entries: HashMap<String, BreakpointInfo>,
    next_id: u32,
}

impl BreakpointTable {
    pub fn insert(&mut self, info: BreakpointInfo) -> String {
        self.next_id += 1;
        let id = format!("bp-{}", self.next_id);
        self.entries.insert(id.clone(), info);
        id
    }

    pub fn get(&self, id: &str) -> Option<&BreakpointInfo> {
        self.entries.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<BreakpointInfo> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Caller-visible ids of the breakpoints behind a pause
    pub fn ids_for_protocol(&self, protocol_ids: &[String]) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, info)| protocol_ids.contains(&info.protocol_id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// All breakpoints, ordered by id
    pub fn to_vec(&self) -> Vec<Breakpoint> {
        let mut all: Vec<Breakpoint> = self
            .entries
            .iter()
            .map(|(id, info)| Breakpoint {
                id: id.clone(),
                info: info.clone(),
            })
            .collect();
        all.sort_by_key(|bp| bp.id.trim_start_matches("bp-").parse::<u32>().unwrap_or(u32::MAX));
        all
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused(PausedEvent),
}

#[derive(Debug, Clone)]
pub struct EnabledDebugger {
    pub session: DebuggerSession,
    pub breakpoints: BreakpointTable,
    pub run_state: RunState,
    pub pause_on_exceptions: PauseOnExceptions,
}

#[derive(Debug, Clone, Default)]
pub enum DebuggerState {
    #[default]
    Disabled,
    Enabled(EnabledDebugger),
}

impl DebuggerState {
    /// Fresh enabled state: no breakpoints, running, no exception pauses
    pub fn enabled(session: DebuggerSession) -> Self {
        Self::Enabled(EnabledDebugger {
            session,
            breakpoints: BreakpointTable::default(),
            run_state: RunState::Running,
            pause_on_exceptions: PauseOnExceptions::None,
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn paused(&self) -> Option<&PausedEvent> {
        match self {
            Self::Enabled(EnabledDebugger {
                run_state: RunState::Paused(event),
                ..
            }) => Some(event),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Ordered checks. Each one runs the previous first so the reported
    // error is always the most specific true cause.
    // ------------------------------------------------------------------

    pub fn require_enabled(&self, id: &str) -> Result<&EnabledDebugger, DebuggerError> {
        match self {
            Self::Enabled(enabled) => Ok(enabled),
            Self::Disabled => Err(DebuggerError::DebuggerNotEnabled { id: id.to_string() }),
        }
    }

    pub fn require_paused(&self, id: &str) -> Result<(&EnabledDebugger, &PausedEvent), DebuggerError> {
        let enabled = self.require_enabled(id)?;
        match &enabled.run_state {
            RunState::Paused(event) => Ok((enabled, event)),
            RunState::Running => Err(DebuggerError::ExecutionNotPaused { id: id.to_string() }),
        }
    }

    pub fn require_not_paused(&self, id: &str) -> Result<&EnabledDebugger, DebuggerError> {
        let enabled = self.require_enabled(id)?;
        match &enabled.run_state {
            RunState::Running => Ok(enabled),
            RunState::Paused(_) => Err(DebuggerError::ExecutionAlreadyPaused { id: id.to_string() }),
        }
    }

    /// The enabled state, if it still belongs to `session`. Command results
    /// that arrive after a disable or page switch find nothing to update.
    pub fn enabled_for(&mut self, session: &DebuggerSession) -> Option<&mut EnabledDebugger> {
        match self {
            Self::Enabled(enabled) if enabled.session.generation == session.generation => {
                Some(enabled)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Notification-driven transitions
    // ------------------------------------------------------------------

    /// Apply `Debugger.paused`. Replaces any earlier pause (a step re-pauses).
    pub fn on_paused(&mut self, id: &str, event: PausedEvent) -> Result<(), DebuggerError> {
        match self {
            Self::Enabled(enabled) => {
                enabled.run_state = RunState::Paused(event);
                Ok(())
            }
            Self::Disabled => Err(DebuggerError::DebuggerNotEnabled { id: id.to_string() }),
        }
    }

    /// Apply `Debugger.resumed`
    pub fn on_resumed(&mut self, id: &str) -> Result<(), DebuggerError> {
        match self {
            Self::Enabled(enabled) => {
                enabled.run_state = RunState::Running;
                Ok(())
            }
            Self::Disabled => Err(DebuggerError::DebuggerNotEnabled { id: id.to_string() }),
        }
    }
}
