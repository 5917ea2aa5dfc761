//! Debugger session controller
//!
//! Commands against a connection's debugger. Every command first passes the
//! validation boundary, then goes out over the page session. Pause, resume
//! and step only *request* a transition; the run state changes when the
//! matching notification arrives.

pub mod state;

#[cfg(test)]
mod proptests;

pub use state::{
    Breakpoint, BreakpointInfo, BreakpointTable, DebuggerSession, DebuggerState, EnabledDebugger,
    RunState,
};

use crate::bridge::DebugBridge;
use crate::connection::Connection;
use crate::error::DebuggerError;
use crate::protocol::{
    BreakpointSpec, CallFrame, Command, Evaluation, PauseOnExceptions, Reply, StepDirection,
};

fn unexpected_reply(method: &str, reply: &Reply) -> DebuggerError {
    DebuggerError::Protocol {
        method: method.to_string(),
        message: format!("unexpected reply: {reply:?}"),
    }
}

impl DebugBridge {
    async fn send(
        &self,
        conn: &Connection,
        session: &DebuggerSession,
        command: Command,
    ) -> Result<Reply, DebuggerError> {
        conn.execute(session.page(), command, self.config().command_timeout)
            .await
    }

    /// Attach the debugger to the connection's current page
    pub async fn enable_debugger(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        let conn = self.require_connection(id)?;
        let (page, page_generation, first_seq) = {
            let state = conn.state();
            if state.debugger.is_enabled() {
                return Err(DebuggerError::DebuggerAlreadyEnabled {
                    id: conn.id().to_string(),
                });
            }
            (
                state.page.session.clone(),
                state.page.generation,
                conn.next_event_seq(),
            )
        };

        conn.execute(&page, Command::Enable, self.config().command_timeout)
            .await?;

        let mut state = conn.state();
        if state.debugger.is_enabled() {
            return Err(DebuggerError::DebuggerAlreadyEnabled {
                id: conn.id().to_string(),
            });
        }
        if state.page.generation != page_generation {
            return Err(DebuggerError::Protocol {
                method: Command::Enable.method().to_string(),
                message: "the page was switched while the command was in flight".to_string(),
            });
        }
        let generation = state.next_generation();
        state.debugger =
            DebuggerState::enabled(DebuggerSession::new(page, generation, first_seq));
        tracing::info!(connection_id = %conn.id(), generation, "Debugger enabled");
        Ok(())
    }

    /// Detach the debugger, dropping breakpoints and any pause
    pub async fn disable_debugger(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        let (conn, session) = self.session_of(id)?;
        self.send(&conn, &session, Command::Disable).await?;

        let mut state = conn.state();
        if state.debugger.enabled_for(&session).is_some() {
            state.debugger = DebuggerState::Disabled;
            tracing::info!(connection_id = %conn.id(), "Debugger disabled");
        }
        Ok(())
    }

    pub async fn set_breakpoint(
        &self,
        id: Option<&str>,
        spec: BreakpointSpec,
    ) -> Result<Breakpoint, DebuggerError> {
        let (conn, session) = self.session_of(id)?;
        if spec.url.is_empty() {
            return Err(DebuggerError::invalid_argument("breakpoint url must not be empty"));
        }
        if spec.line == 0 {
            return Err(DebuggerError::invalid_argument("breakpoint lines are 1-based"));
        }

        let command = Command::set_breakpoint(&spec);
        let method = command.method();
        let (protocol_id, locations) = match self.send(&conn, &session, command).await? {
            Reply::BreakpointSet {
                breakpoint_id,
                locations,
            } => (breakpoint_id, locations),
            other => return Err(unexpected_reply(method, &other)),
        };

        let info = BreakpointInfo {
            url: spec.url,
            line: spec.line,
            column: spec.column,
            condition: spec.condition,
            protocol_id,
            locations,
        };

        let mut state = conn.state();
        let enabled = state
            .debugger
            .enabled_for(&session)
            .ok_or_else(|| DebuggerError::DebuggerNotEnabled {
                id: conn.id().to_string(),
            })?;
        let bp_id = enabled.breakpoints.insert(info.clone());
        tracing::info!(
            connection_id = %conn.id(),
            breakpoint_id = %bp_id,
            url = %info.url,
            line = info.line,
            resolved = info.locations.len(),
            "Breakpoint set"
        );
        Ok(Breakpoint { id: bp_id, info })
    }

    pub async fn remove_breakpoint(
        &self,
        id: Option<&str>,
        breakpoint_id: &str,
    ) -> Result<(), DebuggerError> {
        let (conn, session) = self.session_of(id)?;
        let protocol_id = {
            let state = conn.state();
            let enabled = state.debugger.require_enabled(conn.id())?;
            enabled
                .breakpoints
                .get(breakpoint_id)
                .map(|bp| bp.protocol_id.clone())
                .ok_or_else(|| DebuggerError::BreakpointNotFound {
                    id: conn.id().to_string(),
                    breakpoint_id: breakpoint_id.to_string(),
                })?
        };

        self.send(
            &conn,
            &session,
            Command::RemoveBreakpoint {
                breakpoint_id: protocol_id,
            },
        )
        .await?;

        let mut state = conn.state();
        if let Some(enabled) = state.debugger.enabled_for(&session) {
            enabled.breakpoints.remove(breakpoint_id);
        }
        tracing::info!(connection_id = %conn.id(), breakpoint_id, "Breakpoint removed");
        Ok(())
    }

    /// Ask the page to pause at the next statement
    pub async fn pause(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        let (conn, session) = self.running_of(id)?;
        self.send(&conn, &session, Command::Pause).await?;
        Ok(())
    }

    pub async fn resume(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        let (conn, paused) = self.paused_of(id)?;
        self.send(&conn, &paused.session, Command::Resume).await?;
        Ok(())
    }

    pub async fn step(&self, id: Option<&str>, direction: StepDirection) -> Result<(), DebuggerError> {
        let (conn, paused) = self.paused_of(id)?;
        self.send(&conn, &paused.session, Command::Step(direction))
            .await?;
        Ok(())
    }

    /// Evaluate `expression` in the scope of one frame of the current pause.
    /// An exception thrown by the expression is a successful evaluation.
    pub async fn evaluate(
        &self,
        id: Option<&str>,
        expression: &str,
        call_frame_id: &str,
    ) -> Result<Evaluation, DebuggerError> {
        let (conn, paused) = self.paused_of(id)?;
        if !paused.event.has_frame(call_frame_id) {
            return Err(DebuggerError::InvalidCallFrame {
                id: conn.id().to_string(),
                frame_id: call_frame_id.to_string(),
                known: paused.event.frame_ids(),
            });
        }

        let command = Command::EvaluateOnCallFrame {
            call_frame_id: call_frame_id.to_string(),
            expression: expression.to_string(),
        };
        let method = command.method();
        match self.send(&conn, &paused.session, command).await? {
            Reply::Evaluated(evaluation) => Ok(evaluation),
            other => Err(unexpected_reply(method, &other)),
        }
    }

    pub async fn set_pause_on_exceptions(
        &self,
        id: Option<&str>,
        mode: PauseOnExceptions,
    ) -> Result<(), DebuggerError> {
        let (conn, session) = self.session_of(id)?;
        self.send(&conn, &session, Command::SetPauseOnExceptions(mode))
            .await?;

        let mut state = conn.state();
        if let Some(enabled) = state.debugger.enabled_for(&session) {
            enabled.pause_on_exceptions = mode;
        }
        tracing::info!(connection_id = %conn.id(), mode = mode.as_str(), "Exception pause mode set");
        Ok(())
    }

    /// Frames of the current pause, innermost first
    pub fn call_stack(&self, id: Option<&str>) -> Result<Vec<CallFrame>, DebuggerError> {
        Ok(self.require_paused(id)?.event.call_frames)
    }

    /// Breakpoints set through this debugger session, ordered by id
    pub fn breakpoints(&self, id: Option<&str>) -> Result<Vec<Breakpoint>, DebuggerError> {
        let conn = self.require_connection(id)?;
        let state = conn.state();
        Ok(state.debugger.require_enabled(conn.id())?.breakpoints.to_vec())
    }

    /// Caller-visible ids of the breakpoints behind the current pause
    pub fn hit_breakpoints(&self, id: Option<&str>) -> Result<Vec<String>, DebuggerError> {
        let conn = self.require_connection(id)?;
        let state = conn.state();
        let (enabled, paused) = state.debugger.require_paused(conn.id())?;
        Ok(enabled.breakpoints.ids_for_protocol(&paused.hit_breakpoints))
    }

    pub fn pause_on_exceptions(&self, id: Option<&str>) -> Result<PauseOnExceptions, DebuggerError> {
        let conn = self.require_connection(id)?;
        let state = conn.state();
        Ok(state.debugger.require_enabled(conn.id())?.pause_on_exceptions)
    }
}
