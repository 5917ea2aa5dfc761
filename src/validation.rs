//! Validation boundary
//!
//! The only read path into connection state. Checks run in a fixed order
//! (connection, then debugger, then run state) so the first failure is the
//! most specific true cause.

use crate::bridge::DebugBridge;
use crate::connection::{Connection, PageHandle};
use crate::debugger::DebuggerSession;
use crate::error::DebuggerError;
use crate::protocol::PausedEvent;
use std::sync::Arc;

/// Validated view of a paused debugger
#[derive(Debug, Clone)]
pub struct PausedContext {
    pub session: DebuggerSession,
    pub event: PausedEvent,
}

impl DebugBridge {
    pub fn require_connection(&self, id: Option<&str>) -> Result<Arc<Connection>, DebuggerError> {
        self.registry()
            .get(id)
            .ok_or_else(|| DebuggerError::not_connected(id))
    }

    pub fn require_page(&self, id: Option<&str>) -> Result<PageHandle, DebuggerError> {
        let conn = self.require_connection(id)?;
        let page = conn.state().page.clone();
        Ok(page)
    }

    pub fn require_session(&self, id: Option<&str>) -> Result<DebuggerSession, DebuggerError> {
        self.session_of(id).map(|(_, session)| session)
    }

    pub fn require_paused(&self, id: Option<&str>) -> Result<PausedContext, DebuggerError> {
        self.paused_of(id).map(|(_, paused)| paused)
    }

    pub fn require_not_paused(&self, id: Option<&str>) -> Result<DebuggerSession, DebuggerError> {
        self.running_of(id).map(|(_, session)| session)
    }

    // Variants that also hand back the connection, for commands

    pub(crate) fn session_of(
        &self,
        id: Option<&str>,
    ) -> Result<(Arc<Connection>, DebuggerSession), DebuggerError> {
        let conn = self.require_connection(id)?;
        let session = conn.state().debugger.require_enabled(conn.id())?.session.clone();
        Ok((conn, session))
    }

    pub(crate) fn paused_of(
        &self,
        id: Option<&str>,
    ) -> Result<(Arc<Connection>, PausedContext), DebuggerError> {
        let conn = self.require_connection(id)?;
        let paused = {
            let state = conn.state();
            let (enabled, event) = state.debugger.require_paused(conn.id())?;
            PausedContext {
                session: enabled.session.clone(),
                event: event.clone(),
            }
        };
        Ok((conn, paused))
    }

    pub(crate) fn running_of(
        &self,
        id: Option<&str>,
    ) -> Result<(Arc<Connection>, DebuggerSession), DebuggerError> {
        let conn = self.require_connection(id)?;
        let session = conn
            .state()
            .debugger
            .require_not_paused(conn.id())?
            .session
            .clone();
        Ok((conn, session))
    }
}
