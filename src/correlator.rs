//! Event correlation
//!
//! Applies protocol notifications to a connection's state and answers the
//! "what changed since I last looked" question for console reads.
//!
//! Every console message is stamped with the navigation epoch current at
//! capture. A top-level navigation bumps the epoch and clears the buffer in
//! one step, so no message can land in the wrong page lifecycle.

use crate::bridge::DebugBridge;
use crate::connection::ConnectionState;
use crate::debugger::DebuggerState;
use crate::error::DebuggerError;
use crate::protocol::{
    ConsoleLevel, ConsoleMessage, Envelope, PausedEvent, ProtocolEvent, RawConsoleMessage,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::LazyLock;
use std::time::Instant;

#[cfg(test)]
mod proptests;

/// Dev-server tags that prefix hot-reload chatter
static HMR_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:vite|hmr|wds|webpack|webpack-dev-server|fast refresh|next|parcel)\]")
        .expect("HMR tag pattern is valid")
});

/// Phrases that mean an update was actually applied, not just announced
static HMR_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:hot updated|hmr update|hot update|updated modules|update applied|page reload|full reload|rebuilt|app is up to date)\b",
    )
    .expect("HMR update pattern is valid")
});

/// True when `text` reports an applied hot-module update
pub fn is_hmr_update(text: &str) -> bool {
    HMR_TAG.is_match(text) && HMR_UPDATE.is_match(text)
}

/// What changed between two console reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Freshness {
    /// A top-level navigation happened since the previous read
    pub reloaded: bool,
    /// A hot-module update was applied since the previous read
    pub hmr_update: bool,
}

impl Freshness {
    /// Human-readable notice, if anything changed
    pub fn notice(&self) -> Option<&'static str> {
        match (self.reloaded, self.hmr_update) {
            (true, _) => Some("Page reloaded since the last read; earlier console output was discarded."),
            (false, true) => Some("Hot module update applied since the last read; running code may differ from the source you saw before."),
            (false, false) => None,
        }
    }
}

/// Console buffer and page-lifecycle bookkeeping for one connection
#[derive(Debug, Clone)]
pub struct ConsoleState {
    messages: VecDeque<ConsoleMessage>,
    capacity: usize,
    navigation_epoch: u64,
    last_navigation_time: Option<Instant>,
    hmr_update_count: u32,
    last_hmr_time: Option<Instant>,
    last_console_query: Option<Instant>,
    last_query_epoch: Option<u64>,
}

impl ConsoleState {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
            navigation_epoch: 0,
            last_navigation_time: None,
            hmr_update_count: 0,
            last_hmr_time: None,
            last_console_query: None,
            last_query_epoch: None,
        }
    }

    pub fn navigation_epoch(&self) -> u64 {
        self.navigation_epoch
    }

    pub fn last_navigation_time(&self) -> Option<Instant> {
        self.last_navigation_time
    }

    pub fn hmr_update_count(&self) -> u32 {
        self.hmr_update_count
    }

    pub fn last_hmr_time(&self) -> Option<Instant> {
        self.last_hmr_time
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConsoleMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Start a new page lifecycle
    pub fn navigate(&mut self, now: Instant) {
        self.navigation_epoch += 1;
        self.messages.clear();
        self.hmr_update_count = 0;
        self.last_hmr_time = None;
        self.last_navigation_time = Some(now);
    }

    /// Append a message stamped with the current epoch. Returns true when
    /// the message was recognised as a hot-module update.
    pub fn capture(&mut self, raw: RawConsoleMessage, now: Instant, wall: DateTime<Utc>) -> bool {
        let hmr = is_hmr_update(&raw.text);
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(ConsoleMessage {
            level: raw.level,
            text: raw.text,
            captured: now,
            captured_at: wall,
            epoch: self.navigation_epoch,
        });
        if hmr {
            self.hmr_update_count += 1;
            self.last_hmr_time = Some(now);
        }
        hmr
    }

    /// Compute what changed since the previous read, then record this read.
    /// Each change is reported exactly once.
    pub fn freshness(&mut self, now: Instant) -> Freshness {
        let fresh = match self.last_query_epoch {
            None => Freshness::default(),
            Some(seen) => Freshness {
                reloaded: seen < self.navigation_epoch,
                hmr_update: self.hmr_update_count > 0
                    && match (self.last_hmr_time, self.last_console_query) {
                        (Some(hmr), Some(queried)) => hmr > queried,
                        (Some(_), None) => true,
                        (None, _) => false,
                    },
            },
        };
        self.last_query_epoch = Some(self.navigation_epoch);
        self.last_console_query = Some(now);
        fresh
    }

    /// Drop buffered messages, keeping the epoch and HMR bookkeeping
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl ConnectionState {
    /// Why a queued notification no longer applies, if it doesn't. Anything
    /// from a page other than the current one is stale, and so is a pause or
    /// resume queued before the current debugger session was enabled.
    pub(crate) fn staleness(&self, envelope: &Envelope) -> Option<&'static str> {
        if envelope.page != self.page.generation {
            return Some("page no longer attached");
        }
        match (&envelope.event, &self.debugger) {
            (ProtocolEvent::Paused(_) | ProtocolEvent::Resumed, DebuggerState::Enabled(enabled))
                if envelope.seq < enabled.session.first_seq() =>
            {
                Some("queued before the debugger session began")
            }
            _ => None,
        }
    }

    /// Apply one notification. Fails only for a pause or resume that arrives
    /// while the debugger is disabled; the state is left untouched then.
    pub(crate) fn apply(
        &mut self,
        connection_id: &str,
        event: ProtocolEvent,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), DebuggerError> {
        match event {
            ProtocolEvent::Navigated { url } => {
                self.console.navigate(now);
                tracing::info!(
                    connection_id,
                    url = %url,
                    epoch = self.console.navigation_epoch(),
                    "Page navigated, console reset"
                );
                Ok(())
            }
            ProtocolEvent::Console(raw) => {
                if self.console.capture(raw, now, wall) {
                    tracing::debug!(
                        connection_id,
                        count = self.console.hmr_update_count(),
                        "Hot module update detected"
                    );
                }
                Ok(())
            }
            ProtocolEvent::Paused(event) => {
                let reason = event.reason.clone();
                let frames = event.call_frames.len();
                self.debugger.on_paused(connection_id, event)?;
                tracing::info!(connection_id, reason = %reason, frames, "Execution paused");
                Ok(())
            }
            ProtocolEvent::Resumed => {
                self.debugger.on_resumed(connection_id)?;
                tracing::info!(connection_id, "Execution resumed");
                Ok(())
            }
        }
    }
}

/// Result of a console read
#[derive(Debug, Clone)]
pub struct ConsoleReport {
    pub connection_id: String,
    pub navigation_epoch: u64,
    pub freshness: Freshness,
    pub messages: Vec<ConsoleMessage>,
}

fn report(connection_id: &str, console: &mut ConsoleState, min_level: Option<ConsoleLevel>) -> ConsoleReport {
    let freshness = console.freshness(Instant::now());
    let messages = console
        .messages()
        .filter(|m| min_level.is_none_or(|min| m.level >= min))
        .cloned()
        .collect();
    ConsoleReport {
        connection_id: connection_id.to_string(),
        navigation_epoch: console.navigation_epoch(),
        freshness,
        messages,
    }
}

impl DebugBridge {
    /// A top-level page load happened on `id`
    pub fn on_navigated(&self, id: &str, url: &str) -> Result<(), DebuggerError> {
        self.ingest(
            id,
            ProtocolEvent::Navigated {
                url: url.to_string(),
            },
        )
    }

    pub fn on_console_message(&self, id: &str, message: RawConsoleMessage) -> Result<(), DebuggerError> {
        self.ingest(id, ProtocolEvent::Console(message))
    }

    pub fn on_paused(&self, id: &str, event: PausedEvent) -> Result<(), DebuggerError> {
        self.ingest(id, ProtocolEvent::Paused(event))
    }

    pub fn on_resumed(&self, id: &str) -> Result<(), DebuggerError> {
        self.ingest(id, ProtocolEvent::Resumed)
    }

    fn ingest(&self, id: &str, event: ProtocolEvent) -> Result<(), DebuggerError> {
        let conn = self.require_connection(Some(id))?;
        conn.apply(event, Instant::now(), Utc::now())
    }

    /// Buffered console output at or above `min_level`, with what changed
    /// since the previous read
    pub fn console_logs(
        &self,
        id: Option<&str>,
        min_level: Option<ConsoleLevel>,
    ) -> Result<ConsoleReport, DebuggerError> {
        let conn = self.require_connection(id)?;
        let mut state = conn.state();
        Ok(report(conn.id(), &mut state.console, min_level))
    }

    /// [`console_logs`](Self::console_logs) and [`clear_console`](Self::clear_console)
    /// in one step, so nothing captured between the read and the clear is
    /// lost. Messages below `min_level` are cleared too.
    pub fn take_console_logs(
        &self,
        id: Option<&str>,
        min_level: Option<ConsoleLevel>,
    ) -> Result<ConsoleReport, DebuggerError> {
        let conn = self.require_connection(id)?;
        let mut state = conn.state();
        let report = report(conn.id(), &mut state.console, min_level);
        state.console.clear();
        Ok(report)
    }

    pub fn clear_console(&self, id: Option<&str>) -> Result<(), DebuggerError> {
        let conn = self.require_connection(id)?;
        conn.state().console.clear();
        Ok(())
    }
}
