//! Ordering for notifications that arrive on separate per-kind streams
//!
//! `chromiumoxide` hands out one channel per notification kind, so the
//! browser's order across kinds is gone by the time a batch is read. Two
//! protocol facts recover the order the state machine depends on.
//! `Debugger.paused` and `Debugger.resumed` strictly alternate. A console
//! message belongs to the lifecycle of the execution context that logged
//! it, and context ids are never reused within a page.

use super::types::{PausedEvent, ProtocolEvent, RawConsoleMessage};
use std::collections::HashSet;

/// Console message plus the execution context that logged it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub context: i64,
    pub message: RawConsoleMessage,
}

/// Everything that was ready on the per-kind streams at one wakeup. Each
/// list keeps its own stream's order.
#[derive(Debug, Default)]
pub struct Batch {
    pub contexts_created: Vec<i64>,
    pub console: Vec<ContextMessage>,
    /// Top-level navigations only
    pub navigations: Vec<String>,
    pub paused: Vec<PausedEvent>,
    pub resumed: usize,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    /// The last debugger notification forwarded was a pause
    suspended: bool,
    /// Execution contexts of the current page lifecycle
    contexts: HashSet<i64>,
}

impl Sequencer {
    /// Put one batch in the order the browser sent it, as far as it matters
    pub fn order(&mut self, batch: Batch) -> Vec<ProtocolEvent> {
        let mut out = Vec::new();
        self.order_page(batch.contexts_created, batch.console, batch.navigations, &mut out);
        self.order_debugger(batch.paused, batch.resumed, &mut out);
        out
    }

    fn order_page(
        &mut self,
        created: Vec<i64>,
        console: Vec<ContextMessage>,
        navigations: Vec<String>,
        out: &mut Vec<ProtocolEvent>,
    ) {
        if navigations.is_empty() {
            self.contexts.extend(created);
            for m in console {
                self.contexts.insert(m.context);
                out.push(ProtocolEvent::Console(m.message));
            }
            return;
        }

        // Messages from the outgoing lifecycle's contexts were logged before
        // the navigation; the first one from any other context was not.
        let split = console
            .iter()
            .position(|m| !self.contexts.contains(&m.context))
            .unwrap_or(console.len());
        let mut console = console.into_iter();
        out.extend(console.by_ref().take(split).map(|m| ProtocolEvent::Console(m.message)));
        out.extend(navigations.into_iter().map(|url| ProtocolEvent::Navigated { url }));

        self.contexts = created.into_iter().collect();
        for m in console {
            self.contexts.insert(m.context);
            out.push(ProtocolEvent::Console(m.message));
        }
    }

    fn order_debugger(&mut self, paused: Vec<PausedEvent>, mut resumed: usize, out: &mut Vec<ProtocolEvent>) {
        let mut paused = paused.into_iter();
        loop {
            let take_resume = resumed > 0 && (self.suspended || paused.as_slice().is_empty());
            let next = if take_resume {
                resumed -= 1;
                ProtocolEvent::Resumed
            } else if let Some(event) = paused.next() {
                ProtocolEvent::Paused(event)
            } else {
                break;
            };
            self.suspended = matches!(next, ProtocolEvent::Paused(_));
            out.push(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::paused_at;
    use crate::protocol::ConsoleLevel;

    fn msg(context: i64, text: &str) -> ContextMessage {
        ContextMessage {
            context,
            message: RawConsoleMessage::new(ConsoleLevel::Log, text),
        }
    }

    fn describe(events: &[ProtocolEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                ProtocolEvent::Navigated { url } => format!("nav {url}"),
                ProtocolEvent::Console(m) => format!("log {}", m.text),
                ProtocolEvent::Paused(p) => format!("paused {}", p.call_frames[0].call_frame_id),
                ProtocolEvent::Resumed => "resumed".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_step_resume_precedes_repause() {
        let mut seq = Sequencer::default();
        seq.order(Batch {
            paused: vec![paused_at(&["f0"], &[])],
            ..Batch::default()
        });

        // A step from a pause: resumed, then paused at the next line
        let out = seq.order(Batch {
            paused: vec![paused_at(&["f1"], &[])],
            resumed: 1,
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["resumed", "paused f1"]);
    }

    #[test]
    fn test_pause_precedes_resume_while_running() {
        let mut seq = Sequencer::default();
        let out = seq.order(Batch {
            paused: vec![paused_at(&["f0"], &[])],
            resumed: 1,
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["paused f0", "resumed"]);

        // Running again, so the next pair starts with a pause too
        let out = seq.order(Batch {
            paused: vec![paused_at(&["f1"], &[]), paused_at(&["f2"], &[])],
            resumed: 1,
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["paused f1", "resumed", "paused f2"]);
    }

    #[test]
    fn test_old_context_messages_precede_navigation() {
        let mut seq = Sequencer::default();
        seq.order(Batch {
            contexts_created: vec![1],
            console: vec![msg(1, "boot")],
            ..Batch::default()
        });

        let out = seq.order(Batch {
            contexts_created: vec![2],
            console: vec![msg(1, "unload"), msg(2, "hello")],
            navigations: vec!["http://localhost/".into()],
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["log unload", "nav http://localhost/", "log hello"]);

        // Context 1 belongs to the previous lifecycle now
        let out = seq.order(Batch {
            console: vec![msg(2, "again")],
            navigations: vec!["http://localhost/2".into()],
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["log again", "nav http://localhost/2"]);
    }

    #[test]
    fn test_unknown_context_is_new_lifecycle() {
        let mut seq = Sequencer::default();
        let out = seq.order(Batch {
            console: vec![msg(5, "fresh")],
            navigations: vec!["http://localhost/".into()],
            ..Batch::default()
        });
        assert_eq!(describe(&out), ["nav http://localhost/", "log fresh"]);
    }
}
