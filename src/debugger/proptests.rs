//! Property-based tests for the debugger state machine
//!
//! Random sequences of enable/disable and pause/resume notifications are run
//! against a plain model; the validation checks must agree with it after
//! every step.

use super::state::*;
use crate::error::ErrorKind;
use crate::protocol::testing::{paused_at, MockPage};
use crate::protocol::{PageInfo, PausedEvent};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn session(generation: u64) -> DebuggerSession {
    let page = Arc::new(MockPage::new(PageInfo {
        target_id: "page-1".into(),
        url: "http://localhost/".into(),
        title: String::new(),
    }));
    DebuggerSession::new(page, generation, 0)
}

#[derive(Debug, Clone)]
enum Op {
    Enable,
    Disable,
    Paused(Vec<String>),
    Resumed,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Enable),
        Just(Op::Disable),
        proptest::collection::vec("[a-z]{1,6}", 0..4).prop_map(Op::Paused),
        Just(Op::Resumed),
    ]
}

/// What the state should look like
#[derive(Debug, Default)]
struct Model {
    enabled: bool,
    paused: Option<PausedEvent>,
}

fn event_for(frames: &[String]) -> PausedEvent {
    let ids: Vec<&str> = frames.iter().map(String::as_str).collect();
    paused_at(&ids, &[])
}

// ============================================================================
// Invariant: validation checks agree with the model, in order
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_validation_matches_model(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut state = DebuggerState::Disabled;
        let mut model = Model::default();
        let mut generation = 0;

        for op in ops {
            match op {
                Op::Enable => {
                    if !model.enabled {
                        generation += 1;
                        state = DebuggerState::enabled(session(generation));
                        model = Model { enabled: true, paused: None };
                    }
                }
                Op::Disable => {
                    state = DebuggerState::Disabled;
                    model = Model::default();
                }
                Op::Paused(frames) => {
                    let event = event_for(&frames);
                    let result = state.on_paused("a", event.clone());
                    prop_assert_eq!(result.is_ok(), model.enabled);
                    if model.enabled {
                        model.paused = Some(event);
                    }
                }
                Op::Resumed => {
                    let result = state.on_resumed("a");
                    prop_assert_eq!(result.is_ok(), model.enabled);
                    model.paused = None;
                }
            }

            // paused implies enabled
            if state.paused().is_some() {
                prop_assert!(state.is_enabled());
            }
            prop_assert_eq!(state.is_enabled(), model.enabled);
            prop_assert_eq!(state.paused(), model.paused.as_ref());

            match (&model.enabled, &model.paused) {
                (false, _) => {
                    prop_assert_eq!(state.require_enabled("a").unwrap_err().kind(), ErrorKind::DebuggerNotEnabled);
                    prop_assert_eq!(state.require_paused("a").unwrap_err().kind(), ErrorKind::DebuggerNotEnabled);
                    prop_assert_eq!(state.require_not_paused("a").unwrap_err().kind(), ErrorKind::DebuggerNotEnabled);
                }
                (true, None) => {
                    prop_assert!(state.require_not_paused("a").is_ok());
                    prop_assert_eq!(state.require_paused("a").unwrap_err().kind(), ErrorKind::ExecutionNotPaused);
                }
                (true, Some(expected)) => {
                    let (_, event) = state.require_paused("a").unwrap();
                    prop_assert_eq!(event, expected);
                    prop_assert_eq!(state.require_not_paused("a").unwrap_err().kind(), ErrorKind::ExecutionAlreadyPaused);
                }
            }
        }
    }

    #[test]
    fn prop_enable_always_starts_clean(
        before in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let mut state = DebuggerState::Disabled;
        for op in before {
            match op {
                Op::Enable => state = DebuggerState::enabled(session(1)),
                Op::Disable => state = DebuggerState::Disabled,
                Op::Paused(frames) => { let _ = state.on_paused("a", event_for(&frames)); }
                Op::Resumed => { let _ = state.on_resumed("a"); }
            }
        }

        state = DebuggerState::enabled(session(7));
        let enabled = state.require_enabled("a").unwrap();
        prop_assert!(enabled.breakpoints.is_empty());
        prop_assert_eq!(&enabled.run_state, &RunState::Running);
        prop_assert_eq!(enabled.session.generation(), 7);
    }
}

// ============================================================================
// Stale command results
// ============================================================================

#[test]
fn test_results_for_old_session_are_ignored() {
    let old = session(1);
    let mut state = DebuggerState::enabled(old.clone());
    assert!(state.enabled_for(&old).is_some());

    state = DebuggerState::enabled(session(2));
    assert!(state.enabled_for(&old).is_none());

    state = DebuggerState::Disabled;
    assert!(state.enabled_for(&old).is_none());
}

#[test]
fn test_breakpoint_ids_are_not_reused() {
    let mut table = BreakpointTable::default();
    let info = |protocol_id: &str| BreakpointInfo {
        url: "app.js".into(),
        line: 1,
        column: 0,
        condition: None,
        protocol_id: protocol_id.into(),
        locations: Vec::new(),
    };
    let first = table.insert(info("p1"));
    table.remove(&first);
    let second = table.insert(info("p2"));
    assert_ne!(first, second);
    assert_eq!(table.ids_for_protocol(&["p2".to_string()]), vec![second]);
}

#[test]
fn test_breakpoint_listing_is_numeric_order() {
    let mut table = BreakpointTable::default();
    for n in 0..11 {
        table.insert(BreakpointInfo {
            url: "app.js".into(),
            line: n + 1,
            column: 0,
            condition: None,
            protocol_id: format!("p{n}"),
            locations: Vec::new(),
        });
    }
    let ids: Vec<String> = table.to_vec().into_iter().map(|bp| bp.id).collect();
    assert_eq!(ids.first().map(String::as_str), Some("bp-1"));
    assert_eq!(ids.last().map(String::as_str), Some("bp-11"));
}
