//! Property-based tests for the event correlator

use super::*;
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Navigate,
    Message { text: String, hmr: bool },
    Query,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => Just(Step::Navigate),
        3 => ("[a-z ]{0,20}", any::<bool>()).prop_map(|(text, hmr)| Step::Message { text, hmr }),
        2 => Just(Step::Query),
    ]
}

/// Reference bookkeeping for freshness
#[derive(Debug, Default)]
struct Model {
    epoch: u64,
    queried_epoch: Option<u64>,
    hmr_since_query: bool,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_epochs_and_freshness(steps in proptest::collection::vec(arb_step(), 0..60)) {
        let start = Instant::now();
        let mut console = ConsoleState::new(1000);
        let mut model = Model::default();

        for (i, step) in steps.into_iter().enumerate() {
            let now = start + Duration::from_millis(u64::try_from(i).unwrap() + 1);
            let epoch_before = console.navigation_epoch();

            match step {
                Step::Navigate => {
                    console.navigate(now);
                    model.epoch += 1;
                    model.hmr_since_query = false;
                    prop_assert_eq!(console.navigation_epoch(), epoch_before + 1);
                    prop_assert!(console.is_empty());
                    prop_assert_eq!(console.hmr_update_count(), 0);
                    prop_assert!(console.last_hmr_time().is_none());
                }
                Step::Message { text, hmr } => {
                    let text = if hmr { format!("[vite] hot updated: {text}") } else { text };
                    let detected = console.capture(RawConsoleMessage::new(ConsoleLevel::Log, text), now, Utc::now());
                    prop_assert_eq!(detected, hmr);
                    if hmr {
                        model.hmr_since_query = true;
                    }
                    prop_assert_eq!(console.navigation_epoch(), epoch_before);
                }
                Step::Query => {
                    let fresh = console.freshness(now);
                    match model.queried_epoch {
                        None => prop_assert_eq!(fresh, Freshness::default()),
                        Some(seen) => {
                            prop_assert_eq!(fresh.reloaded, seen < model.epoch);
                            prop_assert_eq!(fresh.hmr_update, model.hmr_since_query);
                        }
                    }
                    model.queried_epoch = Some(model.epoch);
                    model.hmr_since_query = false;
                }
            }

            // Epoch never goes backwards and every buffered message belongs to it
            prop_assert!(console.navigation_epoch() >= epoch_before);
            prop_assert!(console.messages().all(|m| m.epoch == console.navigation_epoch()));
        }
    }
}
