//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible flows and
//! input sequences.

use super::*;
use crate::flow::{Completion, Flow, FnStep, Step, StepError};
use crate::memory::{ConversationId, Memory, Snapshot, ENTERED_KEY, STEP_KEY};
use crate::runtime::testing::{counting_step, test_message, InMemoryStore};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn conv() -> ConversationId {
    ConversationId::new("prop", "user")
}

fn fresh(flow: Flow) -> StateMachine {
    let mut sm = StateMachine::from_memory(Memory::new(conv(), Snapshot::new()));
    sm.set_flow(flow);
    sm
}

/// Shape of one generated step
#[derive(Debug, Clone, Copy)]
enum StepKind {
    /// Prompts, then completes on the next input
    Plain,
    /// Already complete, passed over without prompting
    Skipped,
    /// Prompts and waits for `n` inputs
    Waits(u8),
}

fn build_step(index: usize, kind: StepKind) -> Arc<dyn Step> {
    let prompt = format!("step {index}");
    match kind {
        StepKind::Plain => Arc::new(FnStep::prompt(prompt)),
        StepKind::Skipped => Arc::new(FnStep::prompt(prompt).skippable()),
        StepKind::Waits(n) => {
            let key = format!("seen.{index}");
            let seen = key.clone();
            Arc::new(
                FnStep::prompt(prompt)
                    .with_input(move |_, memory| {
                        memory.set(key.as_str(), memory.get_int(&key) + 1);
                        Ok(())
                    })
                    .with_completion(move |memory| {
                        Ok(Completion {
                            done: memory.get_int(&seen) >= i64::from(n),
                            response: None,
                        })
                    }),
            )
        }
    }
}

fn build_flow(kinds: &[StepKind]) -> Flow {
    let steps = kinds
        .iter()
        .enumerate()
        .map(|(i, k)| build_step(i, *k))
        .collect();
    Flow::new("generated", steps).unwrap()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_step_kind() -> impl Strategy<Value = StepKind> {
    prop_oneof![
        Just(StepKind::Plain),
        Just(StepKind::Skipped),
        (1u8..4).prop_map(StepKind::Waits),
    ]
}

fn arb_flow_kinds() -> impl Strategy<Value = Vec<StepKind>> {
    proptest::collection::vec(arb_step_kind(), 1..8)
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z ]{0,30}"
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Invariant 1: an entry action fires once no matter how many turns follow
    #[test]
    fn prop_entry_fires_once(turns in proptest::collection::vec(arb_text(), 1..20)) {
        let entries = Arc::new(AtomicUsize::new(0));
        let flow = Flow::new(
            "waiting",
            vec![Arc::new(
                counting_step("prompt", entries.clone()).with_completion(|_| Ok(Completion::pending())),
            ) as Arc<dyn Step>],
        )
        .unwrap();
        let mut sm = fresh(flow);

        for text in &turns {
            sm.advance(&test_message(conv(), text)).unwrap();
        }

        prop_assert_eq!(entries.load(Ordering::SeqCst), 1);
        prop_assert!(sm.entered());
    }

    // Invariant 2: a flow of always-complete steps visits each step in order
    #[test]
    fn prop_linear_progression(len in 1usize..8) {
        let flow = build_flow(&vec![StepKind::Plain; len]);
        let mut sm = fresh(flow);

        for expected in 0..len {
            let response = sm.advance(&test_message(conv(), "next")).unwrap();
            prop_assert_eq!(response, format!("step {expected}"));
            prop_assert_eq!(sm.cursor(), expected);
        }

        let response = sm.advance(&test_message(conv(), "done")).unwrap();
        prop_assert_eq!(response, "");
        prop_assert!(sm.state().is_idle());
    }

    // Invariant 3: every flow reaches Idle within a bounded number of turns
    #[test]
    fn prop_walk_terminates(kinds in arb_flow_kinds()) {
        let flow = build_flow(&kinds);
        let bound: usize = 1 + kinds
            .iter()
            .map(|k| match k {
                StepKind::Plain => 1,
                StepKind::Skipped => 0,
                StepKind::Waits(n) => usize::from(*n),
            })
            .sum::<usize>();
        let mut sm = fresh(flow);

        let mut turns = 0;
        loop {
            sm.advance(&test_message(conv(), "go")).unwrap();
            turns += 1;
            if sm.state().is_idle() {
                break;
            }
            prop_assert!(turns <= bound, "flow {:?} still running after {} turns", kinds, turns);
        }
    }

    // Invariant 4: the cursor never points past the end of the flow
    #[test]
    fn prop_cursor_stays_in_range(kinds in arb_flow_kinds(), turns in 1usize..30) {
        let len = kinds.len();
        let mut sm = fresh(build_flow(&kinds));

        for _ in 0..turns {
            sm.advance(&test_message(conv(), "go")).unwrap();
            if !sm.state().is_idle() {
                prop_assert!(sm.cursor() < len);
            }
        }
    }

    // Invariant 5: a failing step leaves persisted memory untouched
    #[test]
    fn prop_failed_turn_commits_nothing(prefix in 0usize..4, text in arb_text()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let store = InMemoryStore::new();
            let mut steps: Vec<Arc<dyn Step>> = (0..prefix)
                .map(|i| build_step(i, StepKind::Plain))
                .collect();
            steps.push(Arc::new(FnStep::new(|_, _| {
                Err(StepError::External("unreachable backend".to_string()))
            })));
            let flow = Flow::new("failing", steps).unwrap();

            // Walk up to the failing step, committing every good turn
            for _ in 0..prefix {
                let mut sm = StateMachine::boot(&store, &conv()).await.unwrap();
                sm.set_flow(flow.clone());
                sm.advance(&test_message(conv(), &text)).unwrap();
                sm.commit(&store).await.unwrap();
            }
            let before = store.snapshot(&conv());

            let mut sm = StateMachine::boot(&store, &conv()).await.unwrap();
            sm.set_flow(flow.clone());
            let result = sm.advance(&test_message(conv(), &text));

            prop_assert!(result.is_err());
            prop_assert_eq!(store.snapshot(&conv()), before);
            Ok(())
        })?;
    }

    // Invariant 6: the reserved keys always describe the reported state
    #[test]
    fn prop_state_matches_reserved_keys(kinds in arb_flow_kinds(), turns in 0usize..10) {
        let mut sm = fresh(build_flow(&kinds));
        for _ in 0..turns {
            sm.advance(&test_message(conv(), "go")).unwrap();
        }

        match sm.state() {
            MachineState::Idle => {
                prop_assert!(sm.selector().is_none());
                prop_assert!(!sm.memory().contains(STEP_KEY));
            }
            MachineState::Armed { step, .. } => {
                prop_assert!(!sm.memory().get_bool(ENTERED_KEY));
                prop_assert_eq!(step, 0);
            }
            MachineState::StepEntering { step, .. } => {
                prop_assert!(sm.memory().get_bool(ENTERED_KEY));
                prop_assert_eq!(step, sm.cursor());
            }
        }
    }
}
