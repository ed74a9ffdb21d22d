//! Check-in and trigger evaluation racing on the same vault from two threads.
//!
//! Whichever transaction commits first wins; the loser observes its result.
//! A vault is never both advanced and left triggered, and never has more than
//! one recovery request.

use std::sync::Barrier;
use std::thread;
use vigil_core::Scheme;
use vigil_recovery::{LivenessEvaluation, RecoveryRequestStatus, VaultStatus};
use vigil_testkit::*;

const ROUNDS: usize = 32;

#[test]
fn check_in_racing_trigger_at_the_deadline_stays_consistent() {
    let harness = EngineBuilder::new().build();

    for _ in 0..ROUNDS {
        let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
        let deadline = harness.engine.vault(vault.vault_id).unwrap().grace_deadline();
        // one millisecond past the grace deadline: overdue, time-lock fresh
        harness.clock.set(deadline.saturating_add_ms(1));

        let barrier = Barrier::new(2);
        let (receipt, evaluation) = thread::scope(|scope| {
            let checker = scope.spawn(|| {
                barrier.wait();
                harness
                    .engine
                    .check_in(password_check_in(vault.vault_id, harness.now()))
                    .unwrap()
            });
            let evaluator = scope.spawn(|| {
                barrier.wait();
                harness.engine.evaluate_liveness(vault.vault_id).unwrap()
            });
            (checker.join().unwrap(), evaluator.join().unwrap())
        });

        let requests = harness.engine.requests(vault.vault_id).unwrap();
        assert!(requests.len() <= 1, "{requests:?}");
        let state = harness.engine.vault(vault.vault_id).unwrap();

        match evaluation {
            // trigger won; the check-in then cancelled inside the time-lock
            LivenessEvaluation::Triggered(request_id) => {
                assert_eq!(receipt.cancelled_request, Some(request_id));
                assert_eq!(requests[0].status, RecoveryRequestStatus::Cancelled);
                assert_eq!(state.status, VaultStatus::Cancelled);
            }
            // check-in won; the schedule moved and nothing triggered
            other => {
                assert!(
                    matches!(other, LivenessEvaluation::Unchanged(VaultStatus::Active)),
                    "{other:?}"
                );
                assert_eq!(receipt.cancelled_request, None);
                assert!(requests.is_empty());
                assert_eq!(state.status, VaultStatus::Active);
                assert!(state.next_check_in_due > deadline);
            }
        }
    }
}

#[test]
fn concurrent_evaluations_open_one_request() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(120);

    let barrier = Barrier::new(4);
    let evaluations: Vec<LivenessEvaluation> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    harness.engine.evaluate_liveness(vault.vault_id).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let triggered = evaluations
        .iter()
        .filter(|e| matches!(e, LivenessEvaluation::Triggered(_)))
        .count();
    assert_eq!(triggered, 1, "{evaluations:?}");
    assert_eq!(harness.engine.requests(vault.vault_id).unwrap().len(), 1);
}
