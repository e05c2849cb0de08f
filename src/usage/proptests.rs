//! Property-Based Tests for Usage Accounting
//!
//! Invariants checked against random inputs:
//!
//! - **Limiter transitions**: a call in the same second as an allowed call is
//!   always blocked, and waiting out `retry_after_secs` always succeeds
//! - **Scores**: a caller's score equals the number of allowed calls
//! - **Leaderboard**: at most k entries, scores non-increasing
//! - **Sketch**: estimates stay inside the documented error bound
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib usage::proptests
//! ```

use proptest::prelude::*;
use std::sync::Arc;

use crate::config::{Config, UserCredential};
use crate::error::UsageError;
use crate::store::sketch::DistinctSketch;
use crate::store::{InMemoryStore, SharedStore};
use crate::usage::limiter::{evaluate, RateState};
use crate::usage::{Credentials, LeaderboardReader, ManualClock, StaticCredentials, UsageService};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// Helper: Generate arbitrary persisted rate state
fn arb_rate_state() -> impl Strategy<Value = RateState> {
    (0u64..=120, 0i64..1_000_000).prop_map(|(block_until_offset, last_call_epoch)| RateState {
        block_until_offset,
        last_call_epoch,
    })
}

// ============================================================================
// Property 1: Limiter Transitions
// ============================================================================

proptest! {
    /// A second call in the same instant never passes
    #[test]
    fn prop_same_second_is_blocked(
        previous in prop::option::of(arb_rate_state()),
        offset in 0i64..500,
        window in 1u64..600
    ) {
        let now = previous.map(|s| s.last_call_epoch).unwrap_or(0) + offset;
        if let Ok(next) = evaluate(previous.as_ref(), now, window) {
            prop_assert!(evaluate(Some(&next), now, window).is_err());
        }
    }

    /// Retrying exactly when told to is allowed, one second earlier is not
    #[test]
    fn prop_retry_after_is_exact(
        state in arb_rate_state(),
        elapsed in 0i64..=120,
        window in 1u64..600
    ) {
        let now = state.last_call_epoch + elapsed;
        if let Err(retry_after) = evaluate(Some(&state), now, window) {
            prop_assert!(retry_after >= 1);
            let retry_at = now + retry_after as i64;
            prop_assert!(evaluate(Some(&state), retry_at, window).is_ok());
            prop_assert!(evaluate(Some(&state), retry_at - 1, window).is_err());
        }
    }

    /// Allowed transitions never block longer than one window
    #[test]
    fn prop_new_offset_within_window(
        previous in prop::option::of(arb_rate_state()),
        offset in 0i64..500,
        window in 1u64..600
    ) {
        let now = previous.map(|s| s.last_call_epoch).unwrap_or(0) + offset;
        if let Ok(next) = evaluate(previous.as_ref(), now, window) {
            prop_assert!(next.block_until_offset <= window);
            prop_assert_eq!(next.last_call_epoch, now);
        }
    }
}

// ============================================================================
// Property 2: Score Equals Allowed Calls
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_score_counts_allowed_calls(gaps in prop::collection::vec(0i64..130, 1..25)) {
        runtime().block_on(async {
            let clock = ManualClock::new(1_700_000_000);
            let mut config = Config::default();
            config.users = vec![UserCredential {
                username: "alice".into(),
                password: "pw".into(),
            }];
            let service = UsageService::new(
                &config,
                Arc::new(InMemoryStore::new()),
                Arc::new(StaticCredentials::new(&config.users)),
                Arc::new(clock.clone()),
            );
            let token = service
                .authenticate(&Credentials::new("alice", "pw"))
                .await
                .unwrap();

            let mut allowed = 0u64;
            for gap in gaps {
                clock.advance(gap);
                match service.perform_rate_limited_action(&token).await {
                    Ok(result) => {
                        allowed += 1;
                        prop_assert_eq!(result.score, allowed);
                    }
                    Err(UsageError::RateLimited { .. }) => {}
                    Err(e) => prop_assert!(false, "unexpected error: {}", e),
                }
            }

            prop_assert!(allowed >= 1);
            let board = service.get_leaderboard(1).await.unwrap();
            prop_assert_eq!(board[0].score, allowed);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// Property 3: Leaderboard Shape
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_top_k_bounded_and_sorted(
        scores in prop::collection::btree_map("[a-z]{1,6}", 1u32..50, 0..40),
        k in 0usize..20
    ) {
        runtime().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            for (caller, score) in &scores {
                store
                    .ordered_set_increment("board", caller, *score as f64)
                    .await
                    .unwrap();
            }

            let reader = LeaderboardReader::new(store, "board".into());
            let top = reader.top_k(k).await.unwrap();

            prop_assert!(top.len() <= k);
            prop_assert_eq!(top.len(), k.min(scores.len()));
            for pair in top.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].caller > pair[1].caller);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// Property 4: Sketch Error Bound
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_estimate_within_bound(n in 1usize..5_000, seed in "[a-z]{4}") {
        let mut sketch = DistinctSketch::new();
        for i in 0..n {
            sketch.insert(&format!("{}-{}", seed, i));
        }

        let estimate = sketch.estimate() as f64;
        let tolerance = (n as f64 * 0.03).max(2.0);
        prop_assert!(
            (estimate - n as f64).abs() <= tolerance,
            "estimate {} for {} members",
            estimate,
            n
        );
    }
}
