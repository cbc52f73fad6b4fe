//! Reconciliation of cached and live outcomes.
//!
//! [`Reconciler`] is the per-request state machine. It is pure: the two async
//! events (store lookup resolved, live status changed) are fed in as method
//! calls, and each call returns the [`Effect`]s the engine has to carry out.
//!
//! ```text
//! AwaitingBoth ──cache hit──▶ ShowingCached ──supersede──▶ Final
//!      │                                                    ▲
//!      └───────────────────supersede────────────────────────┘
//! ```

use cachet_core::ResponseOutcome;

/// Where a request's reconciliation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Neither the lookup nor the live result has landed.
    AwaitingBoth,
    /// A stored outcome is showing; the live result is pending.
    ShowingCached,
    /// The live outcome has been accepted. Terminal.
    Final,
}

/// What the caller sees through a proxy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseSnapshot {
    pub outcome: ResponseOutcome,
    /// The outcome came from the store, not the network.
    pub is_cached: bool,
    /// The live outcome has landed; nothing changes after this.
    pub is_final: bool,
}

/// Work the engine must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish this snapshot to observers.
    Notify(ResponseSnapshot),
    /// Persist this outcome for the request's fingerprint.
    WriteBack(ResponseOutcome),
}

/// Whether a live outcome replaces what `current` shows.
///
/// A live status that has not started never supersedes and a final snapshot
/// never changes. Otherwise a live success always wins, and a live failure
/// wins unless a cached success is showing.
pub fn should_supersede(live: &ResponseOutcome, current: &ResponseSnapshot) -> bool {
    if current.is_final || !live.status.is_started() {
        return false;
    }
    if live.is_success() {
        return true;
    }
    !current.is_cached || !current.outcome.is_success()
}

/// Per-request state machine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    phase: Phase,
    snapshot: ResponseSnapshot,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingBoth,
            snapshot: ResponseSnapshot::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn snapshot(&self) -> &ResponseSnapshot {
        &self.snapshot
    }

    pub fn is_final(&self) -> bool {
        self.phase == Phase::Final
    }

    /// A usable stored outcome arrived; `live` is the live outcome as known
    /// right now.
    ///
    /// Ignored unless still awaiting both. Otherwise the stored outcome is
    /// shown and the live outcome is evaluated against it straight away.
    pub fn load_cached(&mut self, cached: ResponseOutcome, live: &ResponseOutcome) -> Vec<Effect> {
        if self.phase != Phase::AwaitingBoth {
            return Vec::new();
        }

        self.snapshot = ResponseSnapshot {
            outcome: cached,
            is_cached: true,
            is_final: false,
        };
        self.phase = Phase::ShowingCached;

        let mut effects = vec![Effect::Notify(self.snapshot.clone())];
        effects.extend(self.observe_live(live));
        effects
    }

    /// The live outcome changed.
    pub fn observe_live(&mut self, live: &ResponseOutcome) -> Vec<Effect> {
        if !should_supersede(live, &self.snapshot) {
            return Vec::new();
        }

        self.snapshot = ResponseSnapshot {
            outcome: live.clone(),
            is_cached: false,
            is_final: true,
        };
        self.phase = Phase::Final;

        vec![
            Effect::Notify(self.snapshot.clone()),
            Effect::WriteBack(live.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_core::{ErrorDetail, ResponseBody, StatusCode};
    use proptest::prelude::*;

    fn live(status: i32) -> ResponseOutcome {
        if (200..300).contains(&status) {
            ResponseOutcome::success(status, ResponseBody::Text("live".to_string()))
        } else {
            ResponseOutcome::failure(status, ErrorDetail::new("live failure"))
        }
    }

    fn not_started() -> ResponseOutcome {
        ResponseOutcome::default()
    }

    fn cached(status: i32) -> ResponseOutcome {
        ResponseOutcome::with_status(status)
    }

    fn count_write_backs(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::WriteBack(_)))
            .count()
    }

    #[test]
    fn test_cached_failure_then_live_failure_supersedes_once() {
        let mut reconciler = Reconciler::new();

        let effects = reconciler.load_cached(cached(404), &not_started());
        assert_eq!(effects.len(), 1);
        assert_eq!(reconciler.phase(), Phase::ShowingCached);

        let first = reconciler.observe_live(&live(404));
        let second = reconciler.observe_live(&live(404));
        assert_eq!(count_write_backs(&first) + count_write_backs(&second), 1);

        let snapshot = reconciler.snapshot();
        assert!(!snapshot.is_cached);
        assert!(snapshot.is_final);
        assert_eq!(snapshot.outcome.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cached_failure_then_live_success_supersedes() {
        let mut reconciler = Reconciler::new();
        reconciler.load_cached(cached(404), &not_started());

        let effects = reconciler.observe_live(&live(200));
        assert_eq!(count_write_backs(&effects), 1);
        assert_eq!(reconciler.snapshot().outcome.status, StatusCode::OK);
        assert!(reconciler.is_final());
    }

    #[test]
    fn test_cached_success_is_not_downgraded() {
        let mut reconciler = Reconciler::new();
        reconciler.load_cached(cached(200), &not_started());

        let effects = reconciler.observe_live(&live(404));
        assert!(effects.is_empty());
        assert_eq!(reconciler.phase(), Phase::ShowingCached);
        assert!(reconciler.snapshot().is_cached);
        assert_eq!(reconciler.snapshot().outcome.status, StatusCode::OK);
    }

    #[test]
    fn test_not_started_status_is_ignored() {
        let mut reconciler = Reconciler::new();
        assert!(reconciler.observe_live(&not_started()).is_empty());

        reconciler.load_cached(cached(500), &not_started());
        assert!(reconciler.observe_live(&not_started()).is_empty());
        assert_eq!(reconciler.phase(), Phase::ShowingCached);
    }

    #[test]
    fn test_live_result_without_cache_hit_goes_final() {
        let mut reconciler = Reconciler::new();
        let effects = reconciler.observe_live(&live(503));

        assert_eq!(count_write_backs(&effects), 1);
        assert_eq!(reconciler.phase(), Phase::Final);
        assert!(!reconciler.snapshot().is_cached);
    }

    #[test]
    fn test_late_cache_hit_is_discarded_after_final() {
        let mut reconciler = Reconciler::new();
        reconciler.observe_live(&live(500));

        let effects = reconciler.load_cached(cached(200), &live(500));
        assert!(effects.is_empty());
        assert_eq!(reconciler.snapshot().outcome.status, StatusCode::new(500));
        assert!(!reconciler.snapshot().is_cached);
    }

    #[test]
    fn test_cache_hit_with_live_success_already_known() {
        let mut reconciler = Reconciler::new();
        let effects = reconciler.load_cached(cached(200), &live(201));

        // Cached value is shown, then immediately replaced.
        assert_eq!(effects.len(), 3);
        assert!(matches!(&effects[0], Effect::Notify(s) if s.is_cached));
        assert!(matches!(&effects[1], Effect::Notify(s) if s.is_final));
        assert!(matches!(&effects[2], Effect::WriteBack(o) if o.status == StatusCode::new(201)));
    }

    #[test]
    fn test_final_is_immutable() {
        let mut reconciler = Reconciler::new();
        reconciler.observe_live(&live(200));
        let frozen = reconciler.snapshot().clone();

        assert!(reconciler.observe_live(&live(500)).is_empty());
        assert!(reconciler.load_cached(cached(404), &live(500)).is_empty());
        assert_eq!(reconciler.snapshot(), &frozen);
    }

    fn arb_status() -> impl Strategy<Value = i32> {
        prop_oneof![
            Just(-100),
            Just(0),
            100..600i32,
        ]
    }

    proptest! {
        #[test]
        fn prop_supersession_rule(
            live_status in arb_status(),
            current_status in arb_status(),
            is_cached in any::<bool>(),
            is_final in any::<bool>(),
        ) {
            let live = ResponseOutcome::with_status(live_status);
            let current = ResponseSnapshot {
                outcome: ResponseOutcome::with_status(current_status),
                is_cached,
                is_final,
            };

            let live_success = (200..300).contains(&live_status);
            let current_success = (200..300).contains(&current_status);
            let expected = !is_final
                && live_status != -100
                && (live_success || !is_cached || !current_success);

            prop_assert_eq!(should_supersede(&live, &current), expected);
        }

        #[test]
        fn prop_at_most_one_write_back(
            cached_status in proptest::option::of(100..600i32),
            statuses in proptest::collection::vec(arb_status(), 0..8),
            lookup_at in 0usize..8,
        ) {
            let mut reconciler = Reconciler::new();
            let mut write_backs = 0;
            let mut latest = ResponseOutcome::default();

            for (index, status) in statuses.iter().enumerate() {
                if index == lookup_at {
                    if let Some(cached_status) = cached_status {
                        write_backs += count_write_backs(
                            &reconciler.load_cached(ResponseOutcome::with_status(cached_status), &latest),
                        );
                    }
                }
                latest = ResponseOutcome::with_status(*status);
                write_backs += count_write_backs(&reconciler.observe_live(&latest));
            }

            prop_assert!(write_backs <= 1);
            prop_assert_eq!(write_backs == 1, reconciler.is_final());
        }
    }
}
