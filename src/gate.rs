use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

// ============================================================================
// Admission Gate
// ============================================================================

/// Single-flight latch between the camera producer and the detector.
///
/// At most one frame is admitted at a time. Frames offered while a detection
/// is in flight are dropped, never buffered, so a slow detector can not grow
/// a backlog behind it.
///
/// # Thread Safety
///
/// `try_admit` and `release` may be called from different threads. Admission
/// is a single compare-exchange (`Acquire` on success) and the reset is a
/// `Release` store, so a producer that wins the exchange observes everything
/// the detector context did before releasing.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    busy: AtomicBool,
    metrics: GateMetrics,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the gate busy and returns `true` if no detection is in flight.
    /// Returns `false` without touching the latch otherwise.
    #[must_use = "a dropped admission means the frame must not be submitted"]
    pub fn try_admit(&self) -> bool {
        let admitted = self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();

        if admitted {
            self.metrics.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        }
        trace!(admitted, "admission attempt");
        admitted
    }

    /// Clears the busy flag. Calling it on an idle gate is a no-op.
    pub fn release(&self) {
        if self.busy.swap(false, Ordering::Release) {
            self.metrics.released.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.metrics.snapshot()
    }
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Default)]
struct GateMetrics {
    admitted: AtomicU64,
    dropped: AtomicU64,
    released: AtomicU64,
}

impl GateMetrics {
    fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the gate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub admitted: u64,
    pub dropped: u64,
    pub released: u64,
}

impl GateSnapshot {
    /// Frames admitted but not yet released. Never exceeds one.
    pub fn in_flight(&self) -> u64 {
        self.admitted.saturating_sub(self.released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn admits_when_idle() {
        let gate = AdmissionGate::new();
        assert!(gate.try_admit());
        assert!(gate.is_busy());
    }

    #[test]
    fn rejects_while_busy_without_state_change() {
        let gate = AdmissionGate::new();
        assert!(gate.try_admit());
        let before = gate.snapshot();

        assert!(!gate.try_admit());
        assert!(gate.is_busy());

        let after = gate.snapshot();
        assert_eq!(after.admitted, before.admitted);
        assert_eq!(after.released, before.released);
        assert_eq!(after.dropped, before.dropped + 1);
    }

    #[test]
    fn release_is_idempotent() {
        let gate = AdmissionGate::new();
        assert!(gate.try_admit());
        gate.release();
        let once = (gate.is_busy(), gate.snapshot());
        gate.release();
        let twice = (gate.is_busy(), gate.snapshot());
        assert_eq!(once, twice);
        assert!(!gate.is_busy());
    }

    #[test]
    fn release_on_fresh_gate_is_noop() {
        let gate = AdmissionGate::new();
        gate.release();
        assert!(!gate.is_busy());
        assert_eq!(gate.snapshot(), GateSnapshot::default());
    }

    #[test]
    fn readmits_after_release() {
        let gate = AdmissionGate::new();
        assert!(gate.try_admit());
        gate.release();
        assert!(gate.try_admit());
        assert_eq!(gate.snapshot().admitted, 2);
    }

    #[test]
    fn concurrent_admission_has_single_winner() {
        const THREADS: usize = 16;
        let gate = Arc::new(AdmissionGate::new());
        let barrier = Arc::new(Barrier::new(THREADS));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    if gate.try_admit() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(gate.snapshot().dropped, (THREADS - 1) as u64);
    }

    #[test]
    fn producer_and_releaser_never_overlap() {
        let gate = Arc::new(AdmissionGate::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let releaser = {
            let gate = Arc::clone(&gate);
            let in_flight = Arc::clone(&in_flight);
            thread::spawn(move || {
                for () in rx {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    gate.release();
                }
            })
        };

        for _ in 0..10_000 {
            if gate.try_admit() {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                assert!(now <= 1, "more than one frame in flight");
                tx.send(()).unwrap();
            }
        }
        drop(tx);
        releaser.join().unwrap();

        assert!(!gate.is_busy());
        assert_eq!(gate.snapshot().in_flight(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Admit,
        Release,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Admit), Just(Op::Release)]
    }

    proptest! {
        #[test]
        fn in_flight_never_exceeds_one(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let gate = AdmissionGate::new();
            let mut outstanding = 0u32;

            for op in ops {
                match op {
                    Op::Admit => {
                        let was_busy = gate.is_busy();
                        let admitted = gate.try_admit();
                        prop_assert_eq!(admitted, !was_busy);
                        if admitted {
                            outstanding += 1;
                        }
                    }
                    Op::Release => {
                        gate.release();
                        outstanding = 0;
                    }
                }
                prop_assert!(outstanding <= 1);
                prop_assert!(gate.snapshot().in_flight() <= 1);
                prop_assert_eq!(gate.is_busy(), outstanding == 1);
            }
        }
    }
}
