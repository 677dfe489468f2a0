//! BootForge resource admission controller
//!
//! Bounds the number of privileged operations running at once. Overflow
//! callers queue FIFO up to a backlog limit, then are rejected outright.
//! A low-frequency pressure sampler flips a degraded-mode flag with
//! enter/exit hysteresis; degraded mode halves the effective ceiling and
//! shortens downstream timeouts so backlogs drain. A separate sweep
//! force-releases slots held past a maximum age as last-resort leak
//! recovery, never on the fast path.

#![deny(unsafe_code)]

use forge_types::OperationId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Queue is at its backlog limit; the caller should back off
    #[error("admission backlog full")]
    BacklogFull,

    /// The controller dropped the queued waiter before a slot opened
    #[error("admission queue closed")]
    QueueClosed,
}

#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Concurrency ceiling under normal conditions
    pub baseline: usize,
    /// Queued waiters beyond which callers are rejected
    pub max_queue: usize,
    /// Slots held longer than this are force-released by the sweep
    pub max_slot_age: Duration,
    /// Pressure ratio at or above which degraded mode engages
    pub degraded_enter: f64,
    /// Pressure ratio at or below which degraded mode disengages
    pub degraded_exit: f64,
    /// Lower bound for degraded-mode timeout shortening
    pub timeout_floor: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            baseline: 4,
            max_queue: 16,
            max_slot_age: Duration::from_secs(600),
            degraded_enter: 0.85,
            degraded_exit: 0.70,
            timeout_floor: Duration::from_secs(5),
        }
    }
}

/// Immediate outcome of a slot request.
pub enum Admission {
    /// A slot was taken; the caller must `release` when done
    Admitted,
    /// Queued FIFO; the receiver fires once the slot is held
    Queued(oneshot::Receiver<()>),
    /// Backlog full
    Rejected,
}

struct Slot {
    kind: String,
    acquired_at: Instant,
}

struct Waiter {
    operation: OperationId,
    kind: String,
    ready: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    active: HashMap<OperationId, Slot>,
    queue: VecDeque<Waiter>,
}

pub struct AdmissionController {
    config: AdmissionConfig,
    state: Mutex<State>,
    degraded: AtomicBool,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            degraded: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Ceiling currently in force. Degraded mode halves the baseline but
    /// never below one so work keeps draining.
    pub fn effective_limit(&self) -> usize {
        if self.is_degraded() {
            (self.config.baseline / 2).max(1)
        } else {
            self.config.baseline
        }
    }

    /// Shorten a downstream timeout while degraded, bounded below by the
    /// configured floor.
    pub fn adjusted_timeout(&self, base: Duration) -> Duration {
        if self.is_degraded() {
            (base / 2).max(self.config.timeout_floor)
        } else {
            base
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Non-blocking slot request.
    pub fn try_acquire(&self, operation: &OperationId, kind: impl Into<String>) -> Admission {
        let kind = kind.into();
        let limit = self.effective_limit();
        let mut state = self.lock();

        if state.active.len() < limit {
            state.active.insert(
                operation.clone(),
                Slot {
                    kind: kind.clone(),
                    acquired_at: Instant::now(),
                },
            );
            debug!(operation = %operation, %kind, active = state.active.len(), "slot acquired");
            return Admission::Admitted;
        }

        if state.queue.len() >= self.config.max_queue {
            warn!(operation = %operation, %kind, queued = state.queue.len(), "backlog full, rejecting");
            return Admission::Rejected;
        }

        let (tx, rx) = oneshot::channel();
        state.queue.push_back(Waiter {
            operation: operation.clone(),
            kind,
            ready: tx,
        });
        debug!(operation = %operation, queued = state.queue.len(), "queued for a slot");
        Admission::Queued(rx)
    }

    /// Acquire a slot, suspending in the FIFO queue if the ceiling is
    /// reached. No worker thread is held while waiting.
    pub async fn acquire(
        &self,
        operation: &OperationId,
        kind: impl Into<String>,
    ) -> Result<(), AdmissionError> {
        match self.try_acquire(operation, kind) {
            Admission::Admitted => Ok(()),
            Admission::Queued(rx) => rx.await.map_err(|_| AdmissionError::QueueClosed),
            Admission::Rejected => Err(AdmissionError::BacklogFull),
        }
    }

    /// Free a slot and promote the oldest queued waiter the limit allows.
    pub fn release(&self, operation: &OperationId) {
        let mut state = self.lock();
        if state.active.remove(operation).is_some() {
            debug!(operation = %operation, "slot released");
        }
        self.promote(&mut state);
    }

    fn promote(&self, state: &mut State) {
        let limit = self.effective_limit();
        while state.active.len() < limit {
            let Some(waiter) = state.queue.pop_front() else {
                break;
            };
            state.active.insert(
                waiter.operation.clone(),
                Slot {
                    kind: waiter.kind,
                    acquired_at: Instant::now(),
                },
            );
            // A waiter that gave up has a dropped receiver; put the slot back
            if waiter.ready.send(()).is_err() {
                state.active.remove(&waiter.operation);
            }
        }
    }

    /// One sampler step: fold a pressure reading into the degraded flag
    /// with enter/exit hysteresis. Returns the flag after the step.
    pub fn sample_once(&self, pressure: f64) -> bool {
        let was = self.is_degraded();
        if !was && pressure >= self.config.degraded_enter {
            self.degraded.store(true, Ordering::Relaxed);
            warn!(%pressure, limit = self.effective_limit(), "entering degraded mode");
        } else if was && pressure <= self.config.degraded_exit {
            self.degraded.store(false, Ordering::Relaxed);
            info!(%pressure, "leaving degraded mode");
        }
        self.is_degraded()
    }

    /// One sweep step: force-release slots held past `max_slot_age`.
    /// Returns the operations reclaimed.
    pub fn sweep_once(&self) -> Vec<OperationId> {
        let mut state = self.lock();
        let stale: Vec<OperationId> = state
            .active
            .iter()
            .filter(|(_, slot)| slot.acquired_at.elapsed() > self.config.max_slot_age)
            .map(|(op, _)| op.clone())
            .collect();
        for op in &stale {
            if let Some(slot) = state.active.remove(op) {
                warn!(
                    operation = %op,
                    kind = %slot.kind,
                    held_for_secs = slot.acquired_at.elapsed().as_secs(),
                    forced = true,
                    "slot force-released by sweep"
                );
            }
        }
        if !stale.is_empty() {
            self.promote(&mut state);
        }
        stale
    }

    /// Background pressure sampler; `pressure` is polled each interval.
    pub fn spawn_sampler<F>(
        self: &Arc<Self>,
        interval: Duration,
        pressure: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn() -> f64 + Send + 'static,
    {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                controller.sample_once(pressure());
            }
        })
    }

    /// Background stale-slot sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                controller.sweep_once();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(n: usize) -> OperationId {
        OperationId::new(format!("op-{n}"))
    }

    fn controller(config: AdmissionConfig) -> AdmissionController {
        AdmissionController::new(config)
    }

    #[test]
    fn admits_queues_then_rejects() {
        let ctl = controller(AdmissionConfig {
            baseline: 2,
            max_queue: 1,
            ..Default::default()
        });

        assert!(matches!(ctl.try_acquire(&op(1), "flash"), Admission::Admitted));
        assert!(matches!(ctl.try_acquire(&op(2), "flash"), Admission::Admitted));
        assert!(matches!(ctl.try_acquire(&op(3), "flash"), Admission::Queued(_)));
        assert!(matches!(ctl.try_acquire(&op(4), "flash"), Admission::Rejected));
        assert_eq!(ctl.active_count(), 2);
        assert_eq!(ctl.queued_count(), 1);
    }

    #[tokio::test]
    async fn release_promotes_the_oldest_waiter_first() {
        let ctl = controller(AdmissionConfig {
            baseline: 1,
            max_queue: 4,
            ..Default::default()
        });

        assert!(matches!(ctl.try_acquire(&op(1), "unlock"), Admission::Admitted));
        let Admission::Queued(first) = ctl.try_acquire(&op(2), "unlock") else {
            panic!("expected queued");
        };
        let Admission::Queued(mut second) = ctl.try_acquire(&op(3), "unlock") else {
            panic!("expected queued");
        };

        ctl.release(&op(1));
        first.await.unwrap();
        // Second is still waiting
        assert!(second.try_recv().is_err());
        assert_eq!(ctl.active_count(), 1);

        ctl.release(&op(2));
        second.await.unwrap();
    }

    #[tokio::test]
    async fn acquire_suspends_until_a_slot_frees() {
        let ctl = Arc::new(controller(AdmissionConfig {
            baseline: 1,
            max_queue: 4,
            ..Default::default()
        }));
        ctl.acquire(&op(1), "wipe").await.unwrap();

        let waiter = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.acquire(&op(2), "wipe").await })
        };
        tokio::task::yield_now().await;
        ctl.release(&op(1));
        waiter.await.unwrap().unwrap();
        assert_eq!(ctl.active_count(), 1);
    }

    #[test]
    fn degraded_mode_halves_the_ceiling_with_a_floor_of_one() {
        let ctl = controller(AdmissionConfig {
            baseline: 4,
            ..Default::default()
        });
        assert_eq!(ctl.effective_limit(), 4);
        ctl.sample_once(0.9);
        assert_eq!(ctl.effective_limit(), 2);

        let tiny = controller(AdmissionConfig {
            baseline: 1,
            ..Default::default()
        });
        tiny.sample_once(0.9);
        assert_eq!(tiny.effective_limit(), 1);
    }

    #[test]
    fn sampler_hysteresis_holds_between_thresholds() {
        let ctl = controller(AdmissionConfig::default());
        assert!(!ctl.sample_once(0.80));
        assert!(ctl.sample_once(0.90));
        // Between exit and enter: stays degraded
        assert!(ctl.sample_once(0.78));
        assert!(!ctl.sample_once(0.60));
        // And stays normal on the way back up short of the enter mark
        assert!(!ctl.sample_once(0.78));
    }

    #[test]
    fn degraded_timeouts_are_halved_down_to_the_floor() {
        let ctl = controller(AdmissionConfig {
            timeout_floor: Duration::from_secs(5),
            ..Default::default()
        });
        let base = Duration::from_secs(60);
        assert_eq!(ctl.adjusted_timeout(base), base);

        ctl.sample_once(0.95);
        assert_eq!(ctl.adjusted_timeout(base), Duration::from_secs(30));
        assert_eq!(ctl.adjusted_timeout(Duration::from_secs(6)), Duration::from_secs(5));
    }

    #[test]
    fn sweep_reclaims_stale_slots_and_promotes() {
        let ctl = controller(AdmissionConfig {
            baseline: 1,
            max_slot_age: Duration::ZERO,
            ..Default::default()
        });
        assert!(matches!(ctl.try_acquire(&op(1), "flash"), Admission::Admitted));
        let Admission::Queued(mut rx) = ctl.try_acquire(&op(2), "flash") else {
            panic!("expected queued");
        };

        let reclaimed = ctl.sweep_once();
        assert_eq!(reclaimed, vec![op(1)]);
        assert!(rx.try_recv().is_ok());
        assert_eq!(ctl.active_count(), 1);
    }

    #[test]
    fn sweep_leaves_fresh_slots_alone() {
        let ctl = controller(AdmissionConfig::default());
        assert!(matches!(ctl.try_acquire(&op(1), "flash"), Admission::Admitted));
        assert!(ctl.sweep_once().is_empty());
        assert_eq!(ctl.active_count(), 1);
    }
}
