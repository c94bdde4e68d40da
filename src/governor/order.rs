//! Globally ordered subsystem locks.
//!
//! Every subsystem that can require exclusive access has a fixed rank. A
//! thread may only acquire a lock whose rank is strictly greater than the
//! highest rank it already holds, which makes circular wait impossible.
//! Acquisition is bounded: it either succeeds within `max_wait` or fails with
//! a retryable timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Subsystems that take exclusive locks, in ascending rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Config,
    WorldSwap,
    ModelSwap,
    ScriptSwap,
    MetricsWrite,
    ImprovementCycle,
}

impl Subsystem {
    /// Rank in the global acquisition order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Config => 0,
            Self::WorldSwap => 1,
            Self::ModelSwap => 2,
            Self::ScriptSwap => 3,
            Self::MetricsWrite => 4,
            Self::ImprovementCycle => 5,
        }
    }

    /// All subsystems in rank order.
    pub fn all() -> &'static [Subsystem] {
        &[
            Self::Config,
            Self::WorldSwap,
            Self::ModelSwap,
            Self::ScriptSwap,
            Self::MetricsWrite,
            Self::ImprovementCycle,
        ]
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::WorldSwap => write!(f, "world_swap"),
            Self::ModelSwap => write!(f, "model_swap"),
            Self::ScriptSwap => write!(f, "script_swap"),
            Self::MetricsWrite => write!(f, "metrics_write"),
            Self::ImprovementCycle => write!(f, "improvement_cycle"),
        }
    }
}

/// Error type for governor operations.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// Retryable: the lock could not be acquired within the wait bound.
    #[error("Timed out waiting for {subsystem} lock after {waited_ms}ms")]
    LockTimeout { subsystem: Subsystem, waited_ms: u64 },

    /// The calling thread already holds a lock of equal or higher rank.
    #[error("Lock order violation: {attempted} (rank {attempted_rank}) requested while holding rank {held_rank}")]
    OrderViolation {
        attempted: Subsystem,
        attempted_rank: u8,
        held_rank: u8,
    },

    #[error("Governor state poisoned")]
    Poisoned,
}

/// Result type for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Snapshot of one currently held lock, as seen by the watchdog.
#[derive(Debug, Clone)]
pub struct HeldLock {
    pub subsystem: Subsystem,
    pub site: &'static str,
    pub acquired_at: DateTime<Utc>,
    pub held_for: Duration,
}

struct HeldEntry {
    site: &'static str,
    since: Instant,
    since_wall: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    held: HashMap<Subsystem, HeldEntry>,
    // Ranks held per thread, for order enforcement.
    thread_ranks: HashMap<ThreadId, Vec<u8>>,
}

struct Core {
    inner: Mutex<Inner>,
    freed: Condvar,
}

/// The governor. Cheap to clone; all clones share one lock table.
#[derive(Clone)]
pub struct LockGovernor {
    core: Arc<Core>,
}

impl LockGovernor {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Core {
                inner: Mutex::new(Inner::default()),
                freed: Condvar::new(),
            }),
        }
    }

    /// Acquire `subsystem` for the calling thread, waiting at most `max_wait`.
    ///
    /// Fails fast with [`GovernorError::OrderViolation`] before waiting if the
    /// thread already holds an equal or higher rank, and with
    /// [`GovernorError::LockTimeout`] (retryable) when the wait bound elapses.
    pub fn acquire(
        &self,
        subsystem: Subsystem,
        max_wait: Duration,
        site: &'static str,
    ) -> GovernorResult<LockTicket> {
        let thread = std::thread::current().id();
        let started = Instant::now();

        let mut inner = self.core.inner.lock().map_err(|_| GovernorError::Poisoned)?;
        self.check_order(&inner, thread, subsystem)?;

        while inner.held.contains_key(&subsystem) {
            let waited = started.elapsed();
            if waited >= max_wait {
                debug!(%subsystem, waited_ms = waited.as_millis() as u64, "Lock wait bound elapsed");
                return Err(GovernorError::LockTimeout {
                    subsystem,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let (guard, result) = self
                .core
                .freed
                .wait_timeout(inner, max_wait - waited)
                .map_err(|_| GovernorError::Poisoned)?;
            inner = guard;
            if result.timed_out() && inner.held.contains_key(&subsystem) {
                return Err(GovernorError::LockTimeout {
                    subsystem,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            // Re-check ordering: the thread cannot have gained locks while
            // blocked here, but keep the invariant explicit.
            self.check_order(&inner, thread, subsystem)?;
        }

        self.grant(&mut inner, thread, subsystem, site);
        Ok(self.ticket(thread, subsystem, site))
    }

    /// Non-blocking acquire. `Ok(None)` means the slot is busy.
    pub fn try_acquire(
        &self,
        subsystem: Subsystem,
        site: &'static str,
    ) -> GovernorResult<Option<LockTicket>> {
        let thread = std::thread::current().id();
        let mut inner = self.core.inner.lock().map_err(|_| GovernorError::Poisoned)?;
        self.check_order(&inner, thread, subsystem)?;

        if inner.held.contains_key(&subsystem) {
            return Ok(None);
        }
        self.grant(&mut inner, thread, subsystem, site);
        Ok(Some(self.ticket(thread, subsystem, site)))
    }

    /// Snapshot of currently held locks for the watchdog.
    pub fn held_locks(&self) -> Vec<HeldLock> {
        let Ok(inner) = self.core.inner.lock() else {
            return Vec::new();
        };
        inner
            .held
            .iter()
            .map(|(subsystem, entry)| HeldLock {
                subsystem: *subsystem,
                site: entry.site,
                acquired_at: entry.since_wall,
                held_for: entry.since.elapsed(),
            })
            .collect()
    }

    fn check_order(
        &self,
        inner: &Inner,
        thread: ThreadId,
        subsystem: Subsystem,
    ) -> GovernorResult<()> {
        if let Some(ranks) = inner.thread_ranks.get(&thread) {
            if let Some(&highest) = ranks.iter().max() {
                if subsystem.rank() <= highest {
                    warn!(
                        attempted = %subsystem,
                        held_rank = highest,
                        "Lock order violation rejected"
                    );
                    debug_assert!(
                        false,
                        "lock order violation: {} after rank {}",
                        subsystem, highest
                    );
                    return Err(GovernorError::OrderViolation {
                        attempted: subsystem,
                        attempted_rank: subsystem.rank(),
                        held_rank: highest,
                    });
                }
            }
        }
        Ok(())
    }

    fn grant(&self, inner: &mut Inner, thread: ThreadId, subsystem: Subsystem, site: &'static str) {
        inner.held.insert(
            subsystem,
            HeldEntry {
                site,
                since: Instant::now(),
                since_wall: Utc::now(),
            },
        );
        inner
            .thread_ranks
            .entry(thread)
            .or_default()
            .push(subsystem.rank());
        debug!(%subsystem, site, "Lock acquired");
    }

    fn ticket(&self, holder: ThreadId, subsystem: Subsystem, site: &'static str) -> LockTicket {
        LockTicket {
            core: Arc::clone(&self.core),
            holder,
            subsystem,
            acquired_at: Utc::now(),
            site,
        }
    }

    fn release(&self, ticket: &LockTicket) {
        let Ok(mut inner) = self.core.inner.lock() else {
            return;
        };
        inner.held.remove(&ticket.subsystem);
        if let Some(ranks) = inner.thread_ranks.get_mut(&ticket.holder) {
            if let Some(pos) = ranks.iter().rposition(|&r| r == ticket.subsystem.rank()) {
                ranks.remove(pos);
            }
            if ranks.is_empty() {
                inner.thread_ranks.remove(&ticket.holder);
            }
        }
        drop(inner);
        self.core.freed.notify_all();
        debug!(subsystem = %ticket.subsystem, "Lock released");
    }
}

impl Default for LockGovernor {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of a held subsystem lock. Releases on drop, so nested tickets
/// release in reverse acquisition order.
pub struct LockTicket {
    core: Arc<Core>,
    holder: ThreadId,
    pub subsystem: Subsystem,
    pub acquired_at: DateTime<Utc>,
    pub site: &'static str,
}

impl LockTicket {
    /// Rank of the held lock.
    pub fn rank(&self) -> u8 {
        self.subsystem.rank()
    }
}

impl Drop for LockTicket {
    fn drop(&mut self) {
        let governor = LockGovernor {
            core: Arc::clone(&self.core),
        };
        governor.release(self);
    }
}

impl std::fmt::Debug for LockTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTicket")
            .field("subsystem", &self.subsystem)
            .field("site", &self.site)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn test_acquire_and_release() {
        let governor = LockGovernor::new();
        {
            let ticket = governor.acquire(Subsystem::ModelSwap, WAIT, "test").unwrap();
            assert_eq!(ticket.subsystem, Subsystem::ModelSwap);
            assert_eq!(governor.held_locks().len(), 1);
        }
        assert!(governor.held_locks().is_empty());
    }

    #[test]
    fn test_ascending_order_allowed() {
        let governor = LockGovernor::new();
        let _config = governor.acquire(Subsystem::Config, WAIT, "test").unwrap();
        let _model = governor.acquire(Subsystem::ModelSwap, WAIT, "test").unwrap();
        let _metrics = governor
            .acquire(Subsystem::MetricsWrite, WAIT, "test")
            .unwrap();
        assert_eq!(governor.held_locks().len(), 3);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "lock order violation"))]
    fn test_descending_order_rejected() {
        let governor = LockGovernor::new();
        let _model = governor.acquire(Subsystem::ModelSwap, WAIT, "test").unwrap();
        // model_swap then world_swap from the same thread must fail fast.
        let result = governor.acquire(Subsystem::WorldSwap, WAIT, "test");
        assert!(matches!(
            result,
            Err(GovernorError::OrderViolation { .. })
        ));
    }

    #[test]
    fn test_same_rank_reentry_rejected() {
        let governor = LockGovernor::new();
        let _first = governor.acquire(Subsystem::ScriptSwap, WAIT, "test").unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            governor.acquire(Subsystem::ScriptSwap, WAIT, "test")
        }));
        // Debug builds assert; release builds return the error.
        match result {
            Ok(inner) => assert!(matches!(inner, Err(GovernorError::OrderViolation { .. }))),
            Err(_) => {}
        }
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let governor = LockGovernor::new();
        let governor2 = governor.clone();
        let ticket = governor.acquire(Subsystem::ModelSwap, WAIT, "holder").unwrap();

        let handle = std::thread::spawn(move || {
            governor2.acquire(Subsystem::ModelSwap, Duration::from_millis(20), "waiter")
        });
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(GovernorError::LockTimeout { .. })));
        drop(ticket);
    }

    #[test]
    fn test_release_wakes_waiter() {
        let governor = LockGovernor::new();
        let governor2 = governor.clone();
        let ticket = governor.acquire(Subsystem::ModelSwap, WAIT, "holder").unwrap();

        let handle = std::thread::spawn(move || {
            governor2.acquire(Subsystem::ModelSwap, Duration::from_secs(2), "waiter")
        });
        std::thread::sleep(Duration::from_millis(20));
        drop(ticket);
        let result = handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_try_acquire_skips_when_busy() {
        let governor = LockGovernor::new();
        let governor2 = governor.clone();
        let _held = governor
            .acquire(Subsystem::ImprovementCycle, WAIT, "cycle")
            .unwrap();

        let handle =
            std::thread::spawn(move || governor2.try_acquire(Subsystem::ImprovementCycle, "again"));
        let second = handle.join().unwrap().unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_ranks_are_strictly_ascending() {
        let ranks: Vec<u8> = Subsystem::all().iter().map(|s| s.rank()).collect();
        for pair in ranks.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
