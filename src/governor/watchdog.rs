//! Held-lock watchdog.
//!
//! A background thread periodically scans the governor's held locks. Any lock
//! held past the configured threshold is reported as a deadlock risk with its
//! recorded call site. When the offender is the improvement cycle, the
//! watchdog additionally raises the cycle's supervised-abort flag.

use crate::governor::cycle::CancelFlag;
use crate::governor::order::{LockGovernor, Subsystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Watchdog scan settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Interval between scans.
    pub interval_ms: u64,
    /// Held-lock age that triggers a risk report.
    pub held_too_long_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            held_too_long_ms: 10_000,
        }
    }
}

/// One diagnosed deadlock-risk event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub subsystem: Subsystem,
    pub site: String,
    pub held_for_ms: u64,
    pub reported_at: DateTime<Utc>,
    /// Whether a supervised abort was triggered for this event.
    pub abort_triggered: bool,
}

struct Shared {
    events: Mutex<Vec<RiskEvent>>,
    cycle_abort: Mutex<Option<CancelFlag>>,
    stop: AtomicBool,
}

/// Background lock-age scanner. Stops when dropped.
pub struct LockWatchdog {
    shared: Arc<Shared>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl LockWatchdog {
    /// Start scanning the given governor.
    pub fn start(governor: LockGovernor, config: WatchdogConfig) -> Self {
        let shared = Arc::new(Shared {
            events: Mutex::new(Vec::new()),
            cycle_abort: Mutex::new(None),
            stop: AtomicBool::new(false),
        });
        let thread_shared = Arc::clone(&shared);
        let interval = Duration::from_millis(config.interval_ms.max(1));
        let threshold = Duration::from_millis(config.held_too_long_ms);

        let thread = std::thread::Builder::new()
            .name("lock-watchdog".to_string())
            .spawn(move || {
                while !thread_shared.stop.load(Ordering::Relaxed) {
                    Self::scan(&governor, &thread_shared, threshold);
                    std::thread::sleep(interval);
                }
            })
            .expect("failed to spawn watchdog thread");

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Register the improvement cycle's abort flag for supervised aborts.
    pub fn register_cycle_abort(&self, flag: CancelFlag) {
        if let Ok(mut slot) = self.shared.cycle_abort.lock() {
            *slot = Some(flag);
        }
    }

    /// Risk events reported so far.
    pub fn events(&self) -> Vec<RiskEvent> {
        self.shared
            .events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    fn scan(governor: &LockGovernor, shared: &Shared, threshold: Duration) {
        for held in governor.held_locks() {
            if held.held_for < threshold {
                continue;
            }
            // Only the exclusive long-running cycle is ever aborted; every
            // other subsystem is report-only.
            let abort = held.subsystem == Subsystem::ImprovementCycle;
            if abort {
                if let Ok(slot) = shared.cycle_abort.lock() {
                    if let Some(flag) = slot.as_ref() {
                        flag.cancel();
                    }
                }
            }
            warn!(
                subsystem = %held.subsystem,
                site = held.site,
                held_for_ms = held.held_for.as_millis() as u64,
                abort_triggered = abort,
                "Lock held past threshold: diagnosed deadlock risk"
            );
            if let Ok(mut events) = shared.events.lock() {
                events.push(RiskEvent {
                    subsystem: held.subsystem,
                    site: held.site.to_string(),
                    held_for_ms: held.held_for.as_millis() as u64,
                    reported_at: Utc::now(),
                    abort_triggered: abort,
                });
            }
        }
    }
}

impl Drop for LockWatchdog {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
