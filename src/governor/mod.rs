//! Lock/Update Governor.
//!
//! A fixed total order over every subsystem that ever needs exclusive access
//! alongside others. Acquisition out of order is rejected immediately, waits
//! are bounded, and a watchdog reports locks held past a threshold. The
//! long-running improvement cycle runs at most once at a time via a
//! non-blocking try-acquire on its slot.

pub mod cycle;
pub mod order;
pub mod watchdog;

pub use cycle::{CancelFlag, CycleError, CycleOutcome, ImprovementCycle, ImprovementSource};
pub use order::{GovernorError, GovernorResult, HeldLock, LockGovernor, LockTicket, Subsystem};
pub use watchdog::{LockWatchdog, RiskEvent, WatchdogConfig};
