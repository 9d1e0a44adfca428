//! Game lifecycle: phases, the scheduler that drives them, and crash recovery.

mod phase;
mod scheduler;
mod snapshot;

pub use phase::{GamePhase, PhaseState};
pub use scheduler::{PhaseScheduler, SchedulerParts, TickOutcome};
pub use snapshot::{PersistedState, SnapshotError, SnapshotFile};
