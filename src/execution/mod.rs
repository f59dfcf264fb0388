// Exit management, entry decisions and the reconciliation loop
pub mod executor;
pub mod scheduler;
pub mod trailing;

pub use executor::{ExecutionAction, ExecutionDecision, Executor};
pub use scheduler::{ClosedPosition, CycleReport, OpenedPosition, ReconciliationScheduler};
pub use trailing::{TrailingConfig, TrailingDecision, TrailingState, TrailingStopTracker};
