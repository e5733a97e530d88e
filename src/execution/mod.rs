// Trading loop: per-pair rounds and the periodic driver
pub mod coordinator;
pub mod scheduler;

pub use coordinator::{ExecutionCoordinator, PairOutcome, PairReport, PairSpec};
pub use scheduler::Scheduler;
