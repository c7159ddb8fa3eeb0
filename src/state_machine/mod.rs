mod job;
mod state;

pub use job::{CompiledJob, DEFAULT_JOB_INK_M, JobOutcome, JobQueue};
pub use state::{Event, RunState, StateMachine};
