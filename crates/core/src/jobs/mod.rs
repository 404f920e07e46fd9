pub mod engine;
pub mod worker;

pub use engine::{AwardJobEngine, JobEngineConfig, JobStep, QueueError, RetryPolicy};
pub use worker::{AwardJobWorker, CommitOutcome, CommitPath, WorkOutcome, WorkerSettings};
