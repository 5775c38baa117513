pub mod error;
pub mod manager;
pub mod pool;
pub mod queue;
pub mod validator;
pub mod worker;

pub use error::ReplayError;
pub use manager::{IdProvider, ReplayManager, ReplayManagerConfig, UuidProvider};
pub use pool::{ReplayEvent, ReplayOutcome};
pub use validator::ConflictPolicy;
pub use worker::{ReplayWorker, SchedulerReplayWorker};
