pub mod api;
pub mod dag;
pub mod job;
pub mod replay;
pub mod worker;

pub use api::{ApiError, ReplayAccepted, ReplayCreateRequest, ReplayPlan};
pub use dag::{prepare_tree, prepare_tree_for, DependencyTree, TreeError, TreeNode};
pub use job::{
    index_jobs, JobName, JobSchedule, JobSpec, JobSpecFile, JobSpecMap, JobTask, ProjectSpec,
    ScheduleInterval, TaskKind,
};
pub use replay::{date_window, ReplayId, ReplayRecord, ReplayRequest, ReplayStatus};
pub use worker::WorkerPoolMetrics;
