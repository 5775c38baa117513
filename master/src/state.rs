// master/src/state.rs

use common::{JobSpecMap, ProjectSpec};
use std::sync::Arc;

use crate::replay::ReplayManager;
use crate::store::InMemoryReplayStore;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ReplayManager>,
    pub store: InMemoryReplayStore,
    pub project: Arc<ProjectSpec>,
    // specs vigentes; se usan para resolver dependientes en cada pedido
    pub jobs: Arc<JobSpecMap>,
}

impl AppState {
    pub fn new(
        manager: Arc<ReplayManager>,
        store: InMemoryReplayStore,
        project: ProjectSpec,
        jobs: Arc<JobSpecMap>,
    ) -> Self {
        Self {
            manager,
            store,
            project: Arc::new(project),
            jobs,
        }
    }
}
