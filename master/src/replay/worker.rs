use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::{prepare_tree, ReplayRequest, ReplayStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerClient;
use crate::store::ReplayRepositoryFactory;

/// Ejecuta un replay ya admitido.
///
/// El implementador es dueño de las transiciones de estado del registro
/// (InProgress y luego Success/Failed), tanto si sale bien como si falla:
/// el pool no toca el store.
#[async_trait]
pub trait ReplayWorker: Send + Sync {
    async fn process(&self, request: &ReplayRequest) -> Result<()>;
}

/// Worker que limpia las corridas afectadas en el scheduler externo,
/// job por job, siguiendo el orden del árbol de dependencias.
pub struct SchedulerReplayWorker {
    scheduler: Arc<dyn SchedulerClient>,
    repos: Arc<dyn ReplayRepositoryFactory>,
}

impl SchedulerReplayWorker {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, repos: Arc<dyn ReplayRepositoryFactory>) -> Self {
        Self { scheduler, repos }
    }

    async fn clear_tree(&self, request: &ReplayRequest) -> Result<String> {
        let tree = prepare_tree(request).context("no se pudo armar el árbol de dependencias")?;

        let mut cleared_jobs = 0;
        for node in tree.walk_order() {
            let (Some(first), Some(last)) = (node.runs.first(), node.runs.last()) else {
                debug!("job {} sin corridas en el rango, lo salteamos", node.name);
                continue;
            };

            self.scheduler
                .clear_runs(&request.project, &node.name, *first, *last)
                .await
                .with_context(|| format!("falló el clear de {} en el scheduler", node.name))?;
            cleared_jobs += 1;
        }

        Ok(format!(
            "{} corridas re-ejecutadas en {} jobs",
            tree.total_runs(),
            cleared_jobs
        ))
    }
}

#[async_trait]
impl ReplayWorker for SchedulerReplayWorker {
    async fn process(&self, request: &ReplayRequest) -> Result<()> {
        let id = request
            .id
            .ok_or_else(|| anyhow!("pedido de replay sin id"))?;
        let repo = self.repos.for_job(&request.job);

        repo.update_status(id, ReplayStatus::InProgress, None).await?;

        match self.clear_tree(request).await {
            Ok(summary) => {
                info!("replay {} terminado: {}", id, summary);
                repo.update_status(id, ReplayStatus::Success, Some(summary))
                    .await?;
                Ok(())
            }
            Err(e) => {
                let message = format!("{e:#}");
                if let Err(store_err) = repo
                    .update_status(id, ReplayStatus::Failed, Some(message.clone()))
                    .await
                {
                    warn!(
                        "no se pudo marcar el replay {} como FAILED: {}",
                        id, store_err
                    );
                }
                Err(e)
            }
        }
    }
}
