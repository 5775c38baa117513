// master/src/store.rs

use async_trait::async_trait;
use chrono::Utc;
use common::{JobSpec, ReplayId, ReplayRecord, ReplayStatus};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Ningún registro coincide con la consulta.
    #[error("replay no encontrado")]
    NotFound,

    #[error("ya existe un replay con id {0}")]
    Duplicate(ReplayId),

    #[error("error del backend de replays: {0}")]
    Backend(String),
}

/// Repositorio de replays visto desde un job.
#[async_trait]
pub trait ReplayRepository: Send + Sync {
    async fn insert(&self, record: &ReplayRecord) -> Result<(), StoreError>;

    /// Devuelve `StoreError::NotFound` si ningún replay tiene esos estados.
    async fn get_by_status(&self, statuses: &[ReplayStatus]) -> Result<Vec<ReplayRecord>, StoreError>;

    async fn get_by_id(&self, id: ReplayId) -> Result<ReplayRecord, StoreError>;

    async fn update_status(
        &self,
        id: ReplayId,
        status: ReplayStatus,
        message: Option<String>,
    ) -> Result<(), StoreError>;
}

pub trait ReplayRepositoryFactory: Send + Sync {
    fn for_job(&self, job: &JobSpec) -> Arc<dyn ReplayRepository>;
}

/// Store en memoria compartido por todos los repositorios por job.
/// Las consultas por estado abarcan todo el proyecto: un replay de `x`
/// tiene que ver los replays activos de sus dependientes.
#[derive(Clone, Default)]
pub struct InMemoryReplayStore {
    records: Arc<Mutex<HashMap<ReplayId, ReplayRecord>>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<ReplayId, ReplayRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: ReplayId) -> Option<ReplayRecord> {
        self.records().get(&id).cloned()
    }

    /// Lista replays (opcionalmente filtrados por estado), más recientes primero.
    pub fn list(&self, status: Option<ReplayStatus>) -> Vec<ReplayRecord> {
        let mut out: Vec<ReplayRecord> = self
            .records()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }
}

impl ReplayRepositoryFactory for InMemoryReplayStore {
    fn for_job(&self, job: &JobSpec) -> Arc<dyn ReplayRepository> {
        Arc::new(JobReplayRepository {
            job_name: job.name.clone(),
            store: self.clone(),
        })
    }
}

pub struct JobReplayRepository {
    job_name: String,
    store: InMemoryReplayStore,
}

#[async_trait]
impl ReplayRepository for JobReplayRepository {
    async fn insert(&self, record: &ReplayRecord) -> Result<(), StoreError> {
        if record.job_name != self.job_name {
            return Err(StoreError::Backend(format!(
                "replay del job {} insertado en el repositorio de {}",
                record.job_name, self.job_name
            )));
        }

        let mut records = self.store.records();
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_by_status(&self, statuses: &[ReplayStatus]) -> Result<Vec<ReplayRecord>, StoreError> {
        let mut matching: Vec<ReplayRecord> = self
            .store
            .records()
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();

        if matching.is_empty() {
            return Err(StoreError::NotFound);
        }
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn get_by_id(&self, id: ReplayId) -> Result<ReplayRecord, StoreError> {
        self.store.get(id).ok_or(StoreError::NotFound)
    }

    async fn update_status(
        &self,
        id: ReplayId,
        status: ReplayStatus,
        message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut records = self.store.records();
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.status = status;
        record.message = message;
        record.updated_at = Utc::now();
        Ok(())
    }
}
