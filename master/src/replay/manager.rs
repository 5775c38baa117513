use common::{ReplayId, ReplayRecord, ReplayRequest, WorkerPoolMetrics};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ReplayError;
use super::pool::{ReplayEvent, WorkerPool};
use super::queue::{AdmissionQueue, TrySendError};
use super::validator::{validate, ConflictPolicy};
use super::worker::ReplayWorker;
use crate::store::ReplayRepositoryFactory;

#[derive(Debug, Clone)]
pub struct ReplayManagerConfig {
    pub num_workers: usize,
    pub worker_timeout: Duration,
    /// 0 = sólo se admite si hay un worker libre en ese momento.
    pub queue_capacity: usize,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ReplayManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            worker_timeout: Duration::from_secs(300),
            queue_capacity: 0,
            conflict_policy: ConflictPolicy::Exhaustive,
        }
    }
}

pub trait IdProvider: Send + Sync {
    fn new_id(&self) -> Result<ReplayId, ReplayError>;
}

pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn new_id(&self) -> Result<ReplayId, ReplayError> {
        Ok(Uuid::new_v4())
    }
}

/// Manager de replays: interfaz asíncrona con una cola de tamaño fijo.
/// Cada pedido lo procesa un worker del pool; la cantidad de workers
/// en paralelo viene de la configuración.
pub struct ReplayManager {
    config: ReplayManagerConfig,
    id_provider: Arc<dyn IdProvider>,
    repos: Arc<dyn ReplayRepositoryFactory>,

    queue: Arc<AdmissionQueue<ReplayRequest>>,
    pool: WorkerPool,
    // replay() la toma en lectura durante toda la admisión; close() en
    // escritura para cerrar la cola sin dejar un pedido a medio admitir
    admission: RwLock<()>,

    // pedidos que ya se entregaron a un worker; sólo para chequear existencia,
    // el estado real vive en el store
    tracked: Mutex<HashMap<ReplayId, bool>>,
}

impl ReplayManager {
    pub fn new(
        worker: Arc<dyn ReplayWorker>,
        repos: Arc<dyn ReplayRepositoryFactory>,
        id_provider: Arc<dyn IdProvider>,
        config: ReplayManagerConfig,
    ) -> Self {
        let queue = Arc::new(AdmissionQueue::new(config.queue_capacity));
        let pool = WorkerPool::new(
            config.num_workers,
            config.worker_timeout,
            queue.clone(),
            worker,
        );

        Self {
            config,
            id_provider,
            repos,
            queue,
            pool,
            admission: RwLock::new(()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Arranca los workers. Una segunda llamada devuelve `AlreadyStarted`.
    pub fn init(&self) -> Result<(), ReplayError> {
        self.pool.start()
    }

    /// Valida, registra y encola un replay. Devuelve el id con el que se
    /// puede consultar su estado.
    ///
    /// Un `close()` concurrente espera a que termine la admisión en curso,
    /// así que `Closed` siempre sale antes de persistir nada.
    pub async fn replay(&self, mut request: ReplayRequest) -> Result<String, ReplayError> {
        let _admission = self.admission.read().await;
        if self.queue.is_closed() {
            return Err(ReplayError::Closed);
        }

        let repo = self.repos.for_job(&request.job);

        validate(repo.as_ref(), &request, self.config.conflict_policy).await?;

        let id = self.id_provider.new_id()?;
        request.id = Some(id);

        // registrar el pedido como aceptado antes de encolarlo
        let record = ReplayRecord::accepted(id, &request);
        repo.insert(&record).await?;

        // si no hay un worker disponible ya mismo, avisamos que no hay
        // capacidad; el registro queda en Accepted
        match self.queue.try_send(request) {
            Ok(()) => {
                self.tracked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, true);
                info!(
                    "replay {} de {} ({} → {}) entregado a un worker",
                    id, record.job_name, record.start_date, record.end_date
                );
                Ok(id.to_string())
            }
            Err(TrySendError::Full(_)) => {
                warn!("replay {} registrado pero la cola está llena", id);
                Err(ReplayError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                warn!("replay {} registrado pero el manager se cerró", id);
                Err(ReplayError::Closed)
            }
        }
    }

    /// Deja de aceptar pedidos y espera a que los workers terminen.
    pub async fn close(&self) -> Result<(), ReplayError> {
        debug!("cerrando el manager de replay");
        {
            let _admission = self.admission.write().await;
            self.queue.close();
        }
        self.pool.shutdown().await;
        Ok(())
    }

    pub fn is_tracked(&self, id: &ReplayId) -> bool {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.pool.subscribe()
    }

    pub fn metrics(&self) -> WorkerPoolMetrics {
        self.pool.metrics()
    }
}
