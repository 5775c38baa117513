use common::{ReplayId, ReplayRequest, WorkerPoolMetrics};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ReplayError;
use super::queue::AdmissionQueue;
use super::worker::ReplayWorker;

/// Cómo terminó el procesamiento de un replay en el pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ReplayEvent {
    pub request_id: ReplayId,
    pub job_name: String,
    pub worker: usize,
    pub outcome: ReplayOutcome,
    pub elapsed: Duration,
}

#[derive(Default)]
struct PoolCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    total_process_ms: AtomicU64,
}

impl PoolCounters {
    fn record(&self, outcome: &ReplayOutcome, elapsed: Duration) {
        let counter = match outcome {
            ReplayOutcome::Succeeded => &self.succeeded,
            ReplayOutcome::Failed(_) => &self.failed,
            ReplayOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_process_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Lo que cada worker necesita para correr; barato de clonar.
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<AdmissionQueue<ReplayRequest>>,
    worker: Arc<dyn ReplayWorker>,
    timeout: Duration,
    events: broadcast::Sender<ReplayEvent>,
    counters: Arc<PoolCounters>,
}

enum Lifecycle {
    NotStarted,
    Running(Vec<JoinHandle<()>>),
    // alguien ya se llevó los handles y los está esperando
    Stopping,
}

/// Pool fijo de workers que drenan la cola de admisión.
pub struct WorkerPool {
    size: usize,
    ctx: WorkerContext,
    lifecycle: Mutex<Lifecycle>,
    // pasa a `true` cuando todos los workers terminaron
    stopped: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(
        size: usize,
        timeout: Duration,
        queue: Arc<AdmissionQueue<ReplayRequest>>,
        worker: Arc<dyn ReplayWorker>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (stopped, _) = watch::channel(false);
        Self {
            size,
            ctx: WorkerContext {
                queue,
                worker,
                timeout,
                events,
                counters: Arc::new(PoolCounters::default()),
            },
            lifecycle: Mutex::new(Lifecycle::NotStarted),
            stopped,
        }
    }

    /// Lanza exactamente `size` workers. Se puede llamar una sola vez.
    pub fn start(&self) -> Result<(), ReplayError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*lifecycle, Lifecycle::NotStarted) {
            return Err(ReplayError::AlreadyStarted);
        }

        info!("iniciando {} workers de replay", self.size);
        let spawned = (0..self.size)
            .map(|idx| tokio::spawn(run_worker(idx, self.ctx.clone())))
            .collect();
        *lifecycle = Lifecycle::Running(spawned);
        Ok(())
    }

    /// Cierra la cola y espera a que todos los workers terminen lo que
    /// tienen entre manos y salgan. Cada llamada, concurrente o no, vuelve
    /// recién cuando el pool está detenido.
    pub async fn shutdown(&self) {
        self.ctx.queue.close();

        let handles = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(handles) => Some(handles),
                Lifecycle::NotStarted => {
                    *lifecycle = Lifecycle::NotStarted;
                    return;
                }
                Lifecycle::Stopping => None,
            }
        };

        let Some(handles) = handles else {
            let mut stopped = self.stopped.subscribe();
            // el sender vive en el pool, no se puede cerrar mientras esperamos
            let _ = stopped.wait_for(|done| *done).await;
            return;
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("worker de replay terminó con error: {:?}", e);
            }
        }
        self.stopped.send_replace(true);
        debug!("todos los workers de replay se detuvieron");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.ctx.events.subscribe()
    }

    pub fn metrics(&self) -> WorkerPoolMetrics {
        let c = &self.ctx.counters;
        let succeeded = c.succeeded.load(Ordering::Relaxed);
        let failed = c.failed.load(Ordering::Relaxed);
        let timed_out = c.timed_out.load(Ordering::Relaxed);
        let finished = succeeded + failed + timed_out;

        let avg_process_ms = if finished > 0 {
            Some(c.total_process_ms.load(Ordering::Relaxed) as f64 / finished as f64)
        } else {
            None
        };

        WorkerPoolMetrics {
            num_workers: self.size,
            idle_workers: self.ctx.queue.idle_receivers(),
            queue_capacity: self.ctx.queue.capacity(),
            queued: self.ctx.queue.len(),
            replays_started: c.started.load(Ordering::Relaxed),
            replays_succeeded: succeeded,
            replays_failed: failed,
            replays_timed_out: timed_out,
            avg_process_ms,
        }
    }
}

async fn run_worker(idx: usize, ctx: WorkerContext) {
    debug!("worker de replay {} esperando pedidos", idx);

    while let Some(request) = ctx.queue.recv().await {
        let request_id = request.id.unwrap_or_default();
        info!(
            "worker {} tomó el replay {} del job {}",
            idx, request_id, request.job.name
        );
        ctx.counters.started.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let outcome = match tokio::time::timeout(ctx.timeout, ctx.worker.process(&request)).await {
            Ok(Ok(())) => ReplayOutcome::Succeeded,
            Ok(Err(e)) => {
                warn!(
                    "worker {} falló procesando el replay {}: {:#}",
                    idx, request_id, e
                );
                ReplayOutcome::Failed(format!("{e:#}"))
            }
            Err(_) => {
                warn!(
                    "worker {}: el replay {} superó el timeout de {:?}",
                    idx, request_id, ctx.timeout
                );
                ReplayOutcome::TimedOut
            }
        };
        let elapsed = started.elapsed();

        ctx.counters.record(&outcome, elapsed);
        // sin suscriptores el envío falla, no importa
        let _ = ctx.events.send(ReplayEvent {
            request_id,
            job_name: request.job.name.clone(),
            worker: idx,
            outcome,
            elapsed,
        });
    }

    debug!("worker de replay {} detenido", idx);
}
