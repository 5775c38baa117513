use serde::{Deserialize, Serialize};

/// Foto de las métricas del pool de workers de replay.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WorkerPoolMetrics {
    pub num_workers: usize,
    pub idle_workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,

    pub replays_started: u64,
    pub replays_succeeded: u64,
    pub replays_failed: u64,
    pub replays_timed_out: u64,

    pub avg_process_ms: Option<f64>,
}
