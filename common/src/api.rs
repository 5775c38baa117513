use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dag::DependencyTree;

/* --------- Cuerpos HTTP entre client y master --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayCreateRequest {
    pub job_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayAccepted {
    pub id: String,
}

/// Resultado de un dry-run: qué se re-ejecutaría, sin registrar nada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub job_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_runs: usize,
    pub tree: DependencyTree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Tipo de error estable (ej: "conflict", "queue_full")
    pub kind: String,
    pub message: String,
}
