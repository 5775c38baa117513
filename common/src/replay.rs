use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::job::{JobSpec, JobSpecMap, ProjectSpec};

pub type ReplayId = Uuid;

/// Pedido de replay: se construye en cada llamada y lo maneja el manager
/// hasta que se lo pasa a un worker.
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    /// Sin asignar hasta que el pedido es admitido.
    pub id: Option<ReplayId>,
    pub job: JobSpec,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub project: ProjectSpec,
    pub job_spec_map: Arc<JobSpecMap>,
}

impl ReplayRequest {
    pub fn new(
        job: JobSpec,
        start_date: NaiveDate,
        end_date: NaiveDate,
        project: ProjectSpec,
        job_spec_map: Arc<JobSpecMap>,
    ) -> Self {
        Self {
            id: None,
            job,
            start_date,
            end_date,
            project,
            job_spec_map,
        }
    }
}

/// Ventana de ejecuciones afectadas: `[start 00:00, end+1 00:00)` en UTC.
/// `None` si el día siguiente a `end` no es representable.
pub fn date_window(start: NaiveDate, end: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start.and_time(NaiveTime::MIN).and_utc();
    let to = end.succ_opt()?.and_time(NaiveTime::MIN).and_utc();
    Some((from, to))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayStatus {
    Accepted,
    InProgress,
    Success,
    Failed,
}

impl ReplayStatus {
    /// Estados que cuentan como replay activo para la validación de conflictos.
    pub const ACTIVE: [ReplayStatus; 2] = [ReplayStatus::InProgress, ReplayStatus::Accepted];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayStatus::Success | ReplayStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayStatus::Accepted => "ACCEPTED",
            ReplayStatus::InProgress => "IN_PROGRESS",
            ReplayStatus::Success => "SUCCESS",
            ReplayStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPTED" => Ok(ReplayStatus::Accepted),
            "IN_PROGRESS" => Ok(ReplayStatus::InProgress),
            "SUCCESS" => Ok(ReplayStatus::Success),
            "FAILED" => Ok(ReplayStatus::Failed),
            other => Err(format!("estado de replay desconocido: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub id: ReplayId,
    pub job_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ReplayStatus,

    /// Último detalle reportado por el worker (error, resumen, etc.)
    pub message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplayRecord {
    /// Registro recién admitido, siempre en estado `Accepted`.
    pub fn accepted(id: ReplayId, request: &ReplayRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_name: request.job.name.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            status: ReplayStatus::Accepted,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
