use chrono::{DateTime, Utc};
use common::{ReplayId, TreeError};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("pedido de replay inválido: {0}")]
    InvalidRequest(#[from] TreeError),

    #[error("conflicto con el replay activo {active_id}: el job {job} ya re-ejecuta {run}")]
    Conflict {
        active_id: ReplayId,
        job: String,
        run: DateTime<Utc>,
    },

    #[error("no se pudo persistir el replay: {0}")]
    Store(#[from] StoreError),

    #[error("la cola de pedidos está llena")]
    QueueFull,

    #[error("el manager de replay está cerrado")]
    Closed,

    #[error("los workers de replay ya fueron iniciados")]
    AlreadyStarted,

    #[error("no se pudo generar el id del pedido: {0}")]
    IdGeneration(String),
}

impl ReplayError {
    /// Nombre estable del tipo de error, usado en las respuestas HTTP.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplayError::InvalidRequest(TreeError::UnknownJob(_)) => "unknown_job",
            ReplayError::InvalidRequest(_) => "invalid_request",
            ReplayError::Conflict { .. } => "conflict",
            ReplayError::Store(_) => "store",
            ReplayError::QueueFull => "queue_full",
            ReplayError::Closed => "closed",
            ReplayError::AlreadyStarted => "already_started",
            ReplayError::IdGeneration(_) => "id_generation",
        }
    }
}
