use chrono::{DateTime, Utc};
use common::{prepare_tree, prepare_tree_for, DependencyTree, ReplayRecord, ReplayRequest, ReplayStatus};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use super::error::ReplayError;
use crate::store::{ReplayRepository, StoreError};

/// Qué tan a fondo se buscan conflictos contra los replays activos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Revisa todos los replays activos y todos los pares de nodos.
    #[default]
    Exhaustive,
    /// Sólo el primer replay activo y el primer par de nodos con el mismo
    /// nombre. Puede dejar pasar conflictos.
    FirstMatch,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exhaustive" => Ok(ConflictPolicy::Exhaustive),
            "first_match" | "first-match" => Ok(ConflictPolicy::FirstMatch),
            other => Err(format!("política de conflictos desconocida: {other}")),
        }
    }
}

/// Falla si el pedido re-ejecuta alguna corrida que ya está tomada por un
/// replay activo (Accepted o InProgress).
pub async fn validate(
    repo: &dyn ReplayRepository,
    request: &ReplayRequest,
    policy: ConflictPolicy,
) -> Result<(), ReplayError> {
    let requested = prepare_tree(request)?;

    // el filtro del store no se da por garantizado
    let active: Vec<ReplayRecord> = match repo.get_by_status(&ReplayStatus::ACTIVE).await {
        Ok(records) => records.into_iter().filter(ReplayRecord::is_active).collect(),
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    debug!(
        "validando replay de {} contra {} replays activos ({:?})",
        request.job.name,
        active.len(),
        policy
    );

    check_active_replays(&active, request, &requested, policy)
}

fn check_active_replays(
    active: &[ReplayRecord],
    request: &ReplayRequest,
    requested: &DependencyTree,
    policy: ConflictPolicy,
) -> Result<(), ReplayError> {
    for record in active {
        // el árbol del replay activo se arma con los specs actuales del pedido
        let active_tree = prepare_tree_for(
            &record.job_name,
            record.start_date,
            record.end_date,
            &request.job_spec_map,
        )?;

        if let Some((job, run)) = conflicting_run(&active_tree, requested, policy) {
            return Err(ReplayError::Conflict {
                active_id: record.id,
                job,
                run,
            });
        }

        if policy == ConflictPolicy::FirstMatch {
            break;
        }
    }
    Ok(())
}

fn conflicting_run(
    active: &DependencyTree,
    requested: &DependencyTree,
    policy: ConflictPolicy,
) -> Option<(String, DateTime<Utc>)> {
    for active_node in active.all_nodes() {
        for requested_node in requested.all_nodes() {
            if active_node.name != requested_node.name {
                continue;
            }

            let shared = active_node.first_shared_run(requested_node);
            if shared.is_some() || policy == ConflictPolicy::FirstMatch {
                return shared.map(|run| (active_node.name.clone(), run));
            }
        }
    }
    None
}
