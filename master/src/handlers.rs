use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{
    prepare_tree, ApiError, ReplayAccepted, ReplayCreateRequest, ReplayPlan, ReplayRecord,
    ReplayRequest, ReplayStatus, TreeError, WorkerPoolMetrics,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::replay::ReplayError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/replays", post(create_replay).get(list_replays))
        .route("/api/v1/replays/plan", post(plan_replay))
        .route("/api/v1/replays/workers", get(worker_metrics))
        .route("/api/v1/replays/:id", get(get_replay))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error HTTP con cuerpo JSON.
pub struct HttpError(StatusCode, ApiError);

impl HttpError {
    fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self(
            status,
            ApiError {
                kind: kind.to_string(),
                message: message.into(),
            },
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<ReplayError> for HttpError {
    fn from(err: ReplayError) -> Self {
        let status = match &err {
            ReplayError::InvalidRequest(TreeError::UnknownJob(_)) => StatusCode::NOT_FOUND,
            ReplayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ReplayError::Conflict { .. } => StatusCode::CONFLICT,
            ReplayError::QueueFull | ReplayError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            ReplayError::Store(_) | ReplayError::AlreadyStarted | ReplayError::IdGeneration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        HttpError::new(status, err.kind(), err.to_string())
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

/// Arma el pedido de replay a partir del body, resolviendo el job por nombre.
fn build_request(state: &AppState, body: ReplayCreateRequest) -> Result<ReplayRequest, HttpError> {
    let job = state.jobs.get(&body.job_name).cloned().ok_or_else(|| {
        HttpError::from(ReplayError::InvalidRequest(TreeError::UnknownJob(
            body.job_name.clone(),
        )))
    })?;

    Ok(ReplayRequest::new(
        job,
        body.start_date,
        body.end_date,
        state.project.as_ref().clone(),
        state.jobs.clone(),
    ))
}

// Valida, registra y encola un replay
async fn create_replay(
    State(state): State<AppState>,
    Json(body): Json<ReplayCreateRequest>,
) -> Result<(StatusCode, Json<ReplayAccepted>), HttpError> {
    info!(
        "pedido de replay para {} ({} → {})",
        body.job_name, body.start_date, body.end_date
    );
    let request = build_request(&state, body)?;
    let id = state.manager.replay(request).await?;

    Ok((StatusCode::ACCEPTED, Json(ReplayAccepted { id })))
}

// Dry-run: devuelve el árbol que se re-ejecutaría sin registrar nada
async fn plan_replay(
    State(state): State<AppState>,
    Json(body): Json<ReplayCreateRequest>,
) -> Result<Json<ReplayPlan>, HttpError> {
    let job_name = body.job_name.clone();
    let (start_date, end_date) = (body.start_date, body.end_date);
    let request = build_request(&state, body)?;

    let tree = prepare_tree(&request).map_err(|e| HttpError::from(ReplayError::from(e)))?;

    Ok(Json(ReplayPlan {
        job_name,
        start_date,
        end_date,
        total_runs: tree.total_runs(),
        tree,
    }))
}

async fn get_replay(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplayRecord>, HttpError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| HttpError::new(StatusCode::BAD_REQUEST, "invalid_id", format!("id inválido: {id}")))?;

    state
        .store
        .get(id)
        .map(Json)
        .ok_or_else(|| HttpError::new(StatusCode::NOT_FOUND, "not_found", format!("replay {id} no encontrado")))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_replays(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReplayRecord>>, HttpError> {
    let status = query
        .status
        .map(|s| s.parse::<ReplayStatus>())
        .transpose()
        .map_err(|e| HttpError::new(StatusCode::BAD_REQUEST, "invalid_status", e))?;

    Ok(Json(state.store.list(status)))
}

async fn worker_metrics(State(state): State<AppState>) -> Json<WorkerPoolMetrics> {
    Json(state.manager.metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::testing::{job, project, wait_idle_workers, GatedWorker};
    use crate::replay::{ReplayManager, ReplayManagerConfig, UuidProvider};
    use crate::store::InMemoryReplayStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use common::index_jobs;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(worker: Arc<GatedWorker>) -> (Router, AppState) {
        let store = InMemoryReplayStore::new();
        let manager = Arc::new(ReplayManager::new(
            worker,
            Arc::new(store.clone()),
            Arc::new(UuidProvider),
            ReplayManagerConfig {
                num_workers: 1,
                ..ReplayManagerConfig::default()
            },
        ));
        let jobs = index_jobs(vec![job("x", &[]), job("y", &["x"])]);
        let state = AppState::new(manager, store, project(), jobs);
        (build_router(state.clone()), state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> T {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let (router, _) = app(Arc::new(GatedWorker::new(0)));
        let resp = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_replay_devuelve_202_y_el_registro_se_puede_consultar() {
        let worker = Arc::new(GatedWorker::new(1));
        let (router, state) = app(worker.clone());
        state.manager.init().unwrap();
        wait_idle_workers(&state.manager, 1).await;

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/replays",
                json!({"job_name": "x", "start_date": "2021-01-01", "end_date": "2021-01-02"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let accepted: ReplayAccepted = read_json(resp).await;

        let resp = router
            .clone()
            .oneshot(get(&format!("/api/v1/replays/{}", accepted.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record: ReplayRecord = read_json(resp).await;
        assert_eq!(record.job_name, "x");

        state.manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn queue_full_es_503_y_conflicto_es_409() {
        // pool sin iniciar: nadie espera en la cola
        let (router, state) = app(Arc::new(GatedWorker::new(0)));

        let body = json!({"job_name": "x", "start_date": "2021-01-01", "end_date": "2021-01-02"});
        let resp = router
            .clone()
            .oneshot(post_json("/api/v1/replays", body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let err: ApiError = read_json(resp).await;
        assert_eq!(err.kind, "queue_full");

        // el registro quedó Accepted, así que el mismo rango ahora choca
        let resp = router
            .oneshot(post_json("/api/v1/replays", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test]
    async fn job_desconocido_es_404_y_rango_invertido_400() {
        let (router, _) = app(Arc::new(GatedWorker::new(0)));

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/replays",
                json!({"job_name": "nope", "start_date": "2021-01-01", "end_date": "2021-01-02"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = router
            .oneshot(post_json(
                "/api/v1/replays",
                json!({"job_name": "x", "start_date": "2021-01-05", "end_date": "2021-01-02"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = read_json(resp).await;
        assert_eq!(err.kind, "invalid_request");
    }

    #[tokio::test]
    async fn fecha_final_maxima_es_400_en_replay_y_plan() {
        let (router, state) = app(Arc::new(GatedWorker::new(0)));
        let body = json!({"job_name": "x", "start_date": "+262142-12-01", "end_date": "+262142-12-31"});

        for uri in ["/api/v1/replays", "/api/v1/replays/plan"] {
            let resp = router
                .clone()
                .oneshot(post_json(uri, body.clone()))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let err: ApiError = read_json(resp).await;
            assert_eq!(err.kind, "invalid_request");
        }
        assert_eq!(state.store.len(), 0);
    }

    #[tokio::test]
    async fn plan_devuelve_el_arbol_sin_registrar() {
        let (router, state) = app(Arc::new(GatedWorker::new(0)));

        let resp = router
            .oneshot(post_json(
                "/api/v1/replays/plan",
                json!({"job_name": "x", "start_date": "2021-01-01", "end_date": "2021-01-03"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let plan: ReplayPlan = read_json(resp).await;
        assert_eq!(plan.total_runs, 6);
        assert!(plan.tree.node("y").is_some());
        assert_eq!(state.store.len(), 0);
    }

    #[tokio::test]
    async fn get_replay_con_id_invalido_o_inexistente() {
        let (router, _) = app(Arc::new(GatedWorker::new(0)));

        let resp = router
            .clone()
            .oneshot(get("/api/v1/replays/no-es-uuid"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .oneshot(get(&format!("/api/v1/replays/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filtra_por_estado_y_valida_el_filtro() {
        let (router, _) = app(Arc::new(GatedWorker::new(0)));
        let _ = router
            .clone()
            .oneshot(post_json(
                "/api/v1/replays",
                json!({"job_name": "x", "start_date": "2021-01-01", "end_date": "2021-01-01"}),
            ))
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(get("/api/v1/replays?status=accepted"))
            .await
            .unwrap();
        let records: Vec<ReplayRecord> = read_json(resp).await;
        assert_eq!(records.len(), 1);

        let resp = router
            .clone()
            .oneshot(get("/api/v1/replays?status=SUCCESS"))
            .await
            .unwrap();
        let records: Vec<ReplayRecord> = read_json(resp).await;
        assert!(records.is_empty());

        let resp = router
            .oneshot(get("/api/v1/replays?status=perdido"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn workers_expone_metricas_del_pool() {
        let (router, state) = app(Arc::new(GatedWorker::new(0)));
        state.manager.init().unwrap();
        wait_idle_workers(&state.manager, 1).await;

        let resp = router
            .oneshot(get("/api/v1/replays/workers"))
            .await
            .unwrap();
        let metrics: WorkerPoolMetrics = read_json(resp).await;
        assert_eq!(metrics.num_workers, 1);
        assert_eq!(metrics.idle_workers, 1);
        assert_eq!(metrics.queue_capacity, 0);

        state.manager.close().await.unwrap();
    }
}
