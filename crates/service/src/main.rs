use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};

use opnote_core::{
    DeidGate, OpnoteError, ReportRecord, ReportSource, ReportStore, SearchQuery, SurgeonInputs,
};
use opnote_index::{EmbeddingClient, VectorIndex};
use opnote_llm::LlmClient;
use opnote_rag::{
    find_similar, generate_report, persist, rate, AdmitOptions, GenerateOptions, IngestPipeline,
};

#[derive(Clone)]
struct AppState {
    pipeline: IngestPipeline,
    llm: LlmClient,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let db_path = std::env::var("OPNOTE_DB").unwrap_or_else(|_| "opnote.db".to_string());
    let index_dir = std::env::var("OPNOTE_INDEX_DIR").unwrap_or_else(|_| "opnote_index".to_string());
    let store = ReportStore::open(&db_path)?;
    let index = VectorIndex::open(&index_dir, EmbeddingClient::from_env()?)?;
    let gate = DeidGate::from_env()?;
    let llm = LlmClient::from_env()?;
    let state = Arc::new(AppState {
        pipeline: IngestPipeline::new(store, index, gate),
        llm,
    });
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/reports", post(handle_create_report).get(handle_list_reports))
        .route(
            "/reports/:id",
            get(handle_get_report).delete(handle_delete_report),
        )
        .route("/stats", get(handle_stats))
        .route("/search", post(handle_search))
        .route("/generate", post(handle_generate))
        .route("/generated/:id/rating", post(handle_rating))
        .route("/extract", post(handle_extract))
        .route("/rebuild", post(handle_rebuild))
        .with_state(state);
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateReportRequest {
    text: String,
    procedure_type: Option<String>,
    specialty: Option<String>,
    report_name: Option<String>,
    keywords: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateReportResponse {
    report: ReportRecord,
    found_phi: bool,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    specialty: Option<String>,
    procedure_type: Option<String>,
    keyword: Option<String>,
    source: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: i64,
    score: f32,
    procedure_type: String,
    specialty: String,
    source: String,
    report_text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    procedure_type: String,
    #[serde(flatten)]
    inputs: SurgeonInputs,
    n_context_reports: Option<usize>,
    max_context_chars: Option<usize>,
    #[serde(default = "default_save")]
    save: bool,
}

fn default_save() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    generated_report: String,
    generated_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    rating: i64,
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    reports: u64,
    by_source: std::collections::BTreeMap<String, u64>,
    index_entries: usize,
    embedding_provider: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

#[derive(Debug, Serialize)]
struct RebuildResponse {
    total: usize,
    indexed: usize,
    skipped: usize,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let state = state.clone();
    let reports = task::spawn_blocking(move || state.pipeline.store().count())
        .await
        .map_err(AppError::internal)??;
    Ok(Json(serde_json::json!({ "status": "ok", "reports": reports })))
}

async fn handle_create_report(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<CreateReportResponse>), AppError> {
    let state = state.clone();
    let admitted = task::spawn_blocking(move || {
        state.pipeline.admit_text(
            &body.text,
            &AdmitOptions {
                procedure_type: body.procedure_type,
                specialty: body.specialty,
                report_name: body.report_name,
                keywords: body.keywords,
            },
        )
    })
    .await
    .map_err(AppError::internal)??;
    Ok((
        StatusCode::CREATED,
        Json(CreateReportResponse {
            report: admitted.record,
            found_phi: admitted.found_phi,
        }),
    ))
}

async fn handle_list_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReportRecord>>, AppError> {
    let source = match params.source.as_deref() {
        Some(raw) => Some(
            ReportSource::from_str(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown source {raw}")))?,
        ),
        None => None,
    };
    let query = SearchQuery {
        specialty: params.specialty,
        procedure_type: params.procedure_type,
        keyword: params.keyword,
        source,
        limit: params.limit,
        offset: params.offset,
    };
    let state = state.clone();
    let records = task::spawn_blocking(move || state.pipeline.store().search(&query))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(records))
}

async fn handle_get_report(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<ReportRecord>, AppError> {
    let state = state.clone();
    let record = task::spawn_blocking(move || state.pipeline.store().get(id))
        .await
        .map_err(AppError::internal)??;
    record.map(Json).ok_or(AppError::NotFound(id))
}

async fn handle_delete_report(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let state = state.clone();
    let deleted = task::spawn_blocking(move || state.pipeline.delete(id))
        .await
        .map_err(AppError::internal)??;
    if !deleted {
        return Err(AppError::NotFound(id));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, AppError> {
    let state = state.clone();
    let response = task::spawn_blocking(move || -> Result<StatsResponse, OpnoteError> {
        let store = state.pipeline.store();
        let index = state.pipeline.index();
        let by_source = store
            .count_by_source()?
            .into_iter()
            .map(|(source, count)| (source.as_str().to_string(), count))
            .collect();
        let meta = index.meta();
        Ok(StatsResponse {
            reports: store.count()?,
            by_source,
            index_entries: index.len(),
            embedding_provider: meta.provider,
            embedding_model: meta.model,
            embedding_dimensions: meta.dimensions,
        })
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(response))
}

async fn handle_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let state = state.clone();
    let hits = task::spawn_blocking(move || {
        find_similar(
            state.pipeline.index(),
            state.pipeline.store(),
            &body.query,
            body.top_k.unwrap_or(5),
        )
    })
    .await
    .map_err(AppError::internal)??;
    let hits = hits
        .into_iter()
        .map(|scored| SearchHit {
            id: scored.record.id,
            score: scored.score,
            procedure_type: scored.record.procedure_type,
            specialty: scored.record.specialty,
            source: scored.record.source.as_str().to_string(),
            report_text: scored.record.report_text,
        })
        .collect();
    Ok(Json(hits))
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    if body.procedure_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "procedure_type is required".to_string(),
        ));
    }
    let state = state.clone();
    let response = task::spawn_blocking(move || -> Result<GenerateResponse, OpnoteError> {
        let mut inputs = body.inputs;
        inputs.procedure_type = body.procedure_type.clone();
        let opts = GenerateOptions {
            n_context_reports: body.n_context_reports.unwrap_or(3),
            max_context_chars: body.max_context_chars.unwrap_or(9000),
        };
        let draft = generate_report(
            &state.llm,
            state.pipeline.index(),
            state.pipeline.store(),
            &body.procedure_type,
            &inputs,
            &opts,
        )?;
        let generated_id = if body.save {
            Some(persist(
                state.pipeline.store(),
                &body.procedure_type,
                &inputs,
                &draft,
            )?)
        } else {
            None
        };
        Ok(GenerateResponse {
            generated_report: draft,
            generated_id,
        })
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(response))
}

async fn handle_rating(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(body): Json<RatingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let state = state.clone();
    task::spawn_blocking(move || rate(state.pipeline.store(), id, body.rating))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(serde_json::json!({ "rated": id })))
}

async fn handle_extract(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractRequest>,
) -> Result<Json<SurgeonInputs>, AppError> {
    let state = state.clone();
    let inputs = task::spawn_blocking(move || {
        opnote_rag::extract_inputs(state.pipeline.gate(), &state.llm, &body.text)
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(inputs))
}

async fn handle_rebuild(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RebuildResponse>, AppError> {
    let state = state.clone();
    let stats = task::spawn_blocking(move || state.pipeline.rebuild())
        .await
        .map_err(AppError::internal)??;
    Ok(Json(RebuildResponse {
        total: stats.total,
        indexed: stats.indexed,
        skipped: stats.skipped,
    }))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("report {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl From<OpnoteError> for AppError {
    fn from(err: OpnoteError) -> Self {
        match err {
            OpnoteError::Validation(msg) => AppError::BadRequest(msg),
            OpnoteError::NotFound(id) => AppError::NotFound(id),
            OpnoteError::PhiGate(msg) => AppError::Unprocessable(msg),
            OpnoteError::Generation(msg) => AppError::Upstream(msg),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("report {id} not found"),
            )
                .into_response(),
            AppError::Unprocessable(msg) => {
                warn!("phi_gate" = %msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response()
            }
            AppError::Upstream(msg) => {
                warn!("generation_failed" = %msg);
                (StatusCode::BAD_GATEWAY, msg).into_response()
            }
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
