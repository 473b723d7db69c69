use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

use coursegen_core::GenerationError;
use coursegen_core::access::{CallerIdentity, TokenConfig, resolve_caller};
use coursegen_core::curriculum::CurriculumPlan;
use coursegen_core::llm::OpenAiClient;
use coursegen_core::service::CoursePlanGenerator;
use coursegen_core::store::{DocumentStore, PgDocumentStore};
use coursegen_db::models::CoursePlan;

use crate::config::CoursegenConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl AppError {
    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: format!("{err:#}"),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GenerationError::Forbidden(_) => StatusCode::FORBIDDEN,
            GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GenerationError::NotFound(_) => StatusCode::NOT_FOUND,
            GenerationError::AlreadyInProgress { .. } | GenerationError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            GenerationError::MalformedOutput(_) | GenerationError::SchemaViolation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GenerationError::UpstreamUnavailable { .. }
            | GenerationError::LlmEmptyResponse { .. } => StatusCode::BAD_GATEWAY,
            GenerationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GenerationError::StoreUnavailable(_) | GenerationError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message, "kind": self.kind });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and response types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub generator: CoursePlanGenerator,
    pub store: Arc<dyn DocumentStore>,
    pub token_config: Arc<TokenConfig>,
}

#[derive(Debug, Serialize)]
pub struct PlanDetailResponse {
    #[serde(flatten)]
    pub plan: CoursePlan,
    /// Parsed `generated_json`, when present.
    pub curriculum: Option<CurriculumPlan>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate-course-plan", post(generate_course_plan))
        .route("/api/course-plans/{id}", get(get_course_plan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(config: &CoursegenConfig, pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
    let client = OpenAiClient::from_config(&config.llm).context("cannot build LLM client")?;
    let generator = CoursePlanGenerator::new(
        store.clone(),
        Arc::new(client),
        config.pipeline.kind.stages(),
        config.pipeline.generator_settings(),
    );
    let app = build_router(AppState {
        generator,
        store,
        token_config: Arc::new(config.token_config.clone()),
    });

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!(pipeline = %config.pipeline.kind, "coursegen serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("coursegen serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn caller_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<CallerIdentity>, AppError> {
    let authorization = match headers.get(header::AUTHORIZATION) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::from(GenerationError::Unauthenticated(
                "authorization header is not valid text".to_string(),
            ))
        })?),
    };
    Ok(resolve_caller(&state.token_config, authorization)?)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_course_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<axum::response::Response, AppError> {
    let caller = caller_from_headers(&state, &headers)?;

    // Runs on its own task: a client that hangs up must not cancel a run
    // that is already spending tokens.
    let generator = state.generator.clone();
    let run = tokio::spawn(async move { generator.generate(caller.as_ref(), &body).await });
    run.await
        .map_err(|e| AppError::internal(anyhow::Error::new(e).context("generation task failed")))??;

    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

/// Only the course creator may read a plan.
async fn get_course_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let caller = caller_from_headers(&state, &headers)?.ok_or_else(|| {
        GenerationError::Unauthenticated("no caller identity".to_string())
    })?;

    let plan = state
        .store
        .get_plan(&id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| GenerationError::NotFound(format!("course plan {id} not found")))?;
    let course = state
        .store
        .get_course(&plan.course_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| GenerationError::NotFound(format!("course {} not found", plan.course_id)))?;
    if course.creator_id != caller.uid {
        return Err(GenerationError::Forbidden("you are not the course creator".to_string()).into());
    }

    let curriculum = plan
        .generated_json
        .as_deref()
        .map(serde_json::from_str::<CurriculumPlan>)
        .transpose()
        .map_err(|e| AppError::internal(anyhow::Error::new(e).context("stored plan is invalid")))?;

    Ok(Json(PlanDetailResponse { plan, curriculum }).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
