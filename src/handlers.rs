use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Path, Query, Request, State},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    catalog::{ModelConfig, ModelConfigRequest, ModelInfo},
    errors::AppError,
    models::{AdapterKind, BatchInferenceRequest, BatchResult, InferenceRequest, InferenceResponse},
    resolver::BackendStatus,
    state::AppState,
    store::MetricsSnapshot,
    validation::{validate_history_limit, ValidationError},
};

const SERVICE_NAME: &str = "webllm";

/// Records request count and latency under the matched route template.
pub async fn track_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().as_str().to_owned();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let _inflight = state.metrics.inflight_guard();

    let response = next.run(request).await;

    state.metrics.observe_request(
        &path,
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

pub async fn infer(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, AppError> {
    let Json(request) = payload?;
    let validated = state.validator.validate(&request).inspect_err(|error| {
        debug!(code = error.code(), "inference request rejected");
    })?;
    Ok(Json(state.resolver.resolve(&validated).await))
}

pub async fn infer_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchInferenceRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, AppError> {
    let Json(request) = payload?;
    let validated = state.validator.validate_batch(&request).inspect_err(|error| {
        debug!(code = error.code(), index = error.batch_index(), "batch request rejected");
    })?;
    Ok(Json(state.resolver.resolve_batch(&validated).await))
}

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    recommended: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    models: Vec<ModelInfo>,
    default_model: String,
    count: usize,
}

pub async fn models(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> Json<ModelsResponse> {
    let recommended_only = query
        .recommended
        .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1");
    let models = state.catalog.models(recommended_only);
    Json(ModelsResponse {
        count: models.len(),
        default_model: state.catalog.default_model().to_owned(),
        models,
    })
}

#[derive(Debug, Deserialize)]
pub struct ModelInfoQuery {
    model: Option<String>,
}

pub async fn model_info(
    State(state): State<AppState>,
    Query(query): Query<ModelInfoQuery>,
) -> Result<Json<ModelInfo>, AppError> {
    let model_id = query
        .model
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::MissingParameter("model"))?;
    state
        .catalog
        .info(model_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("model {model_id} is not supported")))
}

#[derive(Debug, Serialize)]
pub struct ModelConfigResponse {
    status: &'static str,
    model_type: String,
    config: ModelConfig,
}

pub async fn set_model_config(
    State(state): State<AppState>,
    payload: Result<Json<ModelConfigRequest>, JsonRejection>,
) -> Result<Json<ModelConfigResponse>, AppError> {
    let Json(request) = payload?;
    let config = state.configs.configure(&request).await?;
    Ok(Json(ModelConfigResponse {
        status: "configured",
        model_type: config.model_id.clone(),
        config,
    }))
}

pub async fn get_model_config(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
) -> Result<Json<ModelConfig>, AppError> {
    state
        .configs
        .get(&model_type)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no configuration for model {model_type}")))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    timestamp: DateTime<Utc>,
    metrics: MetricsSnapshot,
    inference_history_count: usize,
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let (metrics, inference_history_count) = state.store.snapshot().await;
    Json(MetricsResponse {
        timestamp: Utc::now(),
        metrics,
        inference_history_count,
    })
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal(format!("metrics render failed: {error}")).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    count: usize,
    history: Vec<InferenceResponse>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = match query.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(
            value
                .parse::<i64>()
                .map_err(|_| ValidationError::InvalidLimit)?,
        ),
    };
    let limit = validate_history_limit(limit)?;
    let history = state.store.history(limit).await;
    Ok(Json(HistoryResponse {
        count: history.len(),
        history,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: &'static str,
    service: &'static str,
    timestamp: DateTime<Utc>,
    default_model: String,
    models_configured: usize,
    total_inferences: u64,
    average_inference_time_ms: f64,
    backends: Vec<BackendStatus>,
    active_service: AdapterKind,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.store.metrics().await;
    let backends = state.resolver.backend_status().await;
    let active_service = state.resolver.active_service(&backends);

    Json(StatusResponse {
        status: "operational",
        service: SERVICE_NAME,
        timestamp: Utc::now(),
        default_model: state.catalog.default_model().to_owned(),
        models_configured: state.configs.len().await,
        total_inferences: snapshot.total_inferences,
        average_inference_time_ms: snapshot.average_inference_time_ms,
        backends,
        active_service,
    })
}

pub async fn clear(State(state): State<AppState>) -> Json<Value> {
    let dropped = state.store.clear().await;
    info!(dropped, "inference history cleared");
    Json(json!({
        "status": "cleared",
        "timestamp": Utc::now(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now(),
    }))
}
