pub mod backend;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod state;
pub mod store;
pub mod tokens;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use config::GatewayConfig;
use tracing::info;

pub fn build_state(config: &GatewayConfig) -> Result<state::AppState, std::io::Error> {
    let state = state::AppState::from_config(config).map_err(std::io::Error::other)?;

    let chains = models::InferenceMode::ALL
        .iter()
        .map(|mode| {
            let chain = config
                .policy
                .chain(*mode)
                .iter()
                .map(|kind| kind.as_str())
                .collect::<Vec<_>>()
                .join(">");
            format!("{}={chain}", mode.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ");
    info!(
        local_model = config.local_model.as_ref().map(|local| local.base_url.as_str()),
        remote_api = config.remote_api_url.as_deref(),
        timeout_secs = config.attempt_timeout.as_secs(),
        chains = %chains,
        "fallback resolver configured"
    );
    Ok(state)
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/infer", post(handlers::infer))
        .route("/infer/batch", post(handlers::infer_batch))
        .route("/models", get(handlers::models))
        .route("/models/info", get(handlers::model_info))
        .route("/config/models", post(handlers::set_model_config))
        .route("/config/models/:model_type", get(handlers::get_model_config))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/history", get(handlers::history))
        .route("/status", get(handlers::status))
        .route("/clear", post(handlers::clear))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::track_http,
        ))
        .with_state(state)
}
