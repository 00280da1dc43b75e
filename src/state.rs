use std::sync::Arc;

use crate::{
    backend::{ollama::OllamaBackend, remote::RemoteApiBackend, InferenceBackend},
    catalog::{ModelCatalog, ModelConfigRegistry},
    config::GatewayConfig,
    metrics::AppMetrics,
    resolver::FallbackResolver,
    store::ResponseStore,
    validation::RequestValidator,
};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<FallbackResolver>,
    pub validator: Arc<RequestValidator>,
    pub catalog: Arc<ModelCatalog>,
    pub configs: Arc<ModelConfigRegistry>,
    pub store: Arc<ResponseStore>,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    /// Builds the HTTP adapters named by `config` and wires them into a resolver.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, String> {
        let mut backends: Vec<Arc<dyn InferenceBackend>> = Vec::new();
        if let Some(local) = &config.local_model {
            backends.push(Arc::new(OllamaBackend::new(
                &local.base_url,
                local.model.clone(),
                local.system_prompt.clone(),
            )?));
        }
        if let Some(url) = &config.remote_api_url {
            backends.push(Arc::new(RemoteApiBackend::new(url.clone())?));
        }
        Ok(Self::new(config, backends))
    }

    /// Wires pre-built adapters; canned text is always added by the resolver.
    pub fn new(config: &GatewayConfig, backends: Vec<Arc<dyn InferenceBackend>>) -> Self {
        let store = Arc::new(ResponseStore::with_capacity(config.history_capacity));
        let configs = Arc::new(ModelConfigRegistry::default());
        let metrics = Arc::new(AppMetrics::new());
        let resolver = FallbackResolver::new(
            backends,
            store.clone(),
            configs.clone(),
            metrics.clone(),
        )
        .with_policy(config.policy.clone())
        .with_attempt_timeout(config.attempt_timeout)
        .with_probe(config.probe_timeout, config.probe_cache_ttl);

        Self {
            resolver: Arc::new(resolver),
            validator: Arc::new(RequestValidator::new(
                config.default_model.clone(),
                config.default_mode,
            )),
            catalog: Arc::new(ModelCatalog::new(config.default_model.clone())),
            configs,
            store,
            metrics,
        }
    }
}
