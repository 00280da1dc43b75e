use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    models::{SamplingConfig, SamplingOverrides},
    validation::{validate_sampling, ValidationError},
};

pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_id: &'static str,
    pub size_gb: f64,
    pub vram_required_gb: u32,
    pub recommended: bool,
}

const SUPPORTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        model_id: "meta-llama/Llama-2-7b-chat-hf",
        size_gb: 13.5,
        vram_required_gb: 6,
        recommended: true,
    },
    ModelInfo {
        model_id: "meta-llama/Llama-2-13b-chat-hf",
        size_gb: 26.0,
        vram_required_gb: 10,
        recommended: false,
    },
    ModelInfo {
        model_id: "meta-llama/Llama-3-8b-chat-hf",
        size_gb: 15.0,
        vram_required_gb: 8,
        recommended: true,
    },
    ModelInfo {
        model_id: "mistralai/Mistral-7B-Instruct-v0.2",
        size_gb: 14.0,
        vram_required_gb: 6,
        recommended: true,
    },
    ModelInfo {
        model_id: "microsoft/phi-2",
        size_gb: 5.5,
        vram_required_gb: 4,
        recommended: true,
    },
    ModelInfo {
        model_id: "stabilityai/stablelm-zephyr-3b",
        size_gb: 6.0,
        vram_required_gb: 3,
        recommended: true,
    },
];

/// Static list of browser-runnable models.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    default_model: String,
}

impl ModelCatalog {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn models(&self, recommended_only: bool) -> Vec<ModelInfo> {
        SUPPORTED_MODELS
            .iter()
            .filter(|model| !recommended_only || model.recommended)
            .copied()
            .collect()
    }

    pub fn info(&self, model_id: &str) -> Option<ModelInfo> {
        SUPPORTED_MODELS
            .iter()
            .find(|model| model.model_id == model_id)
            .copied()
    }
}

/// `POST /config/models` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfigRequest {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(flatten)]
    pub sampling: SamplingConfig,
}

/// Sampling defaults registered per model id.
#[derive(Debug, Default)]
pub struct ModelConfigRegistry {
    defaults: SamplingConfig,
    configs: RwLock<HashMap<String, ModelConfig>>,
}

impl ModelConfigRegistry {
    pub async fn configure(
        &self,
        request: &ModelConfigRequest,
    ) -> Result<ModelConfig, ValidationError> {
        let model_id = request
            .model_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ValidationError::MissingParameter("model_type"))?;
        let overrides = validate_sampling(
            request.temperature,
            request.max_tokens,
            request.top_p,
            request.top_k,
        )?;

        let config = ModelConfig {
            model_id: model_id.to_owned(),
            sampling: self.defaults.with_overrides(&overrides),
        };
        self.configs
            .write()
            .await
            .insert(config.model_id.clone(), config.clone());
        info!(model = %config.model_id, "model config updated");
        Ok(config)
    }

    pub async fn get(&self, model_id: &str) -> Option<ModelConfig> {
        self.configs.read().await.get(model_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Caller overrides first, then the model's registered config, then global defaults.
    pub async fn sampling_for(&self, model_id: &str, overrides: &SamplingOverrides) -> SamplingConfig {
        let base = self
            .configs
            .read()
            .await
            .get(model_id)
            .map(|config| config.sampling)
            .unwrap_or(self.defaults);
        base.with_overrides(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommended_filter_drops_heavy_models() {
        let catalog = ModelCatalog::new(DEFAULT_MODEL);
        let all = catalog.models(false);
        let recommended = catalog.models(true);
        assert_eq!(all.len(), 6);
        assert_eq!(recommended.len(), 5);
        assert!(recommended.iter().all(|model| model.recommended));
        assert!(catalog.info(DEFAULT_MODEL).is_some());
        assert!(catalog.info("unknown/model").is_none());
    }

    #[tokio::test]
    async fn registered_config_supplies_defaults() {
        let registry = ModelConfigRegistry::default();
        let config = registry
            .configure(&ModelConfigRequest {
                model_type: Some("microsoft/phi-2".to_owned()),
                temperature: Some(0.3),
                max_tokens: Some(128.0),
                ..ModelConfigRequest::default()
            })
            .await
            .expect("valid config");
        assert_eq!(config.sampling.top_p, 0.9);

        let sampling = registry
            .sampling_for(
                "microsoft/phi-2",
                &SamplingOverrides {
                    max_tokens: Some(16),
                    ..SamplingOverrides::default()
                },
            )
            .await;
        assert_eq!(sampling.temperature, 0.3);
        assert_eq!(sampling.max_tokens, 16);

        let untouched = registry
            .sampling_for("other", &SamplingOverrides::default())
            .await;
        assert_eq!(untouched, SamplingConfig::default());
    }

    #[tokio::test]
    async fn configure_validates_input() {
        let registry = ModelConfigRegistry::default();
        let missing = registry
            .configure(&ModelConfigRequest::default())
            .await
            .expect_err("model_type required");
        assert_eq!(missing.code(), "MISSING_PARAMETER");

        let bad = registry
            .configure(&ModelConfigRequest {
                model_type: Some("m".to_owned()),
                temperature: Some(3.0),
                ..ModelConfigRequest::default()
            })
            .await
            .expect_err("temperature out of range");
        assert_eq!(bad.code(), "INVALID_TEMPERATURE");
        assert!(registry.is_empty().await);
    }
}
