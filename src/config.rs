use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::{
    backend::ollama::DEFAULT_SYSTEM_PROMPT,
    catalog::DEFAULT_MODEL,
    models::{AdapterKind, InferenceMode},
    resolver::{
        FallbackPolicy, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_PROBE_CACHE_TTL, DEFAULT_PROBE_TIMEOUT,
    },
    store::DEFAULT_HISTORY_CAPACITY,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalModelConfig {
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// `None` disables the local-model adapter.
    pub local_model: Option<LocalModelConfig>,
    /// `None` disables the remote-API adapter.
    pub remote_api_url: Option<String>,
    pub attempt_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_cache_ttl: Duration,
    pub history_capacity: usize,
    pub default_model: String,
    pub default_mode: InferenceMode,
    pub policy: FallbackPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            local_model: Some(LocalModelConfig {
                base_url: "http://127.0.0.1:11434".to_owned(),
                model: "llama3".to_owned(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            }),
            remote_api_url: Some("http://127.0.0.1:5000/query/".to_owned()),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_cache_ttl: DEFAULT_PROBE_CACHE_TTL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_model: DEFAULT_MODEL.to_owned(),
            default_mode: InferenceMode::ClientSide,
            policy: FallbackPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("GATEWAY_BIND_ADDR") {
            Some(value) => value.trim().parse().map_err(|error| ConfigError::Invalid {
                name: "GATEWAY_BIND_ADDR",
                reason: format!("{error}"),
            })?,
            None => defaults.bind_addr,
        };

        let local_defaults = defaults.local_model.clone().unwrap_or_else(|| LocalModelConfig {
            base_url: String::new(),
            model: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        });
        let local_base_url = lookup("OLLAMA_BASE_URL").unwrap_or(local_defaults.base_url);
        let local_model = (!local_base_url.trim().is_empty()).then(|| LocalModelConfig {
            base_url: local_base_url.trim().to_owned(),
            model: lookup("OLLAMA_MODEL")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(local_defaults.model),
            system_prompt: lookup("LOCAL_MODEL_SYSTEM_PROMPT")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(local_defaults.system_prompt),
        });

        let remote_api_url = match lookup("LLM_SERVICE_URL") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_owned()),
            None => defaults.remote_api_url,
        };

        let attempt_timeout = lookup("INFERENCE_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.attempt_timeout);
        let probe_timeout = lookup("PROBE_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.probe_timeout);
        let probe_cache_ttl = lookup("PROBE_CACHE_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.probe_cache_ttl);
        let history_capacity = lookup("GATEWAY_HISTORY_CAPACITY")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(defaults.history_capacity);
        let default_model = lookup("GATEWAY_DEFAULT_MODEL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.default_model);

        let default_policy = defaults.policy;
        let chain =
            |name: &'static str, mode: InferenceMode| -> Result<Vec<AdapterKind>, ConfigError> {
                match lookup(name) {
                    Some(value) => FallbackPolicy::parse_chain(&value)
                        .map_err(|reason| ConfigError::Invalid { name, reason }),
                    None => Ok(default_policy.chain(mode).to_vec()),
                }
            };
        let policy = FallbackPolicy::new(
            chain("GATEWAY_CHAIN_CLIENT_SIDE", InferenceMode::ClientSide)?,
            chain("GATEWAY_CHAIN_SERVER_SIDE", InferenceMode::ServerSide)?,
            chain("GATEWAY_CHAIN_HYBRID", InferenceMode::Hybrid)?,
        );

        Ok(Self {
            bind_addr,
            local_model,
            remote_api_url,
            attempt_timeout,
            probe_timeout,
            probe_cache_ttl,
            history_capacity,
            default_model,
            default_mode: defaults.default_mode,
            policy,
        })
    }
}
