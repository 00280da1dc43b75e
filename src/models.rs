use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokens::estimate_tokens;

/// Raw `/infer` body. Numeric fields decode as `f64` so out-of-range and
/// fractional values reach the validator instead of failing JSON decoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<f64>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Raw `/infer/batch` body; sampling fields apply to every prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchInferenceRequest {
    #[serde(default)]
    pub prompts: Option<Vec<String>>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<f64>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl BatchInferenceRequest {
    pub fn item(&self, prompt: &str) -> InferenceRequest {
        InferenceRequest {
            prompt: Some(prompt.to_owned()),
            model_id: self.model_id.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            top_k: self.top_k,
            mode: self.mode.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    ClientSide,
    ServerSide,
    Hybrid,
}

impl InferenceMode {
    pub const ALL: [InferenceMode; 3] = [Self::ClientSide, Self::ServerSide, Self::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSide => "client_side",
            Self::ServerSide => "server_side",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == value)
    }
}

/// Identity of one downstream text-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    LocalModel,
    RemoteApi,
    CannedText,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 3] = [Self::LocalModel, Self::RemoteApi, Self::CannedText];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalModel => "local_model",
            Self::RemoteApi => "remote_api",
            Self::CannedText => "canned_text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Whether this adapter produces real model output.
    pub fn is_generative(&self) -> bool {
        !matches!(self, Self::CannedText)
    }
}

/// Sampling values explicitly supplied by a caller, already bounds-checked.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingOverrides {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
}

/// Fully resolved sampling configuration handed to adapters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.9,
            top_k: 50,
        }
    }
}

impl SamplingConfig {
    pub fn with_overrides(self, overrides: &SamplingOverrides) -> Self {
        Self {
            temperature: overrides.temperature.unwrap_or(self.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            top_k: overrides.top_k.unwrap_or(self.top_k),
        }
    }
}

/// An [`InferenceRequest`] that passed validation. Only the validator builds
/// these, and nothing mutates them afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    prompt: String,
    model_id: String,
    mode: InferenceMode,
    sampling: SamplingOverrides,
}

impl ValidatedRequest {
    pub(crate) fn new(
        prompt: String,
        model_id: String,
        mode: InferenceMode,
        sampling: SamplingOverrides,
    ) -> Self {
        Self {
            prompt,
            model_id,
            mode,
            sampling,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    pub fn sampling(&self) -> &SamplingOverrides {
        &self.sampling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    BadStatus,
    MalformedResponse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::BadStatus => "bad_status",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Generated { text: String, tokens_generated: u32 },
    Failed(FailureKind),
}

/// Normalized outcome of one adapter attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResult {
    pub outcome: AttemptOutcome,
    pub latency_ms: f64,
}

impl BackendResult {
    pub fn generated(text: String, latency_ms: f64) -> Self {
        let tokens_generated = estimate_tokens(&text);
        Self {
            outcome: AttemptOutcome::Generated {
                text,
                tokens_generated,
            },
            latency_ms,
        }
    }

    pub fn failed(kind: FailureKind, latency_ms: f64) -> Self {
        Self {
            outcome: AttemptOutcome::Failed(kind),
            latency_ms,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Generated { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Generated { text, .. } => Some(text),
            AttemptOutcome::Failed(_) => None,
        }
    }

    pub fn tokens_generated(&self) -> u32 {
        match &self.outcome {
            AttemptOutcome::Generated {
                tokens_generated, ..
            } => *tokens_generated,
            AttemptOutcome::Failed(_) => 0,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            AttemptOutcome::Generated { .. } => None,
            AttemptOutcome::Failed(kind) => Some(*kind),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResponse {
    pub request_id: String,
    pub text: String,
    pub tokens_generated: u32,
    /// Token counts are a word-count estimate, never a tokenizer result.
    pub tokens_approximate: bool,
    pub inference_time_ms: f64,
    pub mode: InferenceMode,
    pub model_id: String,
    pub served_by: AdapterKind,
    pub fallback_used: bool,
    pub attempts: u32,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: Vec<InferenceResponse>,
    pub total_prompts: usize,
    /// Prompts answered by a generative adapter rather than canned text.
    pub successful: usize,
    pub total_time_ms: f64,
    pub total_tokens: u64,
}

impl BatchResult {
    pub fn from_results(results: Vec<InferenceResponse>) -> Self {
        let successful = results
            .iter()
            .filter(|response| response.served_by.is_generative())
            .count();
        let total_time_ms = results.iter().map(|r| r.inference_time_ms).sum();
        let total_tokens = results.iter().map(|r| r.tokens_generated as u64).sum();

        Self {
            total_prompts: results.len(),
            successful,
            total_time_ms,
            total_tokens,
            results,
        }
    }
}
