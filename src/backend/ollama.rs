use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    backend::{classify_transport, elapsed_ms, InferenceBackend},
    models::{AdapterKind, BackendResult, FailureKind, SamplingConfig},
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for the Meghalaya State \
Public Services Delivery Commission (MSPSDC). Answer questions about public services, \
document applications, welfare schemes and procedures clearly and concisely. If you are \
unsure, suggest contacting the MSPSDC helpdesk.";

/// Local inference daemon speaking the Ollama chat API.
#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| format!("failed to build local model HTTP client: {error}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.into(),
            system_prompt: system_prompt.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn chat(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> Result<String, FailureKind> {
        let payload = OllamaChatRequest {
            model: &self.model,
            messages: [
                OllamaMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                OllamaMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                top_k: sampling.top_k,
                num_predict: sampling.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_transport(&error))?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "local model returned error status");
            return Err(FailureKind::BadStatus);
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| classify_transport(&error))?;
        let parsed: OllamaChatResponse =
            serde_json::from_slice(&body).map_err(|_| FailureKind::MalformedResponse)?;

        parsed
            .message
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(FailureKind::MalformedResponse)
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::LocalModel
    }

    async fn attempt(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> BackendResult {
        let started = Instant::now();
        match self.chat(prompt, sampling, timeout).await {
            Ok(text) => BackendResult::generated(text, elapsed_ms(started)),
            Err(kind) => BackendResult::failed(kind, elapsed_ms(started)),
        }
    }

    async fn probe(&self, timeout: Duration) -> bool {
        let response = match self
            .client
            .get(self.url("/api/tags"))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return false,
        };

        match response.json::<OllamaTagsResponse>().await {
            Ok(tags) => tags
                .models
                .iter()
                .any(|model| model.name.starts_with(&self.model)),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [OllamaMessage<'a>; 2],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn backend(server: &MockServer) -> OllamaBackend {
        OllamaBackend::new(&server.uri(), "llama3", DEFAULT_SYSTEM_PROMPT).expect("client")
    }

    #[tokio::test]
    async fn returns_generated_text_and_maps_sampling_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "stream": false,
                "options": {"temperature": 0.2, "top_p": 0.5, "top_k": 7, "num_predict": 64},
                "messages": [{"role": "system"}, {"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "hi from llama"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sampling = SamplingConfig {
            temperature: 0.2,
            max_tokens: 64,
            top_p: 0.5,
            top_k: 7,
        };
        let result = backend(&server)
            .attempt("hello", &sampling, Duration::from_secs(5))
            .await;

        assert_eq!(result.text(), Some("hi from llama"));
        assert_eq!(result.tokens_generated(), 4);
    }

    #[tokio::test]
    async fn error_status_is_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = backend(&server)
            .attempt("hello", &SamplingConfig::default(), Duration::from_secs(5))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::BadStatus));
    }

    #[tokio::test]
    async fn unexpected_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": {}})))
            .mount(&server)
            .await;

        let result = backend(&server)
            .attempt("hello", &SamplingConfig::default(), Duration::from_secs(5))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::MalformedResponse));
    }

    #[tokio::test]
    async fn slow_daemon_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": {"content": "late"}}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = backend(&server)
            .attempt("hello", &SamplingConfig::default(), Duration::from_millis(100))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_a_connection_error() {
        let backend =
            OllamaBackend::new("http://127.0.0.1:1", "llama3", DEFAULT_SYSTEM_PROMPT).expect("client");
        let result = backend
            .attempt("hello", &SamplingConfig::default(), Duration::from_secs(2))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ConnectionError));
        assert!(!backend.probe(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_requires_the_configured_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "codellama:latest"}, {"name": "llama3:latest"}]
            })))
            .mount(&server)
            .await;
        assert!(backend(&server).probe(Duration::from_secs(1)).await);

        let other = OllamaBackend::new(&server.uri(), "mistral", DEFAULT_SYSTEM_PROMPT).expect("client");
        assert!(!other.probe(Duration::from_secs(1)).await);
    }
}
