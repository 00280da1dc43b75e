use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    backend::{classify_transport, elapsed_ms, InferenceBackend},
    models::{AdapterKind, BackendResult, FailureKind, SamplingConfig},
};

/// Hosted query service: `POST {query, message_history, query_type}`, answer in `response`.
#[derive(Clone)]
pub struct RemoteApiBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteApiBackend {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| format!("failed to build remote API HTTP client: {error}"))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn query(&self, prompt: &str, timeout: Duration) -> Result<String, FailureKind> {
        let payload = RemoteQuery {
            query: prompt,
            message_history: &[],
            query_type: "general",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_transport(&error))?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "remote API returned error status");
            return Err(FailureKind::BadStatus);
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| classify_transport(&error))?;
        let parsed: RemoteAnswer =
            serde_json::from_slice(&body).map_err(|_| FailureKind::MalformedResponse)?;

        parsed
            .response
            .filter(|text| !text.trim().is_empty())
            .ok_or(FailureKind::MalformedResponse)
    }
}

#[async_trait]
impl InferenceBackend for RemoteApiBackend {
    fn name(&self) -> &str {
        "remote-api"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::RemoteApi
    }

    // Sampling is owned by the remote service; only the prompt is forwarded.
    async fn attempt(
        &self,
        prompt: &str,
        _sampling: &SamplingConfig,
        timeout: Duration,
    ) -> BackendResult {
        let started = Instant::now();
        match self.query(prompt, timeout).await {
            Ok(text) => BackendResult::generated(text, elapsed_ms(started)),
            Err(kind) => BackendResult::failed(kind, elapsed_ms(started)),
        }
    }

    async fn probe(&self, timeout: Duration) -> bool {
        match self.client.get(&self.endpoint).timeout(timeout).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct RemoteQuery<'a> {
    query: &'a str,
    message_history: &'a [serde_json::Value],
    query_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct RemoteAnswer {
    #[serde(default)]
    response: Option<String>,
}
