use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{canned::CannedTextBackend, elapsed_ms, InferenceBackend},
    catalog::ModelConfigRegistry,
    metrics::AppMetrics,
    models::{
        AdapterKind, AttemptOutcome, BackendResult, BatchResult, FailureKind, InferenceMode,
        InferenceResponse, SamplingConfig, ValidatedRequest,
    },
    store::ResponseStore,
};

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Ordered adapter chain per inference mode. Every chain ends with
/// [`AdapterKind::CannedText`] and names each adapter at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    client_side: Vec<AdapterKind>,
    server_side: Vec<AdapterKind>,
    hybrid: Vec<AdapterKind>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        use AdapterKind::*;
        Self::new(
            vec![LocalModel, CannedText],
            vec![RemoteApi, CannedText],
            vec![LocalModel, RemoteApi, CannedText],
        )
    }
}

impl FallbackPolicy {
    pub fn new(
        client_side: Vec<AdapterKind>,
        server_side: Vec<AdapterKind>,
        hybrid: Vec<AdapterKind>,
    ) -> Self {
        Self {
            client_side: terminate_chain(client_side),
            server_side: terminate_chain(server_side),
            hybrid: terminate_chain(hybrid),
        }
    }

    pub fn chain(&self, mode: InferenceMode) -> &[AdapterKind] {
        match mode {
            InferenceMode::ClientSide => &self.client_side,
            InferenceMode::ServerSide => &self.server_side,
            InferenceMode::Hybrid => &self.hybrid,
        }
    }

    /// Parses a comma separated list such as `remote_api,canned_text`.
    pub fn parse_chain(value: &str) -> Result<Vec<AdapterKind>, String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| AdapterKind::parse(name).ok_or_else(|| format!("unknown adapter {name:?}")))
            .collect()
    }
}

fn terminate_chain(chain: Vec<AdapterKind>) -> Vec<AdapterKind> {
    let mut terminated = Vec::with_capacity(chain.len() + 1);
    for kind in chain {
        if terminated.contains(&kind) {
            continue;
        }
        terminated.push(kind);
        if kind == AdapterKind::CannedText {
            return terminated;
        }
    }
    terminated.push(AdapterKind::CannedText);
    terminated
}

struct Endpoint {
    backend: Arc<dyn InferenceBackend>,
    health: Arc<Mutex<EndpointHealth>>,
}

#[derive(Debug, Default)]
struct EndpointHealth {
    consecutive_failures: u32,
    last_failure: Option<FailureKind>,
    last_latency_ms: Option<f64>,
    last_probe: Option<(Instant, bool)>,
}

impl Endpoint {
    fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            health: Arc::new(Mutex::new(EndpointHealth::default())),
        }
    }

    async fn mark_success(&self, latency_ms: f64) {
        let mut health = self.health.lock().await;
        health.consecutive_failures = 0;
        health.last_failure = None;
        health.last_latency_ms = Some(latency_ms);
    }

    async fn mark_failure(&self, failure: FailureKind, latency_ms: f64) -> u32 {
        let mut health = self.health.lock().await;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure = Some(failure);
        health.last_latency_ms = Some(latency_ms);
        health.consecutive_failures
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    pub adapter: AdapterKind,
    pub name: Option<String>,
    pub configured: bool,
    pub available: bool,
    pub consecutive_failures: u32,
    pub last_failure: Option<FailureKind>,
    pub last_latency_ms: Option<f64>,
}

/// Tries adapters strictly in policy order until one answers, then records
/// the outcome. Resolution never fails: canned text is the last resort.
pub struct FallbackResolver {
    endpoints: Vec<Endpoint>,
    terminal: CannedTextBackend,
    policy: FallbackPolicy,
    attempt_timeout: Duration,
    probe_timeout: Duration,
    probe_cache_ttl: Duration,
    store: Arc<ResponseStore>,
    configs: Arc<ModelConfigRegistry>,
    metrics: Arc<AppMetrics>,
}

impl FallbackResolver {
    pub fn new(
        backends: Vec<Arc<dyn InferenceBackend>>,
        store: Arc<ResponseStore>,
        configs: Arc<ModelConfigRegistry>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let mut endpoints = Vec::with_capacity(backends.len() + 1);
        for backend in backends {
            if endpoints
                .iter()
                .any(|endpoint: &Endpoint| endpoint.backend.kind() == backend.kind())
            {
                warn!(backend = backend.name(), "duplicate adapter kind ignored");
                continue;
            }
            endpoints.push(Endpoint::new(backend));
        }
        if !endpoints
            .iter()
            .any(|endpoint| endpoint.backend.kind() == AdapterKind::CannedText)
        {
            endpoints.push(Endpoint::new(Arc::new(CannedTextBackend)));
        }

        Self {
            endpoints,
            terminal: CannedTextBackend,
            policy: FallbackPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_cache_ttl: DEFAULT_PROBE_CACHE_TTL,
            store,
            configs,
            metrics,
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_probe(mut self, timeout: Duration, cache_ttl: Duration) -> Self {
        self.probe_timeout = timeout;
        self.probe_cache_ttl = cache_ttl;
        self
    }

    pub fn store(&self) -> &Arc<ResponseStore> {
        &self.store
    }

    fn endpoint(&self, kind: AdapterKind) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.backend.kind() == kind)
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> BackendResult {
        let started = Instant::now();
        let pending = endpoint
            .backend
            .attempt(prompt, sampling, self.attempt_timeout);
        let result = match tokio::time::timeout(self.attempt_timeout, pending).await {
            Ok(result) => result,
            Err(_) => BackendResult::failed(FailureKind::Timeout, elapsed_ms(started)),
        };

        match result.text() {
            Some(text) if text.trim().is_empty() => {
                BackendResult::failed(FailureKind::MalformedResponse, result.latency_ms)
            }
            _ => result,
        }
    }

    pub async fn resolve(&self, request: &ValidatedRequest) -> InferenceResponse {
        let request_id = Uuid::new_v4().to_string();
        let sampling = self
            .configs
            .sampling_for(request.model_id(), request.sampling())
            .await;
        let mut attempts = 0_u32;
        let mut attempted_ms = 0.0;
        let mut answer = None;

        for &kind in self.policy.chain(request.mode()) {
            let Some(endpoint) = self.endpoint(kind) else {
                debug!(request_id = %request_id, adapter = kind.as_str(), "adapter not configured, skipping");
                continue;
            };

            attempts += 1;
            let attempt_started = Instant::now();
            let result = self.attempt(endpoint, request.prompt(), &sampling).await;
            let wall_ms = elapsed_ms(attempt_started);
            attempted_ms += wall_ms;
            self.metrics.observe_attempt(kind, &result);

            match result.outcome {
                AttemptOutcome::Generated {
                    text,
                    tokens_generated,
                } => {
                    endpoint.mark_success(wall_ms).await;
                    answer = Some((kind, text, tokens_generated));
                    break;
                }
                AttemptOutcome::Failed(failure) => {
                    let failures = endpoint.mark_failure(failure, wall_ms).await;
                    warn!(
                        request_id = %request_id,
                        adapter = kind.as_str(),
                        backend = endpoint.backend.name(),
                        failure = %failure,
                        failures,
                        latency_ms = wall_ms,
                        "adapter attempt failed, falling back"
                    );
                }
            }
        }

        let (served_by, text, tokens_generated) = match answer {
            Some(answer) => answer,
            // Reached only when an injected canned endpoint failed; the
            // built-in table still answers and counts as one more attempt.
            None => {
                attempts += 1;
                let result = self.terminal.respond(request.prompt());
                attempted_ms += result.latency_ms;
                self.metrics.observe_attempt(AdapterKind::CannedText, &result);
                let tokens = result.tokens_generated();
                let text = result.text().unwrap_or(self.terminal.default_reply()).to_owned();
                (AdapterKind::CannedText, text, tokens)
            }
        };

        let response = InferenceResponse {
            request_id,
            text,
            tokens_generated,
            tokens_approximate: true,
            inference_time_ms: attempted_ms,
            mode: request.mode(),
            model_id: request.model_id().to_owned(),
            served_by,
            fallback_used: !served_by.is_generative(),
            attempts,
            success: true,
            timestamp: Utc::now(),
        };

        info!(
            request_id = %response.request_id,
            mode = response.mode.as_str(),
            served_by = served_by.as_str(),
            attempts,
            inference_time_ms = response.inference_time_ms,
            "inference resolved"
        );
        self.metrics.observe_resolution(served_by, tokens_generated);
        self.store.record(response.clone()).await;
        response
    }

    /// Resolves each request in order; results keep the input order.
    pub async fn resolve_batch(&self, requests: &[ValidatedRequest]) -> BatchResult {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.resolve(request).await);
        }
        let batch = BatchResult::from_results(results);
        info!(
            total_prompts = batch.total_prompts,
            successful = batch.successful,
            total_time_ms = batch.total_time_ms,
            "batch resolved"
        );
        batch
    }

    async fn probe(&self, endpoint: &Endpoint) -> bool {
        {
            let health = endpoint.health.lock().await;
            if let Some((checked_at, available)) = health.last_probe {
                if checked_at.elapsed() < self.probe_cache_ttl {
                    return available;
                }
            }
        }

        let available = endpoint.backend.probe(self.probe_timeout).await;
        endpoint.health.lock().await.last_probe = Some((Instant::now(), available));
        if !available {
            debug!(backend = endpoint.backend.name(), "availability probe failed");
        }
        available
    }

    pub async fn backend_status(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(AdapterKind::ALL.len());
        for kind in AdapterKind::ALL {
            let Some(endpoint) = self.endpoint(kind) else {
                statuses.push(BackendStatus {
                    adapter: kind,
                    name: None,
                    configured: false,
                    available: false,
                    consecutive_failures: 0,
                    last_failure: None,
                    last_latency_ms: None,
                });
                continue;
            };

            let available = self.probe(endpoint).await;
            let health = endpoint.health.lock().await;
            statuses.push(BackendStatus {
                adapter: kind,
                name: Some(endpoint.backend.name().to_owned()),
                configured: true,
                available,
                consecutive_failures: health.consecutive_failures,
                last_failure: health.last_failure,
                last_latency_ms: health.last_latency_ms,
            });
        }
        statuses
    }

    /// First available adapter in the hybrid chain.
    pub fn active_service(&self, statuses: &[BackendStatus]) -> AdapterKind {
        self.policy
            .chain(InferenceMode::Hybrid)
            .iter()
            .copied()
            .find(|kind| {
                statuses
                    .iter()
                    .any(|status| status.adapter == *kind && status.available)
            })
            .unwrap_or(AdapterKind::CannedText)
    }
}
