pub mod canned;
pub mod ollama;
pub mod remote;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{AdapterKind, BackendResult, FailureKind, SamplingConfig};

/// One downstream text-generation backend behind a uniform attempt contract.
///
/// `attempt` never returns an error: every transport, status and decoding
/// failure is folded into a [`FailureKind`] on the returned result.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> AdapterKind;
    async fn attempt(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> BackendResult;
    /// Cheap availability check used by the status surface.
    async fn probe(&self, timeout: Duration) -> bool;
}

/// Classifies a reqwest transport error.
pub(crate) fn classify_transport(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_decode() {
        FailureKind::MalformedResponse
    } else {
        FailureKind::ConnectionError
    }
}

pub(crate) fn elapsed_ms(started: std::time::Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}
