use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::models::{AdapterKind, InferenceMode, InferenceResponse};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Process-local log of resolved inferences plus running aggregates.
///
/// Records and counters live behind one lock, so `record`, `clear` and the
/// read snapshots never observe a partial update. The counters always equal
/// the fold of the records currently held: when the capacity is reached the
/// oldest record is evicted and subtracted.
#[derive(Debug)]
pub struct ResponseStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: VecDeque<InferenceResponse>,
    counters: Counters,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Counters {
    total_inferences: u64,
    total_tokens: u64,
    total_time_ms: f64,
    client_side: u64,
    server_side: u64,
    hybrid: u64,
    local_model: u64,
    remote_api: u64,
    canned_text: u64,
}

impl Counters {
    fn apply(&mut self, response: &InferenceResponse, sign: i64) {
        let step = |value: &mut u64, amount: u64| {
            *value = if sign >= 0 {
                value.saturating_add(amount)
            } else {
                value.saturating_sub(amount)
            };
        };

        step(&mut self.total_inferences, 1);
        step(&mut self.total_tokens, response.tokens_generated as u64);
        self.total_time_ms += sign as f64 * response.inference_time_ms;
        if self.total_inferences == 0 {
            self.total_time_ms = 0.0;
        }

        match response.mode {
            InferenceMode::ClientSide => step(&mut self.client_side, 1),
            InferenceMode::ServerSide => step(&mut self.server_side, 1),
            InferenceMode::Hybrid => step(&mut self.hybrid, 1),
        }
        match response.served_by {
            AdapterKind::LocalModel => step(&mut self.local_model, 1),
            AdapterKind::RemoteApi => step(&mut self.remote_api, 1),
            AdapterKind::CannedText => step(&mut self.canned_text, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_inferences: u64,
    /// Sum of approximate token counts.
    pub total_tokens: u64,
    pub total_time_ms: f64,
    pub average_inference_time_ms: f64,
    pub client_side_count: u64,
    pub server_side_count: u64,
    pub hybrid_count: u64,
    pub served_by: ServedByCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedByCounts {
    pub local_model: u64,
    pub remote_api: u64,
    pub canned_text: u64,
}

impl From<&Counters> for MetricsSnapshot {
    fn from(counters: &Counters) -> Self {
        let average_inference_time_ms = if counters.total_inferences == 0 {
            0.0
        } else {
            counters.total_time_ms / counters.total_inferences as f64
        };

        Self {
            total_inferences: counters.total_inferences,
            total_tokens: counters.total_tokens,
            total_time_ms: counters.total_time_ms,
            average_inference_time_ms,
            client_side_count: counters.client_side,
            server_side_count: counters.server_side,
            hybrid_count: counters.hybrid,
            served_by: ServedByCounts {
                local_model: counters.local_model,
                remote_api: counters.remote_api,
                canned_text: counters.canned_text,
            },
        }
    }
}

impl Default for ResponseStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ResponseStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, response: InferenceResponse) {
        let mut inner = self.inner.lock().await;
        if inner.records.len() >= self.capacity {
            if let Some(evicted) = inner.records.pop_front() {
                inner.counters.apply(&evicted, -1);
            }
        }
        inner.counters.apply(&response, 1);
        inner.records.push_back(response);
    }

    /// Most recent `limit` records, newest first.
    pub async fn history(&self, limit: usize) -> Vec<InferenceResponse> {
        let inner = self.inner.lock().await;
        inner.records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().await;
        MetricsSnapshot::from(&inner.counters)
    }

    /// Counters and the retained record count, read under one lock.
    pub async fn snapshot(&self) -> (MetricsSnapshot, usize) {
        let inner = self.inner.lock().await;
        (MetricsSnapshot::from(&inner.counters), inner.records.len())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every record and resets the counters; returns how many records were held.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.records.len();
        inner.records.clear();
        inner.counters = Counters::default();
        dropped
    }
}
