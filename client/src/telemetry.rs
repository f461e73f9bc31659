use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

// Keep a bounded number of latency samples to avoid unbounded memory growth.
const TELEMETRY_WINDOW: usize = 1000;

/// Counters for façade calls.
#[derive(Default, Debug)]
pub struct CallTelemetry {
    calls_ok: AtomicU64,
    calls_err: AtomicU64,
    unauthorized: AtomicU64,
    invalid_input: AtomicU64,
    fixture_served: AtomicU64,
    malformed_records: AtomicU64,
    latency_ms: Mutex<VecDeque<u128>>,
    error_kinds: Mutex<BTreeMap<String, u64>>,
    last_error: Mutex<Option<String>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CallTelemetrySummary {
    pub calls_ok: u64,
    pub calls_err: u64,
    pub unauthorized: u64,
    pub invalid_input: u64,
    pub fixture_served: u64,
    pub malformed_records: u64,
    pub latency_ms_p50: Option<f64>,
    pub latency_ms_p95: Option<f64>,
    pub success_rate: f64,
    pub error_kinds: BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

impl CallTelemetry {
    pub fn record_success(&self, duration: Duration) {
        self.calls_ok.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut samples) = self.latency_ms.lock() {
            samples.push_back(duration.as_millis());
            while samples.len() > TELEMETRY_WINDOW {
                samples.pop_front();
            }
        }
    }

    pub fn record_failure(&self, kind: &str, message: &str) {
        self.calls_err.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.error_kinds.lock() {
            *map.entry(kind.to_string()).or_insert(0) += 1;
        }
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message.to_string());
        }
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_input(&self) {
        self.invalid_input.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fixture_served(&self) {
        self.fixture_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self, dropped: u64) {
        self.malformed_records.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn summary(&self) -> CallTelemetrySummary {
        let calls_ok = self.calls_ok.load(Ordering::Relaxed);
        let calls_err = self.calls_err.load(Ordering::Relaxed);
        let latency: Vec<u128> = self
            .latency_ms
            .lock()
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default();
        let total = calls_ok + calls_err;

        CallTelemetrySummary {
            calls_ok,
            calls_err,
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            invalid_input: self.invalid_input.load(Ordering::Relaxed),
            fixture_served: self.fixture_served.load(Ordering::Relaxed),
            malformed_records: self.malformed_records.load(Ordering::Relaxed),
            latency_ms_p50: percentile(&latency, 0.50),
            latency_ms_p95: percentile(&latency, 0.95),
            success_rate: if total > 0 {
                calls_ok as f64 / total as f64
            } else {
                0.0
            },
            error_kinds: self
                .error_kinds
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default(),
            last_error: self.last_error.lock().map(|m| m.clone()).unwrap_or(None),
        }
    }
}

fn percentile(samples: &[u128], pct: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<u128> = samples.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64 - 1.0) * pct).ceil() as usize;
    let idx = idx.min(sorted.len().saturating_sub(1));
    Some(sorted[idx] as f64)
}
