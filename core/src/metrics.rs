use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Ok,
    NotFound,
    ClientError,
    ServerError,
}

#[derive(Debug, Clone, Default)]
struct RequestMetrics {
    total_requests: u64,
    not_found: u64,
    client_errors: u64,
    server_errors: u64,
    latencies: VecDeque<u64>, // microseconds
}

#[derive(Clone)]
pub struct MetricsCollector {
    state: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    requests: RequestMetrics,
    max_history: usize,
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState {
                requests: RequestMetrics::default(),
                max_history,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        // Counters stay usable even if a recording thread panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_request(&self, latency_us: u64, outcome: RequestOutcome) {
        let mut state = self.lock();
        let max_history = state.max_history;
        let requests = &mut state.requests;
        requests.total_requests += 1;
        match outcome {
            RequestOutcome::Ok => {}
            RequestOutcome::NotFound => requests.not_found += 1,
            RequestOutcome::ClientError => requests.client_errors += 1,
            RequestOutcome::ServerError => requests.server_errors += 1,
        }
        requests.latencies.push_back(latency_us);
        if requests.latencies.len() > max_history {
            requests.latencies.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        let r = &state.requests;

        let mut sorted_latencies: Vec<u64> = r.latencies.iter().copied().collect();
        sorted_latencies.sort_unstable();

        let error_rate = if r.total_requests > 0 {
            r.server_errors as f32 / r.total_requests as f32
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests: r.total_requests,
            not_found: r.not_found,
            client_errors: r.client_errors,
            server_errors: r.server_errors,
            error_rate,
            p50: percentile(&sorted_latencies, 50.0),
            p95: percentile(&sorted_latencies, 95.0),
            p99: percentile(&sorted_latencies, 99.0),
            history_count: r.latencies.len(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn percentile(sorted: &[u64], p: f32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p / 100.0) * (sorted.len() as f32)).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub not_found: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub error_rate: f32,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub history_count: usize,
}
