// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime metrics recorder.
//!
//! Counters and gauges are plain atomics; latency keeps a bounded sample
//! window for avg/p99. Snapshots merge the capability's custom map.

use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::capability::MetricsReport;
use crate::constants::limits::LATENCY_WINDOW;
use crate::protocol::DecisionRecord;

#[derive(Debug)]
pub struct Metrics {
    processed: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
    active_requests: AtomicU64,
    started_at: Instant,
    latencies_ms: Mutex<VecDeque<f64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            started_at: Instant::now(),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    /// Count an emitted decision under its verdict.
    pub fn record_decision(&self, decision: &DecisionRecord) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if decision.is_allow() {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_started(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.requests_finished(1);
    }

    pub fn requests_finished(&self, count: u64) {
        // saturating decrement; a stray double-remove must not wrap
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(count))
            });
    }

    pub fn active_requests(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    pub fn observe_latency(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut window = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(ms);
    }

    pub fn report(&self, custom: BTreeMap<String, Value>) -> MetricsReport {
        let (avg, p99) = {
            let window = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
            if window.is_empty() {
                (0.0, 0.0)
            } else {
                let mut sorted: Vec<f64> = window.iter().copied().collect();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let avg = sorted.iter().sum::<f64>() / sorted.len() as f64;
                let idx = ((sorted.len() as f64 * 0.99).ceil() as usize)
                    .clamp(1, sorted.len())
                    - 1;
                (avg, sorted[idx])
            }
        };

        MetricsReport {
            requests_processed: self.processed.load(Ordering::Relaxed),
            requests_allowed: self.allowed.load(Ordering::Relaxed),
            requests_blocked: self.blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            avg_latency_ms: avg,
            p99_latency_ms: p99,
            custom,
        }
    }
}
