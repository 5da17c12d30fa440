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

//! Inspection capability seam.
//!
//! User code implements [`InspectionCapability`]; the runtime invokes it.
//! Every method has a default body, so an agent only overrides the hooks it
//! advertises in [`Capabilities`]. The reference concurrency contract is at
//! most one concurrent call per connection; a capability shared across
//! connections must synchronize its own state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::decision::Decision;
use crate::protocol::RequestKey;
use crate::view::{RequestView, ResponseView};

/// Handler set advertised once at handshake; immutable for the life of a
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub handles_request_headers: bool,
    pub handles_request_body: bool,
    pub handles_response_headers: bool,
    pub handles_response_body: bool,
    pub supports_streaming: bool,
    pub supports_cancellation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_features: Vec<String>,
}

impl Default for Capabilities {
    /// Request-headers-only, the minimum useful agent.
    fn default() -> Self {
        Self {
            handles_request_headers: true,
            handles_request_body: false,
            handles_response_headers: false,
            handles_response_body: false,
            supports_streaming: false,
            supports_cancellation: true,
            max_concurrent_requests: None,
            supported_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        load: Option<f64>,
    },
    Unhealthy {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    pub requests_processed: u64,
    pub requests_allowed: u64,
    pub requests_blocked: u64,
    pub errors: u64,
    pub active_requests: u64,
    pub uptime_seconds: u64,
    pub avg_latency_ms: f64,
    pub p99_latency_ms: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
}

/// The inspection logic the runtime drives.
///
/// Request-side hooks return a [`Decision`]; a hook that fails is isolated
/// by the dispatcher (canonical 500 Block on the request side, Allow on the
/// response side). Lifecycle hooks have their errors swallowed entirely.
#[async_trait]
pub trait InspectionCapability: Send + Sync + 'static {
    /// Name reported in the handshake response.
    fn name(&self) -> &str {
        crate::constants::defaults::AGENT_NAME
    }

    /// Handler set advertised at handshake.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// v1 out-of-band configuration push.
    async fn on_configure(&self, agent_id: &str, config: &Value) -> anyhow::Result<()> {
        let _ = (agent_id, config);
        Ok(())
    }

    /// Request headers arrived; the request body (if any) has not.
    async fn on_request(&self, request: &RequestView) -> anyhow::Result<Decision> {
        let _ = request;
        Ok(Decision::allow())
    }

    /// The final request body chunk arrived; `request.body()` holds every
    /// chunk concatenated in arrival order.
    async fn on_request_body(&self, request: &RequestView) -> anyhow::Result<Decision> {
        let _ = request;
        Ok(Decision::allow())
    }

    /// Upstream response headers arrived.
    async fn on_response(
        &self,
        request: &RequestView,
        response: &ResponseView,
    ) -> anyhow::Result<Decision> {
        let _ = (request, response);
        Ok(Decision::allow())
    }

    /// One response body chunk arrived; `response.body()` holds only this
    /// chunk, never an accumulation.
    async fn on_response_body(
        &self,
        request: &RequestView,
        response: &ResponseView,
    ) -> anyhow::Result<Decision> {
        let _ = (request, response);
        Ok(Decision::allow())
    }

    /// v1 terminal event carrying the upstream outcome.
    async fn on_request_complete(
        &self,
        request: &RequestView,
        status: u16,
        duration_ms: u64,
    ) -> anyhow::Result<()> {
        let _ = (request, status, duration_ms);
        Ok(())
    }

    /// The peer abandoned one request. The context is already gone; any
    /// in-flight call for this key is not interrupted.
    async fn on_request_cancelled(&self, key: &RequestKey, reason: Option<&str>) {
        let _ = (key, reason);
    }

    /// The peer abandoned every request on a connection, or the agent is
    /// shutting down.
    async fn on_all_requests_cancelled(&self, reason: Option<&str>) {
        let _ = reason;
    }

    /// Drain entered; in-progress requests will still complete.
    async fn on_drain(&self, timeout_ms: u64) {
        let _ = timeout_ms;
    }

    /// Final lifecycle hook before the process stops accepting work.
    async fn on_shutdown(&self) {}

    /// A connection closed, cleanly (`None`) or with the given error.
    async fn on_stream_closed(&self, error: Option<&anyhow::Error>) {
        let _ = error;
    }

    fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Capability-specific gauges merged into the runtime report.
    fn custom_metrics(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

/// Allow-everything capability used by the launcher and tests.
#[derive(Debug, Clone, Default)]
pub struct DefaultCapability;

#[async_trait]
impl InspectionCapability for DefaultCapability {}
