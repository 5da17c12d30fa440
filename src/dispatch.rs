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

//! Event dispatcher.
//!
//! Translates one decoded inbound event into a capability call and the
//! returned decision into an outbound payload. Capability failures are
//! isolated here: request-side events answer with the canonical 500 Block,
//! response-side events with Allow so an agent fault never converts an
//! upstream success into a failure. Only terminal events destroy a request
//! context.

use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::audit::AuditLog;
use crate::capability::InspectionCapability;
use crate::constants::replies;
use crate::context::{RequestStore, ResponseLookup};
use crate::decision::Decision;
use crate::metrics::Metrics;
use crate::protocol::{DecisionPayload, InboundEvent, RequestKey};
use crate::view::RequestView;

/// A reply owed to the peer for one inbound event.
#[derive(Debug)]
pub struct Outbound {
    pub key: RequestKey,
    pub payload: DecisionPayload,
}

/// Per-connection dispatcher. The read loop is the only caller, so there is
/// at most one capability call in flight per connection.
pub struct EventDispatcher<C> {
    capability: Arc<C>,
    store: Arc<RequestStore>,
    metrics: Arc<Metrics>,
    audit: Option<Arc<AuditLog>>,
    draining: Arc<AtomicBool>,
    request_timeout: Duration,
    connection_id: String,
}

impl<C: InspectionCapability> EventDispatcher<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capability: Arc<C>,
        store: Arc<RequestStore>,
        metrics: Arc<Metrics>,
        audit: Option<Arc<AuditLog>>,
        draining: Arc<AtomicBool>,
        request_timeout: Duration,
        connection_id: String,
    ) -> Self {
        Self {
            capability,
            store,
            metrics,
            audit,
            draining,
            request_timeout,
            connection_id,
        }
    }

    /// Process one event. `Some` is a reply the connection must write;
    /// `None` means the event does not reply (cancellation, keep-alive).
    pub async fn dispatch(&self, event: InboundEvent) -> Option<Outbound> {
        match event {
            InboundEvent::Configure { agent_id, config } => {
                let key = RequestKey::Correlation(String::new());
                let payload = match self.capability.on_configure(&agent_id, &config).await {
                    Ok(()) => Decision::allow().build(),
                    Err(e) => {
                        error!(
                            connection = %self.connection_id,
                            "Capability on_configure failed: {}", e
                        );
                        self.metrics.record_error();
                        agent_error_payload(&e.to_string())
                    }
                };
                Some(self.finish(key, payload))
            }

            InboundEvent::RequestHeaders { key, headers, .. } => {
                if self.draining.load(Ordering::SeqCst) {
                    debug!(
                        connection = %self.connection_id,
                        key = %key,
                        "Refusing new request while draining"
                    );
                    let payload = Decision::block()
                        .with_status(503)
                        .with_body(replies::DRAINING_BODY)
                        .build();
                    return Some(self.finish(key, payload));
                }

                self.store.put_on_headers(key.clone(), Arc::new(headers));
                self.metrics.request_started();

                let view = self
                    .store
                    .request_view(&key, false)
                    .unwrap_or_else(|| RequestView::new(Default::default(), Default::default()));
                let payload = self
                    .guarded_call(&key, false, self.capability.on_request(&view))
                    .await;
                Some(self.finish(key, payload))
            }

            InboundEvent::RequestBodyChunk { key, chunk } => {
                if self.store.append_body(&key, &chunk.data).is_none() {
                    warn!(
                        connection = %self.connection_id,
                        key = %key,
                        "Body chunk for unknown request, allowing"
                    );
                    return Some(self.finish(key, Decision::allow().build()));
                }

                let payload = if chunk.is_last {
                    // capability sees every chunk concatenated in arrival order
                    match self.store.request_view(&key, true) {
                        Some(view) => {
                            self.guarded_call(&key, false, self.capability.on_request_body(&view))
                                .await
                        }
                        None => Decision::allow().build(),
                    }
                } else {
                    Decision::allow().build()
                };
                Some(self.finish(key, payload))
            }

            InboundEvent::ResponseHeaders {
                key,
                status,
                headers,
                ..
            } => {
                if self
                    .store
                    .set_response_headers(&key, status, Arc::new(headers))
                    .is_none()
                {
                    warn!(
                        connection = %self.connection_id,
                        key = %key,
                        "Response headers for unknown request, allowing"
                    );
                    return Some(self.finish(key, Decision::allow().build()));
                }

                let payload = match self.store.views_for_response(&key) {
                    Some((request, response)) => {
                        self.guarded_call(
                            &key,
                            true,
                            self.capability.on_response(&request, &response),
                        )
                        .await
                    }
                    None => Decision::allow().build(),
                };
                Some(self.finish(key, payload))
            }

            InboundEvent::ResponseBodyChunk { key, chunk } => {
                let payload = match self
                    .store
                    .views_for_response_chunk(&key, chunk.data.into())
                {
                    ResponseLookup::Missing => {
                        warn!(
                            connection = %self.connection_id,
                            key = %key,
                            "Response body chunk for unknown request, allowing"
                        );
                        Decision::allow().build()
                    }
                    ResponseLookup::NoResponseHeaders => {
                        warn!(
                            connection = %self.connection_id,
                            key = %key,
                            "Response body chunk before response headers, allowing"
                        );
                        Decision::allow().build()
                    }
                    ResponseLookup::Ready(request, response) => {
                        self.guarded_call(
                            &key,
                            true,
                            self.capability.on_response_body(&request, &response),
                        )
                        .await
                    }
                };
                Some(self.finish(key, payload))
            }

            InboundEvent::RequestComplete {
                key,
                status,
                duration_ms,
            } => {
                if let Some(ctx) = self.store.remove_on_terminal(&key) {
                    self.metrics.request_finished();
                    let view = RequestView::new(ctx.headers, ctx.body.into());
                    if let Err(e) = self
                        .capability
                        .on_request_complete(&view, status, duration_ms)
                        .await
                    {
                        error!(
                            connection = %self.connection_id,
                            key = %key,
                            "Capability on_request_complete failed: {}", e
                        );
                    }
                }
                Some(self.finish(key, Decision::allow().build()))
            }

            InboundEvent::WebSocketFrame { key } => {
                debug!(
                    connection = %self.connection_id,
                    key = %key,
                    "WebSocket frame acknowledged"
                );
                Some(self.finish(key, Decision::allow().build()))
            }

            InboundEvent::CancelRequest { key, reason } => {
                if self.store.remove_on_terminal(&key).is_some() {
                    self.metrics.request_finished();
                    self.capability
                        .on_request_cancelled(&key, reason.as_deref())
                        .await;
                }
                None
            }

            InboundEvent::CancelAll { reason } => {
                let dropped = self.store.clear_all();
                self.metrics.requests_finished(dropped as u64);
                self.capability
                    .on_all_requests_cancelled(reason.as_deref())
                    .await;
                None
            }

            // keep-alive and unknown tags are the connection loop's concern
            InboundEvent::Ping | InboundEvent::Pong | InboundEvent::Unknown { .. } => None,
        }
    }

    /// Run one decision-producing capability call under the timeout and
    /// panic guard.
    async fn guarded_call(
        &self,
        key: &RequestKey,
        response_side: bool,
        call: impl Future<Output = anyhow::Result<Decision>>,
    ) -> DecisionPayload {
        let started = Instant::now();
        let guarded = AssertUnwindSafe(call).catch_unwind();

        match tokio::time::timeout(self.request_timeout, guarded).await {
            Ok(Ok(Ok(decision))) => {
                self.metrics.observe_latency(started.elapsed());
                decision.build()
            }
            Ok(Ok(Err(e))) => {
                error!(
                    connection = %self.connection_id,
                    key = %key,
                    "Capability call failed: {}", e
                );
                self.metrics.record_error();
                if response_side {
                    Decision::allow().build()
                } else {
                    agent_error_payload(&e.to_string())
                }
            }
            Ok(Err(_panic)) => {
                error!(
                    connection = %self.connection_id,
                    key = %key,
                    "Capability call panicked"
                );
                self.metrics.record_error();
                if response_side {
                    Decision::allow().build()
                } else {
                    agent_error_payload("capability panicked")
                }
            }
            Err(_elapsed) => {
                warn!(
                    connection = %self.connection_id,
                    key = %key,
                    "Capability call exceeded {:?}", self.request_timeout
                );
                self.metrics.record_error();
                if self.store.remove_on_terminal(key).is_some() {
                    self.metrics.request_finished();
                }
                self.capability
                    .on_request_cancelled(key, Some(replies::TIMEOUT_BODY))
                    .await;
                if response_side {
                    Decision::allow().build()
                } else {
                    Decision::block()
                        .with_status(500)
                        .with_body(replies::TIMEOUT_BODY)
                        .build()
                }
            }
        }
    }

    fn finish(&self, key: RequestKey, payload: DecisionPayload) -> Outbound {
        self.metrics.record_decision(payload.decision());
        if let Some(audit) = &self.audit {
            audit.record(&self.connection_id, Some(&key), &payload);
        }
        Outbound { key, payload }
    }
}

fn agent_error_payload(message: &str) -> DecisionPayload {
    Decision::block()
        .with_status(500)
        .with_body(format!("Agent error: {}", message))
        .build()
}
