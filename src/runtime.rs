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

//! Agent server runtime.
//!
//! Owns the listener, the accept loop, and the drain/shutdown lifecycle.
//! One task per accepted connection; a hung capability call stalls only its
//! own connection. Drain and shutdown entry are serialized under a single
//! lifecycle mutex; shutdown is idempotent.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audit::AuditLog;
use crate::capability::{HealthStatus, InspectionCapability, MetricsReport};
use crate::config::AgentConfig;
use crate::constants::replies;
use crate::context::RequestStore;
use crate::error::AgentError;
use crate::metrics::Metrics;
use crate::transport::connection::serve_connection;
use crate::transport::listener::{AgentListener, AgentStream};

/// State shared between the accept loop, connections, and lifecycle calls.
pub struct ServerShared {
    pub draining: Arc<AtomicBool>,
    pub metrics: Arc<Metrics>,
    pub audit: Option<Arc<AuditLog>>,
    stores: DashMap<String, Arc<RequestStore>>,
    active_connections: AtomicUsize,
}

impl ServerShared {
    fn new(audit: Option<Arc<AuditLog>>) -> Self {
        Self {
            draining: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(Metrics::new()),
            audit,
            stores: DashMap::new(),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn register_store(&self, connection_id: &str, store: Arc<RequestStore>) {
        self.stores.insert(connection_id.to_string(), store);
    }

    pub fn unregister_store(&self, connection_id: &str) {
        self.stores.remove(connection_id);
    }

    /// Drop every context on every connection; returns how many died.
    fn cancel_all_contexts(&self) -> usize {
        let mut dropped = 0;
        for entry in self.stores.iter() {
            dropped += entry.value().clear_all();
        }
        dropped
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

/// The agent-side protocol runtime.
///
/// `bind` eagerly claims the transport so resource errors surface at
/// startup; `serve` runs the accept loop until `shutdown` is called.
pub struct AgentServer<C> {
    config: AgentConfig,
    capability: Arc<C>,
    shared: Arc<ServerShared>,
    token: CancellationToken,
    listener: Arc<std::sync::Mutex<Option<AgentListener>>>,
    lifecycle: Arc<Mutex<()>>,
    shut_down: Arc<AtomicBool>,
}

impl<C> Clone for AgentServer<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            capability: self.capability.clone(),
            shared: self.shared.clone(),
            token: self.token.clone(),
            listener: self.listener.clone(),
            lifecycle: self.lifecycle.clone(),
            shut_down: self.shut_down.clone(),
        }
    }
}

impl<C: InspectionCapability> AgentServer<C> {
    pub async fn bind(config: AgentConfig, capability: C) -> Result<Self, AgentError> {
        let audit = match &config.audit_log_path {
            Some(path) => match AuditLog::open(path) {
                Ok(log) => Some(Arc::new(log)),
                Err(e) => {
                    error!("Audit log disabled, cannot open {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        let listener = AgentListener::bind(&config).await?;
        info!("Agent listening on {}", config.bind_target());

        Ok(Self {
            config,
            capability: Arc::new(capability),
            shared: Arc::new(ServerShared::new(audit)),
            token: CancellationToken::new(),
            listener: Arc::new(std::sync::Mutex::new(Some(listener))),
            lifecycle: Arc::new(Mutex::new(())),
            shut_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Accept loop. Returns once `shutdown` cancels the runtime.
    pub async fn serve(&self) -> Result<(), AgentError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(AgentError::AlreadyServing)?;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        // back off briefly so a hot error loop cannot
                        // starve the runtime
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        listener.cleanup();
        info!("Listener closed");
        Ok(())
    }

    fn admit(&self, stream: AgentStream, peer: String) {
        if self.shared.draining.load(Ordering::SeqCst) {
            debug!("Rejecting connection from {} while draining", peer);
            return; // dropping the stream closes it
        }
        let active = self.shared.active_connections.load(Ordering::SeqCst);
        if active >= self.config.max_connections {
            debug!(
                "Rejecting connection from {}: at capacity ({})",
                peer, self.config.max_connections
            );
            return;
        }

        self.shared
            .active_connections
            .fetch_add(1, Ordering::SeqCst);
        let config = self.config.clone();
        let capability = self.capability.clone();
        let shared = self.shared.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            match stream {
                #[cfg(unix)]
                AgentStream::Uds(io) => {
                    serve_connection(io, peer, config, capability, shared.clone(), token).await;
                }
                AgentStream::Tcp(io) => {
                    serve_connection(io, peer, config, capability, shared.clone(), token).await;
                }
            }
            shared.active_connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Stop taking new work; let in-progress requests finish.
    pub async fn drain(&self) {
        let _guard = self.lifecycle.lock().await;
        self.enter_drain().await;
    }

    async fn enter_drain(&self) {
        if self.shared.draining.swap(true, Ordering::SeqCst) {
            return; // already draining
        }
        info!("Drain entered: refusing new connections and requests");
        self.capability
            .on_drain(self.config.drain_timeout.as_millis() as u64)
            .await;
    }

    /// Drain, cancel in-flight work, and stop the runtime. Idempotent: a
    /// second call only logs.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.shut_down.swap(true, Ordering::SeqCst) {
            info!("Shutdown already performed");
            return;
        }

        self.enter_drain().await;

        let dropped = self.shared.cancel_all_contexts();
        if dropped > 0 {
            info!("Cancelled {} in-flight requests", dropped);
        }
        self.shared.metrics.requests_finished(dropped as u64);
        self.capability
            .on_all_requests_cancelled(Some(replies::SHUTDOWN_REASON))
            .await;
        self.capability.on_shutdown().await;

        self.token.cancel();
        info!("Shutdown complete");
    }

    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthStatus {
        self.capability.health()
    }

    pub fn metrics_report(&self) -> MetricsReport {
        self.shared.metrics.report(self.capability.custom_metrics())
    }

    /// Fires when `shutdown` has been requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DefaultCapability;
    use crate::config::TransportKind;

    fn tcp_config() -> AgentConfig {
        AgentConfig {
            transport: TransportKind::Grpc,
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bind_error_surfaces_at_startup() {
        let config = AgentConfig {
            transport: TransportKind::Grpc,
            host: "203.0.113.1".to_string(),
            port: 1,
            ..Default::default()
        };
        assert!(AgentServer::bind(config, DefaultCapability).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let server = AgentServer::bind(tcp_config(), DefaultCapability)
            .await
            .unwrap();
        server.shutdown().await;
        assert!(server.is_draining());
        server.shutdown().await; // second call is a no-op beyond logging
        assert!(server.is_draining());
    }

    #[tokio::test]
    async fn serve_twice_is_refused() {
        let server = AgentServer::bind(tcp_config(), DefaultCapability)
            .await
            .unwrap();
        let runner = server.clone();
        let task = tokio::spawn(async move { runner.serve().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            server.serve().await,
            Err(AgentError::AlreadyServing)
        ));

        server.shutdown().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drain_then_shutdown_runs_on_drain_once() {
        use async_trait::async_trait;
        use std::sync::atomic::AtomicUsize;

        #[derive(Default)]
        struct CountingCapability {
            drains: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl InspectionCapability for CountingCapability {
            async fn on_drain(&self, _timeout_ms: u64) {
                self.drains.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drains = Arc::new(AtomicUsize::new(0));
        let server = AgentServer::bind(
            tcp_config(),
            CountingCapability {
                drains: drains.clone(),
            },
        )
        .await
        .unwrap();

        server.drain().await;
        server.shutdown().await;
        assert_eq!(drains.load(Ordering::SeqCst), 1);
    }
}
