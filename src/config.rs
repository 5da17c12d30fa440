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

//! Agent configuration.
//!
//! Built from environment variables; the launcher overlays CLI flags on
//! top. Unparseable values fall back to defaults with a warning rather than
//! aborting startup.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::constants::{defaults, env as env_keys};

/// Millisecond representation for durations in config dumps.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Unix domain socket
    Uds,
    /// TCP socket speaking the gRPC-simulated profile; `tcp` is an alias
    #[value(alias = "tcp")]
    Grpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub transport: TransportKind,
    pub socket_path: PathBuf,
    pub host: String,
    pub port: u16,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub drain_timeout: Duration,
    pub max_connections: usize,
    pub enable_keep_alive: bool,
    #[serde(with = "duration_ms")]
    pub keep_alive_interval: Duration,
    pub log_level: String,
    pub json_logs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Uds,
            socket_path: PathBuf::from(defaults::SOCKET_PATH),
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            request_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(defaults::HANDSHAKE_TIMEOUT_MS),
            drain_timeout: Duration::from_millis(defaults::DRAIN_TIMEOUT_MS),
            max_connections: defaults::MAX_CONNECTIONS,
            enable_keep_alive: true,
            keep_alive_interval: Duration::from_millis(defaults::KEEP_ALIVE_INTERVAL_MS),
            log_level: defaults::LOG_LEVEL.to_string(),
            json_logs: false,
            agent_name_override: None,
            audit_log_path: None,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            transport: env::var(env_keys::TRANSPORT)
                .ok()
                .map(|v| parse_transport(&v))
                .unwrap_or(base.transport),
            socket_path: env::var(env_keys::SOCKET)
                .map(PathBuf::from)
                .unwrap_or(base.socket_path),
            host: env::var(env_keys::HOST).unwrap_or(base.host),
            port: parse_or(env_keys::PORT, base.port),
            request_timeout: Duration::from_millis(parse_or(
                env_keys::REQUEST_TIMEOUT_MS,
                defaults::REQUEST_TIMEOUT_MS,
            )),
            handshake_timeout: Duration::from_millis(parse_or(
                env_keys::HANDSHAKE_TIMEOUT_MS,
                defaults::HANDSHAKE_TIMEOUT_MS,
            )),
            drain_timeout: Duration::from_millis(parse_or(
                env_keys::DRAIN_TIMEOUT_MS,
                defaults::DRAIN_TIMEOUT_MS,
            )),
            max_connections: parse_or(env_keys::MAX_CONNECTIONS, defaults::MAX_CONNECTIONS),
            enable_keep_alive: env::var(env_keys::KEEP_ALIVE)
                .map(|v| is_truthy(&v))
                .unwrap_or(true),
            keep_alive_interval: Duration::from_millis(parse_or(
                env_keys::KEEP_ALIVE_INTERVAL_MS,
                defaults::KEEP_ALIVE_INTERVAL_MS,
            )),
            log_level: env::var(env_keys::LOG_LEVEL).unwrap_or(base.log_level),
            json_logs: env::var(env_keys::JSON_LOGS)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            agent_name_override: env::var(env_keys::AGENT_NAME).ok(),
            audit_log_path: env::var(env_keys::AUDIT_LOG).ok().map(PathBuf::from),
        }
    }

    /// Bind target for logs and errors.
    pub fn bind_target(&self) -> String {
        match self.transport {
            TransportKind::Uds => self.socket_path.display().to_string(),
            TransportKind::Grpc => format!("{}:{}", self.host, self.port),
        }
    }
}

fn parse_transport(value: &str) -> TransportKind {
    match value.to_lowercase().as_str() {
        "uds" => TransportKind::Uds,
        "grpc" | "tcp" => TransportKind::Grpc,
        other => {
            warn!("Unknown transport '{}', using uds", other);
            TransportKind::Uds
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Unparseable value for {}, using default", key);
            default
        }),
        Err(_) => default,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.transport, TransportKind::Uds);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert!(config.enable_keep_alive);
        assert!(config.agent_name_override.is_none());
    }

    #[test]
    fn transport_aliases() {
        assert_eq!(parse_transport("tcp"), TransportKind::Grpc);
        assert_eq!(parse_transport("grpc"), TransportKind::Grpc);
        assert_eq!(parse_transport("UDS"), TransportKind::Uds);
        assert_eq!(parse_transport("carrier-pigeon"), TransportKind::Uds);
    }

    #[test]
    fn config_dump_uses_milliseconds() {
        let v = serde_json::to_value(AgentConfig::default()).unwrap();
        assert_eq!(v["request_timeout"], 30_000);
        assert_eq!(v["handshake_timeout"], 10_000);
        assert!(v.get("agent_name_override").is_none());
    }

    #[test]
    fn bind_target_by_transport() {
        let mut config = AgentConfig::default();
        assert_eq!(config.bind_target(), defaults::SOCKET_PATH);
        config.transport = TransportKind::Grpc;
        assert_eq!(config.bind_target(), "127.0.0.1:9090");
    }
}
