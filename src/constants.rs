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

//! edgeguard constants - Single source of truth for all configuration values.
//!
//! This module centralizes wire limits, protocol version numbers, and
//! environment variable names to ensure consistency and maintainability.

/// Protocol version numbers
pub mod protocol {
    /// Legacy single-request-per-connection profile
    pub const VERSION_V1: u32 = 1;
    /// Multiplexed profile with handshake and per-request ids
    pub const VERSION_V2: u32 = 2;
    /// Wire encoding advertised in the handshake response
    pub const ENCODING_JSON: &str = "json";
}

/// Transport limits (DoS protection)
pub mod limits {
    /// Maximum v1 frame payload (length prefix value)
    pub const MAX_V1_PAYLOAD: usize = 10 * 1024 * 1024;
    /// Maximum v2 JSON body (payload minus the tag byte) over UDS
    pub const MAX_V2_JSON_UDS: usize = 16 * 1024 * 1024 - 1;
    /// Maximum v2 JSON body (payload minus the tag byte) over TCP
    pub const MAX_V2_JSON_TCP: usize = 10 * 1024 * 1024;
    /// Samples retained in the latency window for avg/p99
    pub const LATENCY_WINDOW: usize = 1024;
}

/// Default configuration values
pub mod defaults {
    /// Default UDS socket path
    pub const SOCKET_PATH: &str = "/tmp/edgeguard.sock";
    /// Default TCP bind host
    pub const HOST: &str = "127.0.0.1";
    /// Default TCP bind port
    pub const PORT: u16 = 9090;
    /// Upper bound on a single capability call, in milliseconds
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
    /// Handshake read timeout, in milliseconds
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
    /// Drain grace period passed to the capability, in milliseconds
    pub const DRAIN_TIMEOUT_MS: u64 = 30_000;
    /// Maximum simultaneously open connections
    pub const MAX_CONNECTIONS: usize = 64;
    /// Keep-alive probe interval, in milliseconds
    pub const KEEP_ALIVE_INTERVAL_MS: u64 = 30_000;
    /// Default log filter
    pub const LOG_LEVEL: &str = "info";
    /// Agent name used when neither the capability nor the config names one
    pub const AGENT_NAME: &str = "demo";
}

/// Configuration environment variables
pub mod env {
    pub const TRANSPORT: &str = "EDGEGUARD_TRANSPORT";
    pub const SOCKET: &str = "EDGEGUARD_SOCKET";
    pub const HOST: &str = "EDGEGUARD_HOST";
    pub const PORT: &str = "EDGEGUARD_PORT";
    pub const REQUEST_TIMEOUT_MS: &str = "EDGEGUARD_REQUEST_TIMEOUT_MS";
    pub const HANDSHAKE_TIMEOUT_MS: &str = "EDGEGUARD_HANDSHAKE_TIMEOUT_MS";
    pub const DRAIN_TIMEOUT_MS: &str = "EDGEGUARD_DRAIN_TIMEOUT_MS";
    pub const MAX_CONNECTIONS: &str = "EDGEGUARD_MAX_CONNECTIONS";
    pub const KEEP_ALIVE: &str = "EDGEGUARD_KEEP_ALIVE";
    pub const KEEP_ALIVE_INTERVAL_MS: &str = "EDGEGUARD_KEEP_ALIVE_INTERVAL_MS";
    pub const LOG_LEVEL: &str = "EDGEGUARD_LOG_LEVEL";
    pub const JSON_LOGS: &str = "EDGEGUARD_JSON_LOGS";
    pub const AGENT_NAME: &str = "EDGEGUARD_AGENT_NAME";
    pub const AUDIT_LOG: &str = "EDGEGUARD_AUDIT_LOG";
}

/// Canonical reply bodies
pub mod replies {
    /// Body of the Block reply while draining
    pub const DRAINING_BODY: &str = "Agent is draining";
    /// Body of the Block reply when a capability call times out
    pub const TIMEOUT_BODY: &str = "Agent timeout";
    /// Body used when lowering a Challenge onto the v2 wire
    pub const CHALLENGE_LOWERED_BODY: &str = "Challenge required";
    /// Reason handed to `on_all_requests_cancelled` during shutdown
    pub const SHUTDOWN_REASON: &str = "Agent shutdown";
}
