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

//! Domain error types.
//!
//! `ProtocolError` is fatal to one connection, never to the process.
//! `AgentError` covers resource failures at startup and steady state.

use thiserror::Error;

/// Errors that terminate a single connection
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Declared frame length was zero
    #[error("Frame length is zero")]
    EmptyFrame,

    /// Declared frame length exceeds the profile maximum
    #[error("Frame length {length} exceeds max {max}")]
    FrameTooLarge { length: usize, max: usize },

    /// Payload was not valid JSON for the expected record
    #[error("Undecodable JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body chunk carried data that is not valid standard base64
    #[error("Invalid base64 in body chunk: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// First frame matched neither wire profile
    #[error("Unrecognized first frame (leading byte {0:#04x})")]
    UnknownProfile(u8),

    /// A v2 peer sent something other than HandshakeReq before handshake completion
    #[error("Message before handshake completion (tag {0:#04x})")]
    MessageBeforeHandshake(u8),

    /// Handshake message seen after the handshake already completed
    #[error("Connection already performed its handshake")]
    DuplicateHandshake,

    /// Peer did not complete the handshake within the configured window
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Underlying socket failure
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-level resource errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// Could not bind the listener
    #[error("Failed to bind {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Listener was consumed by a previous `serve` call
    #[error("Server is already running or was shut down")]
    AlreadyServing,
}
