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

//! Multiplexed v2 wire profile.
//!
//! Frames carry a one-byte type tag ahead of the JSON body. Requests are
//! correlated by a 64-bit id, many may be in flight per connection, and the
//! connection opens with a handshake exchange. Unknown type tags are
//! skipped, not fatal.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::capability::Capabilities;
use crate::constants::replies;
use crate::error::ProtocolError;
use crate::protocol::{
    AuditRecord, BodyChunk, BodyMutation, DecisionPayload, DecisionRecord, HeaderMap, HeaderOp,
    InboundEvent, RequestHeadersEvent, RequestKey, RequestMetadata,
};

/// Frame type tags.
pub mod tags {
    pub const HANDSHAKE_REQ: u8 = 0x01;
    pub const HANDSHAKE_RESP: u8 = 0x02;
    pub const REQUEST_HEADERS: u8 = 0x10;
    pub const REQUEST_BODY_CHUNK: u8 = 0x11;
    pub const RESPONSE_HEADERS: u8 = 0x12;
    pub const RESPONSE_BODY_CHUNK: u8 = 0x13;
    pub const DECISION: u8 = 0x20;
    pub const BODY_MUTATION: u8 = 0x21;
    pub const CANCEL_REQUEST: u8 = 0x30;
    pub const CANCEL_ALL: u8 = 0x31;
    pub const PING: u8 = 0xF0;
    pub const PONG: u8 = 0xF1;
}

fn default_encodings() -> Vec<String> {
    vec![crate::constants::protocol::ENCODING_JSON.to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol_version: u32,
    pub client_name: String,
    #[serde(default)]
    pub supported_features: Vec<String>,
    #[serde(default = "default_encodings")]
    pub supported_encodings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub protocol_version: u32,
    pub agent_name: String,
    pub capabilities: Capabilities,
    pub encoding: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestHeadersV2 {
    pub request_id: u64,
    #[serde(default)]
    pub has_body: bool,
    #[serde(default)]
    pub metadata: RequestMetadata,
    pub method: String,
    pub uri: String,
    #[serde(default)]
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestBodyChunkV2 {
    pub request_id: u64,
    pub data: String,
    #[serde(default)]
    pub is_last: bool,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default)]
    pub chunk_index: u64,
    #[serde(default)]
    pub bytes_received: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseHeadersV2 {
    pub request_id: u64,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub has_body: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBodyChunkV2 {
    pub request_id: u64,
    pub data: String,
    #[serde(default)]
    pub is_last: bool,
    #[serde(default)]
    pub chunk_index: u64,
    #[serde(default)]
    pub bytes_sent: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequestMessage {
    pub request_id: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAllMessage {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outbound decision frame, tag 0x20.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub request_id: u64,
    pub decision: DecisionRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_headers: Vec<HeaderOp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_headers: Vec<HeaderOp>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routing_metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_mutation: Option<BodyMutation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_mutation: Option<BodyMutation>,
}

/// Parse the handshake request from the first frame's payload.
pub fn decode_handshake(payload: &[u8]) -> Result<HandshakeRequest, ProtocolError> {
    let (tag, body) = split_tag(payload)?;
    if tag != tags::HANDSHAKE_REQ {
        return Err(ProtocolError::MessageBeforeHandshake(tag));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Decode one post-handshake v2 frame payload into a normalized event.
pub fn decode_event(payload: &[u8]) -> Result<InboundEvent, ProtocolError> {
    let (tag, body) = split_tag(payload)?;
    let event = match tag {
        tags::HANDSHAKE_REQ | tags::HANDSHAKE_RESP => {
            return Err(ProtocolError::DuplicateHandshake)
        }
        tags::REQUEST_HEADERS => {
            let ev: RequestHeadersV2 = serde_json::from_slice(body)?;
            InboundEvent::RequestHeaders {
                key: RequestKey::Id(ev.request_id),
                has_body: ev.has_body,
                headers: RequestHeadersEvent {
                    metadata: ev.metadata,
                    method: ev.method,
                    uri: ev.uri,
                    headers: ev.headers,
                },
            }
        }
        tags::REQUEST_BODY_CHUNK => {
            let ev: RequestBodyChunkV2 = serde_json::from_slice(body)?;
            InboundEvent::RequestBodyChunk {
                key: RequestKey::Id(ev.request_id),
                chunk: BodyChunk {
                    data: BASE64.decode(ev.data.as_bytes())?,
                    is_last: ev.is_last,
                    chunk_index: ev.chunk_index,
                    total_size: ev.total_size,
                    bytes_seen: ev.bytes_received,
                },
            }
        }
        tags::RESPONSE_HEADERS => {
            let ev: ResponseHeadersV2 = serde_json::from_slice(body)?;
            InboundEvent::ResponseHeaders {
                key: RequestKey::Id(ev.request_id),
                status: ev.status_code,
                headers: ev.headers,
                has_body: ev.has_body,
            }
        }
        tags::RESPONSE_BODY_CHUNK => {
            let ev: ResponseBodyChunkV2 = serde_json::from_slice(body)?;
            InboundEvent::ResponseBodyChunk {
                key: RequestKey::Id(ev.request_id),
                chunk: BodyChunk {
                    data: BASE64.decode(ev.data.as_bytes())?,
                    is_last: ev.is_last,
                    chunk_index: ev.chunk_index,
                    total_size: None,
                    bytes_seen: ev.bytes_sent,
                },
            }
        }
        tags::CANCEL_REQUEST => {
            let ev: CancelRequestMessage = serde_json::from_slice(body)?;
            InboundEvent::CancelRequest {
                key: RequestKey::Id(ev.request_id),
                reason: ev.reason,
            }
        }
        tags::CANCEL_ALL => {
            let ev: CancelAllMessage = serde_json::from_slice(body)?;
            InboundEvent::CancelAll { reason: ev.reason }
        }
        tags::PING => InboundEvent::Ping,
        tags::PONG => InboundEvent::Pong,
        other => InboundEvent::Unknown { tag: other },
    };
    Ok(event)
}

/// Encode a decision payload as a `DecisionMessage` JSON body.
///
/// v2 has no challenge decision; Challenge is lowered to a 403 Block here.
pub fn encode_decision(
    request_id: u64,
    payload: &DecisionPayload,
) -> Result<Vec<u8>, ProtocolError> {
    let decision = match payload.decision() {
        DecisionRecord::Challenge { .. } => DecisionRecord::Block {
            status: 403,
            body: Some(replies::CHALLENGE_LOWERED_BODY.to_string()),
            headers: None,
        },
        other => other.clone(),
    };
    let message = DecisionMessage {
        request_id,
        decision,
        request_headers: payload.request_headers.clone(),
        response_headers: payload.response_headers.clone(),
        needs_more: payload.needs_more,
        audit: payload.audit.clone(),
        routing_metadata: payload.routing_metadata.clone(),
        request_body_mutation: payload.request_body_mutation.clone(),
        response_body_mutation: payload.response_body_mutation.clone(),
    };
    Ok(serde_json::to_vec(&message)?)
}

fn split_tag(payload: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    match payload.split_first() {
        Some((tag, body)) => Ok((*tag, body)),
        None => Err(ProtocolError::EmptyFrame),
    }
}
