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

//! Legacy v1 wire profile.
//!
//! One request per connection, every event wrapped in an `AgentRequest`
//! envelope carrying `event_type`, every event answered with an
//! `AgentResponse`. Correlation is by string id.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::constants::protocol::VERSION_V1;
use crate::error::ProtocolError;
use crate::protocol::{
    AuditRecord, BodyChunk, BodyMutation, DecisionPayload, DecisionRecord, HeaderMap, HeaderOp,
    InboundEvent, RequestHeadersEvent, RequestKey,
};

/// v1 envelope for every inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub version: u32,
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Configure,
    RequestHeaders,
    RequestBodyChunk,
    ResponseHeaders,
    ResponseBodyChunk,
    RequestComplete,
    WebsocketFrame,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureEvent {
    pub agent_id: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestBodyChunkEvent {
    pub correlation_id: String,
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
pub struct ResponseHeadersEvent {
    pub correlation_id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBodyChunkEvent {
    pub correlation_id: String,
    pub data: String,
    #[serde(default)]
    pub is_last: bool,
    #[serde(default)]
    pub chunk_index: u64,
    #[serde(default)]
    pub bytes_sent: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestCompleteEvent {
    pub correlation_id: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub request_body_size: u64,
    #[serde(default)]
    pub response_body_size: u64,
    #[serde(default)]
    pub upstream_attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Only the correlation id matters for frames the core merely acknowledges.
#[derive(Debug, Clone, Deserialize)]
struct CorrelatedEvent {
    #[serde(default)]
    correlation_id: String,
}

/// v1 reply envelope. Empty collections and unset options are omitted,
/// matching the convention that null is never emitted for an unset field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub version: u32,
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

/// Decode one v1 frame payload into a normalized event.
pub fn decode_event(payload: &[u8]) -> Result<InboundEvent, ProtocolError> {
    let envelope: AgentRequest = serde_json::from_slice(payload)?;
    let event = match envelope.event_type {
        EventType::Configure => {
            let ev: ConfigureEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::Configure {
                agent_id: ev.agent_id,
                config: ev.config,
            }
        }
        EventType::RequestHeaders => {
            let ev: RequestHeadersEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::RequestHeaders {
                key: RequestKey::Correlation(ev.metadata.correlation_id.clone()),
                headers: ev,
                has_body: false,
            }
        }
        EventType::RequestBodyChunk => {
            let ev: RequestBodyChunkEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::RequestBodyChunk {
                key: RequestKey::Correlation(ev.correlation_id),
                chunk: BodyChunk {
                    data: BASE64.decode(ev.data.as_bytes())?,
                    is_last: ev.is_last,
                    chunk_index: ev.chunk_index,
                    total_size: ev.total_size,
                    bytes_seen: ev.bytes_received,
                },
            }
        }
        EventType::ResponseHeaders => {
            let ev: ResponseHeadersEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::ResponseHeaders {
                key: RequestKey::Correlation(ev.correlation_id),
                status: ev.status,
                headers: ev.headers,
                has_body: false,
            }
        }
        EventType::ResponseBodyChunk => {
            let ev: ResponseBodyChunkEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::ResponseBodyChunk {
                key: RequestKey::Correlation(ev.correlation_id),
                chunk: BodyChunk {
                    data: BASE64.decode(ev.data.as_bytes())?,
                    is_last: ev.is_last,
                    chunk_index: ev.chunk_index,
                    total_size: None,
                    bytes_seen: ev.bytes_sent,
                },
            }
        }
        EventType::RequestComplete => {
            let ev: RequestCompleteEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::RequestComplete {
                key: RequestKey::Correlation(ev.correlation_id),
                status: ev.status,
                duration_ms: ev.duration_ms,
            }
        }
        EventType::WebsocketFrame => {
            let ev: CorrelatedEvent = serde_json::from_value(envelope.payload)?;
            InboundEvent::WebSocketFrame {
                key: RequestKey::Correlation(ev.correlation_id),
            }
        }
    };
    Ok(event)
}

/// Encode a decision payload as an `AgentResponse` JSON body.
pub fn encode_response(payload: &DecisionPayload) -> Result<Vec<u8>, ProtocolError> {
    let response = AgentResponse {
        version: VERSION_V1,
        decision: payload.decision().clone(),
        request_headers: payload.request_headers.clone(),
        response_headers: payload.response_headers.clone(),
        needs_more: payload.needs_more,
        audit: payload.audit.clone(),
        routing_metadata: payload.routing_metadata.clone(),
        request_body_mutation: payload.request_body_mutation.clone(),
        response_body_mutation: payload.response_body_mutation.clone(),
    };
    Ok(serde_json::to_vec(&response)?)
}
