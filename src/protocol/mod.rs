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

//! On-wire protocol schema.
//!
//! Records shared by both wire profiles, plus the normalized `InboundEvent`
//! the dispatcher consumes. Serialization conventions: optional fields are
//! omitted rather than set to null, unknown fields are ignored, enum values
//! are lowercase snake_case.

pub mod profile;
pub mod v1;
pub mod v2;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Header multimap as carried on the wire: name -> values.
/// Names are case-preserving; lookup is case-insensitive (see `header_get`).
pub type HeaderMap = HashMap<String, Vec<String>>;

/// Case-insensitive first-value lookup into a [`HeaderMap`].
pub fn header_get<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, vs)| vs.first())
        .map(String::as_str)
}

/// All values for a header name, case-insensitive.
pub fn header_get_all<'a>(headers: &'a HeaderMap, name: &str) -> Vec<&'a str> {
    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .flat_map(|(_, vs)| vs.iter().map(String::as_str))
        .collect()
}

/// Identifier correlating all events of one in-flight request.
///
/// Profile v1 uses a string correlation id; profile v2 a 64-bit request id.
/// Unique over any overlap window on a given connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKey {
    Correlation(String),
    Id(u64),
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Correlation(c) => write!(f, "{}", c),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Connection metadata attached to a request-headers event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub client_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

/// Request-headers snapshot shared by both profiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestHeadersEvent {
    #[serde(default)]
    pub metadata: RequestMetadata,
    pub method: String,
    pub uri: String,
    #[serde(default)]
    pub headers: HeaderMap,
}

/// A decoded body chunk. `data` has already passed base64 decoding;
/// a decode failure upstream of this struct terminates the connection.
#[derive(Debug, Clone)]
pub struct BodyChunk {
    pub data: Vec<u8>,
    pub is_last: bool,
    pub chunk_index: u64,
    pub total_size: Option<u64>,
    pub bytes_seen: u64,
}

/// Header mutation instruction emitted with a decision.
///
/// Serialized externally tagged with snake_case variant names:
/// `{"set":{"name":...,"value":...}}`, `{"remove":{"name":...}}`.
/// Name matching on the peer side is case-insensitive; storage here is
/// case-preserving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderOp {
    Set { name: String, value: String },
    Add { name: String, value: String },
    Remove { name: String },
}

/// Body mutation instruction for one chunk.
///
/// `data` absent => pass-through; `data == ""` => drop the chunk;
/// otherwise replace the chunk with the base64 payload. A decision that
/// requests no mutation omits the mutation field entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyMutation {
    pub chunk_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl BodyMutation {
    pub fn pass_through(chunk_index: u64) -> Self {
        Self {
            chunk_index,
            data: None,
        }
    }

    pub fn drop_chunk(chunk_index: u64) -> Self {
        Self {
            chunk_index,
            data: Some(String::new()),
        }
    }

    pub fn replace(chunk_index: u64, data: impl Into<String>) -> Self {
        Self {
            chunk_index,
            data: Some(data.into()),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        self.data.is_none()
    }
}

/// Audit metadata attached to a decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
}

impl AuditRecord {
    /// An audit record is omitted from the wire iff everything is empty
    /// and no confidence was supplied.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.rule_ids.is_empty()
            && self.reason_codes.is_empty()
            && self.custom.is_empty()
            && self.confidence.is_none()
    }
}

/// The decision variant as serialized on the wire, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionRecord {
    Allow,
    Block {
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },
    Redirect {
        url: String,
        status: u16,
    },
    Challenge {
        challenge_type: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

impl DecisionRecord {
    /// Short name used in logs and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block { .. } => "block",
            Self::Redirect { .. } => "redirect",
            Self::Challenge { .. } => "challenge",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A fully resolved decision ready for profile-specific encoding.
///
/// Produced by `Decision::build`; lowering to the v1 envelope or a v2
/// `DecisionMessage` happens in the profile layer.
#[derive(Debug, Clone, Default)]
pub struct DecisionPayload {
    pub decision: Option<DecisionRecord>,
    pub request_headers: Vec<HeaderOp>,
    pub response_headers: Vec<HeaderOp>,
    pub needs_more: bool,
    pub audit: Option<AuditRecord>,
    pub routing_metadata: BTreeMap<String, String>,
    pub request_body_mutation: Option<BodyMutation>,
    pub response_body_mutation: Option<BodyMutation>,
}

impl DecisionPayload {
    pub fn decision(&self) -> &DecisionRecord {
        self.decision.as_ref().unwrap_or(&DecisionRecord::Allow)
    }
}

/// Inbound event in profile-neutral form, as handed to the dispatcher.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// v1 only: out-of-band agent configuration
    Configure { agent_id: String, config: Value },
    RequestHeaders {
        key: RequestKey,
        headers: RequestHeadersEvent,
        has_body: bool,
    },
    RequestBodyChunk {
        key: RequestKey,
        chunk: BodyChunk,
    },
    ResponseHeaders {
        key: RequestKey,
        status: u16,
        headers: HeaderMap,
        has_body: bool,
    },
    ResponseBodyChunk {
        key: RequestKey,
        chunk: BodyChunk,
    },
    /// v1 only: terminal summary for one request
    RequestComplete {
        key: RequestKey,
        status: u16,
        duration_ms: u64,
    },
    /// v1 only: acknowledged without a capability hook
    WebSocketFrame { key: RequestKey },
    CancelRequest {
        key: RequestKey,
        reason: Option<String>,
    },
    CancelAll { reason: Option<String> },
    Ping,
    Pong,
    /// v2 frame with an unrecognized type tag; logged and skipped
    Unknown { tag: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_is_case_insensitive_and_preserving() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["application/json".to_string()],
        );
        assert_eq!(header_get(&headers, "content-type"), Some("application/json"));
        assert_eq!(header_get(&headers, "CONTENT-TYPE"), Some("application/json"));
        assert!(headers.contains_key("Content-Type")); // storage untouched
        assert_eq!(header_get(&headers, "accept"), None);
    }

    #[test]
    fn header_op_wire_shape() {
        let set = serde_json::to_value(HeaderOp::Set {
            name: "X-Verdict".to_string(),
            value: "clean".to_string(),
        })
        .unwrap();
        assert_eq!(set, json!({"set": {"name": "X-Verdict", "value": "clean"}}));

        let remove = serde_json::to_value(HeaderOp::Remove {
            name: "Server".to_string(),
        })
        .unwrap();
        assert_eq!(remove, json!({"remove": {"name": "Server"}}));
    }

    #[test]
    fn body_mutation_pass_through_omits_data() {
        let v = serde_json::to_value(BodyMutation::pass_through(3)).unwrap();
        assert_eq!(v, json!({"chunk_index": 3}));

        let v = serde_json::to_value(BodyMutation::drop_chunk(0)).unwrap();
        assert_eq!(v, json!({"chunk_index": 0, "data": ""}));
    }

    #[test]
    fn decision_record_tagging() {
        let block = DecisionRecord::Block {
            status: 403,
            body: Some("nope".to_string()),
            headers: None,
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "block", "status": 403, "body": "nope"})
        );

        let allow: DecisionRecord = serde_json::from_value(json!({"type": "allow"})).unwrap();
        assert!(allow.is_allow());
    }

    #[test]
    fn audit_record_emptiness() {
        assert!(AuditRecord::default().is_empty());
        let with_conf = AuditRecord {
            confidence: Some(0.5),
            ..Default::default()
        };
        assert!(!with_conf.is_empty());
    }

    #[test]
    fn metadata_ignores_unknown_fields() {
        let meta: RequestMetadata = serde_json::from_value(json!({
            "correlation_id": "c1",
            "client_ip": "10.0.0.1",
            "client_port": 4431,
            "protocol": "HTTP/1.1",
            "timestamp": 1.0,
            "some_future_field": {"nested": true}
        }))
        .unwrap();
        assert_eq!(meta.correlation_id, "c1");
        assert_eq!(meta.request_id, None);
    }
}
