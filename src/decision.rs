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

//! Decision accumulator.
//!
//! A plain record with chainable helpers; `build` resolves defaults and
//! produces the wire-ready [`DecisionPayload`]. Exactly one verdict variant
//! is emitted; setting a new verdict replaces the previous one, all other
//! accumulated state survives the switch.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::protocol::{
    AuditRecord, BodyMutation, DecisionPayload, DecisionRecord, HeaderOp,
};

#[derive(Debug, Clone)]
enum Verdict {
    Allow,
    Block {
        status: Option<u16>,
        body: Option<String>,
        headers: BTreeMap<String, String>,
    },
    Redirect {
        url: Option<String>,
        status: Option<u16>,
    },
    Challenge {
        challenge_type: String,
        params: Value,
    },
}

/// Builder for the agent's verdict on one event.
#[derive(Debug, Clone)]
pub struct Decision {
    verdict: Verdict,
    request_header_ops: Vec<HeaderOp>,
    response_header_ops: Vec<HeaderOp>,
    needs_more: bool,
    request_body_mutation: Option<BodyMutation>,
    response_body_mutation: Option<BodyMutation>,
    tags: Vec<String>,
    rule_ids: Vec<String>,
    reason_codes: Vec<String>,
    confidence: Option<f64>,
    custom: BTreeMap<String, Value>,
    routing_metadata: BTreeMap<String, String>,
}

impl Decision {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            request_header_ops: Vec::new(),
            response_header_ops: Vec::new(),
            needs_more: false,
            request_body_mutation: None,
            response_body_mutation: None,
            tags: Vec::new(),
            rule_ids: Vec::new(),
            reason_codes: Vec::new(),
            confidence: None,
            custom: BTreeMap::new(),
            routing_metadata: BTreeMap::new(),
        }
    }

    /// Let the event through unchanged.
    pub fn allow() -> Self {
        Self::new(Verdict::Allow)
    }

    /// Block with the default 403 status.
    pub fn block() -> Self {
        Self::allow().into_block()
    }

    /// Alias for [`Decision::block`].
    pub fn deny() -> Self {
        Self::block()
    }

    /// Redirect to `url` with the default 302 status.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::allow().into_redirect(url)
    }

    /// Demand a challenge of the given kind (lowered to a 403 Block on v2).
    pub fn challenge(challenge_type: impl Into<String>) -> Self {
        Self::allow().into_challenge(challenge_type)
    }

    /// Switch the verdict to Allow. The last verdict set wins; header ops,
    /// audit fields, and routing metadata accumulated so far are kept.
    pub fn into_allow(mut self) -> Self {
        self.verdict = Verdict::Allow;
        self
    }

    /// Switch the verdict to a Block with the default 403 status.
    pub fn into_block(mut self) -> Self {
        self.verdict = Verdict::Block {
            status: None,
            body: None,
            headers: BTreeMap::new(),
        };
        self
    }

    /// Switch the verdict to a Redirect with the default 302 status.
    pub fn into_redirect(mut self, url: impl Into<String>) -> Self {
        self.verdict = Verdict::Redirect {
            url: Some(url.into()),
            status: None,
        };
        self
    }

    /// Switch the verdict to a Challenge of the given kind.
    pub fn into_challenge(mut self, challenge_type: impl Into<String>) -> Self {
        self.verdict = Verdict::Challenge {
            challenge_type: challenge_type.into(),
            params: Value::Null,
        };
        self
    }

    /// Status code for a Block or Redirect verdict; ignored for others.
    pub fn with_status(mut self, status: u16) -> Self {
        match &mut self.verdict {
            Verdict::Block { status: s, .. } => *s = Some(status),
            Verdict::Redirect { status: s, .. } => *s = Some(status),
            _ => {}
        }
        self
    }

    /// Response body for a Block verdict; ignored for others.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        if let Verdict::Block { body: b, .. } = &mut self.verdict {
            *b = Some(body.into());
        }
        self
    }

    /// Extra response header sent with a Block verdict; ignored for others.
    pub fn with_block_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Verdict::Block { headers, .. } = &mut self.verdict {
            headers.insert(name.into(), value.into());
        }
        self
    }

    /// Challenge parameters; ignored for other verdicts.
    pub fn with_challenge_params(mut self, params: Value) -> Self {
        if let Verdict::Challenge { params: p, .. } = &mut self.verdict {
            *p = params;
        }
        self
    }

    pub fn set_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.request_header_ops.push(HeaderOp::Set {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn add_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.request_header_ops.push(HeaderOp::Add {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn remove_request_header(mut self, name: impl Into<String>) -> Self {
        self.request_header_ops
            .push(HeaderOp::Remove { name: name.into() });
        self
    }

    pub fn set_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_header_ops.push(HeaderOp::Set {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn add_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_header_ops.push(HeaderOp::Add {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn remove_response_header(mut self, name: impl Into<String>) -> Self {
        self.response_header_ops
            .push(HeaderOp::Remove { name: name.into() });
        self
    }

    /// Ask the peer to keep streaming body chunks before a final verdict.
    pub fn needs_more(mut self) -> Self {
        self.needs_more = true;
        self
    }

    pub fn mutate_request_body(mut self, mutation: BodyMutation) -> Self {
        self.request_body_mutation = Some(mutation);
        self
    }

    pub fn mutate_response_body(mut self, mutation: BodyMutation) -> Self {
        self.response_body_mutation = Some(mutation);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_ids.push(rule_id.into());
        self
    }

    pub fn with_reason_code(mut self, code: impl Into<String>) -> Self {
        self.reason_codes.push(code.into());
        self
    }

    /// Confidence in [0.0, 1.0]; out-of-range values are clamped at build.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_audit_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }

    pub fn with_routing_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.routing_metadata.insert(key.into(), value.into());
        self
    }

    /// Resolve defaults and produce the wire-ready payload.
    pub fn build(&self) -> DecisionPayload {
        let decision = match &self.verdict {
            Verdict::Allow => DecisionRecord::Allow,
            Verdict::Block {
                status,
                body,
                headers,
            } => DecisionRecord::Block {
                status: status.unwrap_or(403),
                body: body.clone(),
                headers: if headers.is_empty() {
                    None
                } else {
                    Some(headers.clone())
                },
            },
            Verdict::Redirect { url, status } => DecisionRecord::Redirect {
                url: url.clone().unwrap_or_else(|| "/".to_string()),
                status: status.unwrap_or(302),
            },
            Verdict::Challenge {
                challenge_type,
                params,
            } => DecisionRecord::Challenge {
                challenge_type: challenge_type.clone(),
                params: params.clone(),
            },
        };

        let audit = AuditRecord {
            tags: self.tags.clone(),
            rule_ids: self.rule_ids.clone(),
            confidence: self.confidence.map(|c| c.clamp(0.0, 1.0)),
            reason_codes: self.reason_codes.clone(),
            custom: self.custom.clone(),
        };

        DecisionPayload {
            decision: Some(decision),
            request_headers: self.request_header_ops.clone(),
            response_headers: self.response_header_ops.clone(),
            needs_more: self.needs_more,
            audit: if audit.is_empty() { None } else { Some(audit) },
            routing_metadata: self.routing_metadata.clone(),
            request_body_mutation: self.request_body_mutation.clone(),
            response_body_mutation: self.response_body_mutation.clone(),
        }
    }
}

impl Default for Decision {
    fn default() -> Self {
        Self::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_defaults() {
        let payload = Decision::block().build();
        assert_eq!(
            payload.decision(),
            &DecisionRecord::Block {
                status: 403,
                body: None,
                headers: None
            }
        );
    }

    #[test]
    fn deny_with_body_and_tag() {
        let payload = Decision::deny().with_body("nope").with_tag("blocked").build();
        match payload.decision() {
            DecisionRecord::Block { status, body, .. } => {
                assert_eq!(*status, 403);
                assert_eq!(body.as_deref(), Some("nope"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert_eq!(payload.audit.unwrap().tags, vec!["blocked".to_string()]);
        assert!(payload.request_headers.is_empty());
        assert!(payload.routing_metadata.is_empty());
    }

    #[test]
    fn redirect_defaults() {
        let payload = Decision::redirect("/login").build();
        assert_eq!(
            payload.decision(),
            &DecisionRecord::Redirect {
                url: "/login".to_string(),
                status: 302
            }
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let payload = Decision::allow().with_confidence(3.5).build();
        assert_eq!(payload.audit.unwrap().confidence, Some(1.0));

        let payload = Decision::allow().with_confidence(-0.25).build();
        assert_eq!(payload.audit.unwrap().confidence, Some(0.0));
    }

    #[test]
    fn audit_omitted_when_everything_empty() {
        let payload = Decision::allow().build();
        assert!(payload.audit.is_none());
    }

    #[test]
    fn header_ops_preserve_insertion_order() {
        let payload = Decision::allow()
            .add_request_header("X-Trace", "1")
            .remove_request_header("Cookie")
            .set_request_header("X-Agent", "edgeguard")
            .build();
        assert_eq!(
            payload.request_headers,
            vec![
                HeaderOp::Add {
                    name: "X-Trace".to_string(),
                    value: "1".to_string()
                },
                HeaderOp::Remove {
                    name: "Cookie".to_string()
                },
                HeaderOp::Set {
                    name: "X-Agent".to_string(),
                    value: "edgeguard".to_string()
                },
            ]
        );
    }

    #[test]
    fn last_verdict_wins_and_keeps_accumulated_state() {
        let payload = Decision::block()
            .with_body("denied")
            .with_tag("suspicious")
            .set_response_header("X-Flag", "1")
            .with_routing_metadata("pool", "quarantine")
            .into_redirect("/login")
            .build();
        assert_eq!(
            payload.decision(),
            &DecisionRecord::Redirect {
                url: "/login".to_string(),
                status: 302
            }
        );
        assert_eq!(payload.audit.unwrap().tags, vec!["suspicious".to_string()]);
        assert_eq!(payload.response_headers.len(), 1);
        assert_eq!(
            payload.routing_metadata.get("pool").map(String::as_str),
            Some("quarantine")
        );
    }

    #[test]
    fn verdict_switch_resets_variant_fields() {
        // block-specific state does not leak through a switch and back
        let payload = Decision::block()
            .with_status(451)
            .with_body("gone")
            .into_allow()
            .into_block()
            .build();
        assert_eq!(
            payload.decision(),
            &DecisionRecord::Block {
                status: 403,
                body: None,
                headers: None
            }
        );
    }

    #[test]
    fn needs_more_only_when_requested() {
        assert!(!Decision::allow().build().needs_more);
        assert!(Decision::allow().needs_more().build().needs_more);
    }

    #[test]
    fn challenge_keeps_params() {
        let payload = Decision::challenge("captcha")
            .with_challenge_params(json!({"provider": "turnstile"}))
            .build();
        match payload.decision() {
            DecisionRecord::Challenge {
                challenge_type,
                params,
            } => {
                assert_eq!(challenge_type, "captcha");
                assert_eq!(params["provider"], "turnstile");
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }
}
