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

//! Wire profile gateway.
//!
//! Holds the profile negotiated for one connection and forwards
//! encode/decode calls to it via static dispatch. Negotiation is by
//! first-frame inspection: a v2 peer opens with the HandshakeReq tag, a v1
//! peer with a bare JSON envelope.

use crate::config::TransportKind;
use crate::constants::limits;
use crate::constants::protocol::{VERSION_V1, VERSION_V2};
use crate::error::ProtocolError;
use crate::protocol::{v1, v2, DecisionPayload, InboundEvent, RequestKey};
use crate::transport::codec::Frame;

/// Translate between one wire profile and the normalized event model.
pub trait WireSession: Send {
    /// Protocol version number spoken by this session.
    fn version(&self) -> u32;

    /// Decode one post-handshake frame payload.
    fn decode_event(&self, payload: &[u8]) -> Result<InboundEvent, ProtocolError>;

    /// Encode a decision reply for the given request key.
    fn encode_reply(
        &self,
        key: &RequestKey,
        payload: &DecisionPayload,
    ) -> Result<Frame, ProtocolError>;

    /// Pong frame, if the profile has keep-alive messages.
    fn encode_pong(&self) -> Option<Frame>;
}

#[derive(Debug, Default)]
pub struct V1Session;

impl WireSession for V1Session {
    fn version(&self) -> u32 {
        VERSION_V1
    }

    fn decode_event(&self, payload: &[u8]) -> Result<InboundEvent, ProtocolError> {
        v1::decode_event(payload)
    }

    fn encode_reply(
        &self,
        _key: &RequestKey,
        payload: &DecisionPayload,
    ) -> Result<Frame, ProtocolError> {
        Ok(Frame::v1(v1::encode_response(payload)?))
    }

    fn encode_pong(&self) -> Option<Frame> {
        None
    }
}

#[derive(Debug, Default)]
pub struct V2Session;

impl WireSession for V2Session {
    fn version(&self) -> u32 {
        VERSION_V2
    }

    fn decode_event(&self, payload: &[u8]) -> Result<InboundEvent, ProtocolError> {
        v2::decode_event(payload)
    }

    fn encode_reply(
        &self,
        key: &RequestKey,
        payload: &DecisionPayload,
    ) -> Result<Frame, ProtocolError> {
        let request_id = match key {
            RequestKey::Id(id) => *id,
            // v2 decode only ever produces numeric keys
            RequestKey::Correlation(_) => 0,
        };
        Ok(Frame::v2(
            v2::tags::DECISION,
            v2::encode_decision(request_id, payload)?,
        ))
    }

    fn encode_pong(&self) -> Option<Frame> {
        Some(Frame::v2(v2::tags::PONG, b"{}".to_vec()))
    }
}

/// The profile negotiated for the current connection.
#[derive(Debug)]
pub enum ActiveProfile {
    V1(V1Session),
    V2(V2Session),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    V1,
    V2,
}

impl ActiveProfile {
    pub fn new(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::V1 => Self::V1(V1Session),
            ProfileKind::V2 => Self::V2(V2Session),
        }
    }

    /// Classify a connection by its first frame payload.
    ///
    /// `0x01` is the v2 HandshakeReq tag; `{` opens a v1 envelope. Any other
    /// v2 tag means the peer skipped its handshake; anything else is not a
    /// profile we speak.
    pub fn detect(first_payload: &[u8]) -> Result<ProfileKind, ProtocolError> {
        match first_payload.first() {
            Some(&v2::tags::HANDSHAKE_REQ) => Ok(ProfileKind::V2),
            Some(&b'{') => Ok(ProfileKind::V1),
            Some(&other) if is_v2_tag(other) => Err(ProtocolError::MessageBeforeHandshake(other)),
            Some(&other) => Err(ProtocolError::UnknownProfile(other)),
            None => Err(ProtocolError::EmptyFrame),
        }
    }

    /// Frame payload ceiling for a profile on a transport.
    pub fn max_payload(kind: ProfileKind, transport: TransportKind) -> usize {
        match (kind, transport) {
            (ProfileKind::V1, _) => limits::MAX_V1_PAYLOAD,
            // v2 lengths count the tag byte
            (ProfileKind::V2, TransportKind::Uds) => limits::MAX_V2_JSON_UDS + 1,
            (ProfileKind::V2, TransportKind::Grpc) => limits::MAX_V2_JSON_TCP + 1,
        }
    }

    /// Ceiling to apply before the profile is known.
    pub fn initial_max_payload(transport: TransportKind) -> usize {
        Self::max_payload(ProfileKind::V1, transport)
            .max(Self::max_payload(ProfileKind::V2, transport))
    }
}

impl WireSession for ActiveProfile {
    fn version(&self) -> u32 {
        match self {
            Self::V1(s) => s.version(),
            Self::V2(s) => s.version(),
        }
    }

    fn decode_event(&self, payload: &[u8]) -> Result<InboundEvent, ProtocolError> {
        match self {
            Self::V1(s) => s.decode_event(payload),
            Self::V2(s) => s.decode_event(payload),
        }
    }

    fn encode_reply(
        &self,
        key: &RequestKey,
        payload: &DecisionPayload,
    ) -> Result<Frame, ProtocolError> {
        match self {
            Self::V1(s) => s.encode_reply(key, payload),
            Self::V2(s) => s.encode_reply(key, payload),
        }
    }

    fn encode_pong(&self) -> Option<Frame> {
        match self {
            Self::V1(s) => s.encode_pong(),
            Self::V2(s) => s.encode_pong(),
        }
    }
}

fn is_v2_tag(tag: u8) -> bool {
    matches!(
        tag,
        v2::tags::HANDSHAKE_RESP
            | v2::tags::REQUEST_HEADERS
            | v2::tags::REQUEST_BODY_CHUNK
            | v2::tags::RESPONSE_HEADERS
            | v2::tags::RESPONSE_BODY_CHUNK
            | v2::tags::DECISION
            | v2::tags::BODY_MUTATION
            | v2::tags::CANCEL_REQUEST
            | v2::tags::CANCEL_ALL
            | v2::tags::PING
            | v2::tags::PONG
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_v2_by_handshake_tag() {
        assert_eq!(
            ActiveProfile::detect(&[0x01, b'{']).unwrap(),
            ProfileKind::V2
        );
    }

    #[test]
    fn detects_v1_by_json_brace() {
        assert_eq!(
            ActiveProfile::detect(b"{\"version\":1}").unwrap(),
            ProfileKind::V1
        );
    }

    #[test]
    fn v2_tag_before_handshake_is_fatal() {
        assert!(matches!(
            ActiveProfile::detect(&[0x10, b'{']),
            Err(ProtocolError::MessageBeforeHandshake(0x10))
        ));
    }

    #[test]
    fn garbage_first_byte_is_fatal() {
        assert!(matches!(
            ActiveProfile::detect(&[0xAA]),
            Err(ProtocolError::UnknownProfile(0xAA))
        ));
    }

    #[test]
    fn payload_ceilings() {
        assert_eq!(
            ActiveProfile::max_payload(ProfileKind::V1, TransportKind::Uds),
            10 * 1024 * 1024
        );
        assert_eq!(
            ActiveProfile::max_payload(ProfileKind::V2, TransportKind::Uds),
            16 * 1024 * 1024
        );
        assert_eq!(
            ActiveProfile::max_payload(ProfileKind::V2, TransportKind::Grpc),
            10 * 1024 * 1024 + 1
        );
        assert_eq!(
            ActiveProfile::initial_max_payload(TransportKind::Uds),
            16 * 1024 * 1024
        );
    }
}
