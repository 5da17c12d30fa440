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

//! Frame codec.
//!
//! Frames are a 4-byte big-endian unsigned length followed by the payload.
//! In the v2 profile the payload opens with a one-byte type tag; the codec
//! does not interpret it, that is the profile layer's job. The decoder
//! tolerates arbitrary short-read fragmentation; the encoder stages whole
//! frames so a partial frame is never observable to the peer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::ProtocolError;

/// Length prefix size in bytes.
pub const LEN_PREFIX: usize = 4;

/// One outbound frame: optional v2 type tag plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: Option<u8>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn v1(body: Vec<u8>) -> Self {
        Self { tag: None, body }
    }

    pub fn v2(tag: u8, body: Vec<u8>) -> Self {
        Self {
            tag: Some(tag),
            body,
        }
    }

    /// Payload length as declared in the prefix (tag byte included).
    pub fn payload_len(&self) -> usize {
        self.body.len() + usize::from(self.tag.is_some())
    }
}

/// Length-prefixed frame reader/writer with a configurable payload ceiling.
#[derive(Debug)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Narrow (or widen) the ceiling once the wire profile is known.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&src[..LEN_PREFIX]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if length > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_payload,
            });
        }

        if src.len() < LEN_PREFIX + length {
            // reserve what the rest of the frame needs and wait for more
            src.reserve(LEN_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let payload = src.split_to(length).freeze();
        trace!("Decoded frame of {} bytes", payload.len());
        Ok(Some(payload))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = frame.payload_len();
        if length == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if length > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_payload,
            });
        }

        dst.reserve(LEN_PREFIX + length);
        dst.put_u32(length as u32);
        if let Some(tag) = frame.tag {
            dst.put_u8(tag);
        }
        dst.extend_from_slice(&frame.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn decodes_a_complete_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = frame_bytes(b"{\"a\":1}");
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], b"{\"a\":1}");
        assert!(buf.is_empty());
    }

    #[test]
    fn tolerates_byte_at_a_time_fragmentation() {
        let mut codec = FrameCodec::new(1024);
        let full = frame_bytes(b"hello frame");
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in full.iter() {
            buf.put_u8(*byte);
            if let Some(payload) = codec.decode(&mut buf).unwrap() {
                decoded = Some(payload);
            }
        }
        assert_eq!(&decoded.unwrap()[..], b"hello frame");
    }

    #[test]
    fn zero_length_is_fatal() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[test]
    fn oversize_is_fatal_before_payload_arrives() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        // no payload bytes yet; the declared length alone is enough
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { length: 17, max: 16 })
        ));
    }

    #[test]
    fn max_boundary_is_allowed() {
        let mut codec = FrameCodec::new(8);
        let mut buf = frame_bytes(&[0xAB; 8]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn encode_decode_round_trip_with_tag() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::v2(0x20, b"{\"request_id\":7}".to_vec()), &mut buf)
            .unwrap();
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload[0], 0x20);
        assert_eq!(&payload[1..], b"{\"request_id\":7}");
    }

    #[test]
    fn consecutive_frames_in_one_buffer() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        codec.encode(Frame::v1(b"one".to_vec()), &mut buf).unwrap();
        codec.encode(Frame::v1(b"two".to_vec()), &mut buf).unwrap();
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
