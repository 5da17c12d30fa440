use bytes::{BufMut, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

use edgeguard::decision::Decision;
use edgeguard::protocol::{v1, v2};
use edgeguard::transport::codec::{Frame, FrameCodec};

proptest! {
    // No byte sequence may panic the frame decoder; it either yields a
    // frame, asks for more, or reports a protocol error.
    #[test]
    fn codec_never_panics(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&data[..]);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    // A frame survives any split of its bytes into sequential reads.
    #[test]
    fn fragmentation_is_invisible(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        cut in 1usize..520,
    ) {
        let mut codec = FrameCodec::new(1024);
        let mut encoded = BytesMut::new();
        codec.encode(Frame::v1(payload.clone()), &mut encoded).unwrap();

        let cut = cut.min(encoded.len());
        let mut buf = BytesMut::new();
        buf.put_slice(&encoded[..cut]);
        let early = codec.decode(&mut buf).unwrap();
        buf.put_slice(&encoded[cut..]);

        let decoded = match early {
            Some(frame) => frame,
            None => codec.decode(&mut buf).unwrap().expect("complete frame"),
        };
        prop_assert_eq!(&decoded[..], &payload[..]);
    }

    // Event decoding must reject or accept arbitrary payloads without
    // panicking, for both profiles.
    #[test]
    fn event_decoding_never_panics(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let _ = v1::decode_event(&data);
        let _ = v2::decode_event(&data);
    }

    // Emitted confidence always lands in [0, 1].
    #[test]
    fn confidence_always_clamped(confidence in -1000.0f64..1000.0) {
        let payload = Decision::allow().with_confidence(confidence).build();
        let emitted = payload.audit.unwrap().confidence.unwrap();
        prop_assert!((0.0..=1.0).contains(&emitted));
    }

    // Builder output for a plain Allow stays minimal whatever the inputs.
    #[test]
    fn allow_reply_is_minimal(id in any::<u64>()) {
        let body = v2::encode_decision(id, &Decision::allow().build()).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        prop_assert_eq!(v["request_id"].as_u64().unwrap(), id);
        prop_assert!(v.get("audit").is_none());
        prop_assert!(v.get("needs_more").is_none());
        prop_assert!(v.get("request_headers").is_none());
    }
}
