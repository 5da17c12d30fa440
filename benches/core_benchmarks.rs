use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio_util::codec::{Decoder, Encoder};

use edgeguard::decision::Decision;
use edgeguard::protocol::{v1, v2};
use edgeguard::transport::codec::{Frame, FrameCodec};

fn bench_codec_round_trip(c: &mut Criterion) {
    let body = serde_json::to_vec(&serde_json::json!({
        "request_id": 7,
        "method": "GET",
        "uri": "/assets/app.js?v=3",
        "headers": {"Host": ["example.com"], "Accept": ["*/*"]}
    }))
    .unwrap();

    c.bench_function("codec_encode_decode", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new(1024 * 1024);
            let mut buf = BytesMut::new();
            codec
                .encode(Frame::v2(0x10, black_box(body.clone())), &mut buf)
                .unwrap();
            let _ = codec.decode(&mut buf);
        })
    });
}

fn bench_v1_event_decode(c: &mut Criterion) {
    let envelope = serde_json::to_vec(&serde_json::json!({
        "version": 1,
        "event_type": "request_headers",
        "payload": {
            "metadata": {
                "correlation_id": "bench-1",
                "client_ip": "10.1.2.3",
                "client_port": 55123,
                "protocol": "HTTP/1.1",
                "timestamp": 1700000000.0
            },
            "method": "POST",
            "uri": "/api/orders?expand=items",
            "headers": {"Content-Type": ["application/json"]}
        }
    }))
    .unwrap();

    c.bench_function("v1_decode_request_headers", |b| {
        b.iter(|| {
            let _ = v1::decode_event(black_box(&envelope));
        })
    });
}

fn bench_decision_encode(c: &mut Criterion) {
    let payload = Decision::block()
        .with_body("request denied")
        .with_tag("sqli")
        .with_rule_id("rule-901")
        .with_confidence(0.92)
        .set_response_header("X-Blocked", "1")
        .build();

    c.bench_function("v2_encode_block_decision", |b| {
        b.iter(|| {
            let _ = v2::encode_decision(7, black_box(&payload));
        })
    });
}

criterion_group!(
    benches,
    bench_codec_round_trip,
    bench_v1_event_decode,
    bench_decision_encode
);
criterion_main!(benches);
