// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use edgeguard::transport::codec::FrameCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // No sequence of bytes may panic the frame decoder. Errors are fine,
    // crashes are not.
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buffer = BytesMut::from(data);

    loop {
        match codec.decode(&mut buffer) {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
});
