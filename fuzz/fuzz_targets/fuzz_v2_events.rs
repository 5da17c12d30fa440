// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use edgeguard::protocol::v2;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Tag dispatch and record decoding over arbitrary payloads.
    let _ = v2::decode_event(data);
    let _ = v2::decode_handshake(data);
});
