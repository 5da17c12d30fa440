// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use edgeguard::protocol::v1;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Envelope parsing, payload dispatch, and base64 decoding must reject
    // malformed input without panicking.
    let _ = v1::decode_event(data);
});
