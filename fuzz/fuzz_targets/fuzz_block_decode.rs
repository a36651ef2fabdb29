// Copyright (c) 2026 Ledgerwatch
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use ledgerwatch::core::types::{decode_canonical_limited, Block};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Stored block bytes: decoding must reject garbage without panicking.
    if let Ok(block) = decode_canonical_limited::<Block>(data, 1 << 20) {
        let _ = ledgerwatch::core::ledger::hasher::digest(&block);
    }
});
