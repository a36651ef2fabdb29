// Copyright (c) 2026 Ledgerwatch
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ledgerwatch::config::NodeConfig::from_json_str(s);
        let _ = ledgerwatch::config::NodeConfig::from_toml_str(s);
    }
});
