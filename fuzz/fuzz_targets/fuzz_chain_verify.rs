// Copyright (c) 2026 Ledgerwatch
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use ledgerwatch::core::{
    ledger::{genesis_block, hasher::digest, verify_chain},
    types::Block,
};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct RawBlock {
    timestamp_ms: u64,
    payload: String,
    producer: String,
    nonce: u64,
    difficulty: u8,
    relink: bool,
    rehash: bool,
}

fuzz_target!(|raw: Vec<RawBlock>| {
    let mut chain = vec![genesis_block()];
    for (i, r) in raw.into_iter().take(16).enumerate() {
        let prev = chain[i].hash.clone();
        let mut b = Block {
            index: i as u64 + 1,
            timestamp_ms: r.timestamp_ms,
            payload: r.payload,
            prev_hash: if r.relink { prev } else { String::new() },
            hash: String::new(),
            nonce: r.nonce,
            difficulty: u32::from(r.difficulty % 3),
            producer: r.producer,
        };
        if r.rehash {
            b.hash = digest(&b);
        }
        chain.push(b);
    }

    // Verification must never panic, and a passing chain must satisfy every link rule.
    if verify_chain(&chain).is_ok() {
        for w in chain.windows(2) {
            assert_eq!(w[1].prev_hash, w[0].hash);
            assert_eq!(digest(&w[1]), w[1].hash);
        }
    }
});
