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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Block digest.
//!
//! digest = SHA-256( "Ledgerwatch-Block-v1" || preimage )
//!
//! The preimage is written by hand in the canonical fixint layout (little-endian integers,
//! strings as a u64 length followed by their bytes) over index, timestamp_ms, payload,
//! prev_hash, nonce, difficulty and producer. It is byte-identical to
//! [`encode_canonical`](crate::core::types::encode_canonical) of those fields and cannot fail.

use crate::core::types::{Block, Hash32};
use ring::digest;

const BLOCK_DOMAIN: &[u8] = b"Ledgerwatch-Block-v1";

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn preimage(block: &Block, nonce: u64) -> Vec<u8> {
    let strings = block.payload.len() + block.prev_hash.len() + block.producer.len();
    let mut buf = Vec::with_capacity(BLOCK_DOMAIN.len() + 52 + strings);
    buf.extend_from_slice(BLOCK_DOMAIN);
    buf.extend_from_slice(&block.index.to_le_bytes());
    buf.extend_from_slice(&block.timestamp_ms.to_le_bytes());
    put_str(&mut buf, &block.payload);
    put_str(&mut buf, &block.prev_hash);
    buf.extend_from_slice(&nonce.to_le_bytes());
    buf.extend_from_slice(&block.difficulty.to_le_bytes());
    put_str(&mut buf, &block.producer);
    buf
}

fn h(data: &[u8]) -> Hash32 {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// Raw digest of `block` with the given `nonce` substituted.
pub fn digest_with_nonce(block: &Block, nonce: u64) -> Hash32 {
    h(&preimage(block, nonce))
}

/// Hex digest of `block` as it stands.
pub fn digest(block: &Block) -> String {
    hex::encode(digest_with_nonce(block, block.nonce))
}

/// Hex SHA-256 of the empty input, used as the genesis sentinel hash.
pub fn empty_digest() -> String {
    hex::encode(h(&[]))
}
