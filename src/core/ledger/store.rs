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

//! Durable chain storage on sled.
//!
//! One tree, `blocks`, keyed by the big-endian block index so iteration order is chain
//! order. Values are canonical bincode of [`Block`], which carries every hashed field in
//! a fixed order.

use crate::core::types::{decode_canonical_limited, encode_canonical, Block};
use thiserror::Error;

const BLOCKS_TREE: &str = "blocks";
const MAX_BLOCK_BYTES: usize = 1 << 20;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("block codec")]
    Codec,
    #[error("stored index {found} where {expected} was expected")]
    Gap { expected: u64, found: u64 },
}

/// Persistent chain wrapper.
#[derive(Clone)]
pub struct ChainStore {
    db: sled::Db,
    blocks: sled::Tree,
}

impl ChainStore {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        let blocks = db.open_tree(BLOCKS_TREE).map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db, blocks })
    }

    /// Write one block and flush.
    pub fn append(&self, block: &Block) -> Result<(), StoreError> {
        let value = encode_canonical(block).map_err(|_| StoreError::Codec)?;
        self.blocks
            .insert(block.index.to_be_bytes(), value)
            .map_err(|_| StoreError::DbIo)?;
        self.db.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }

    /// All stored blocks in index order. Fails on a hole in the sequence.
    pub fn load(&self) -> Result<Vec<Block>, StoreError> {
        let mut out = Vec::new();
        for item in self.blocks.iter() {
            let (_, v) = item.map_err(|_| StoreError::DbIo)?;
            let block: Block =
                decode_canonical_limited(&v, MAX_BLOCK_BYTES).map_err(|_| StoreError::Codec)?;
            let expected = out.len() as u64;
            if block.index != expected {
                return Err(StoreError::Gap { expected, found: block.index });
            }
            out.push(block);
        }
        Ok(out)
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
