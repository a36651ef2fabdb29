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
#![deny(missing_docs)]

//! Single-writer, hash-linked ledger.
//!
//! ## Locking
//! One mutex covers the whole append path: reading the tip, mining, persisting and
//! pushing. Concurrent callers serialize, and readers never observe a block whose hash
//! does not yet meet the difficulty.
//!
//! ## Genesis
//! Index 0 is built once at construction. Its hash is the SHA-256 of the empty input, not
//! a mined value, and the difficulty rule does not apply to it.

use crate::core::{
    clock::{Clock, SystemClock},
    ledger::{
        hasher::{digest, empty_digest},
        miner::{MineError, Miner, MinerConfig},
        store::{ChainStore, StoreError},
    },
    shutdown::Shutdown,
    types::{meets_difficulty, Block},
};
use crate::monitoring::metrics::Metrics;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Payload of the genesis block.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";
/// Producer recorded on the genesis block.
pub const GENESIS_PRODUCER: &str = "genesis";

/// What broke during verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityKind {
    /// The chain has no blocks at all.
    Empty,
    /// Block 0 is not the canonical genesis.
    BadGenesis,
    /// `index` field does not match the position.
    BadIndex,
    /// `prev_hash` does not equal the previous block's hash.
    BrokenLink,
    /// Recomputed digest differs from the stored hash.
    HashMismatch,
    /// Stored hash does not meet the block's difficulty.
    DifficultyNotMet,
}

/// First broken position found by verification.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize)]
#[error("chain integrity broken at block {index}: {kind:?}")]
pub struct IntegrityError {
    /// Offending block index.
    pub index: u64,
    /// Kind of failure.
    pub kind: IntegrityKind,
}

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Difficulty no digest can meet; rejected at construction.
    #[error("impossible difficulty {0}")]
    ImpossibleDifficulty(u32),
    /// Append attempted on a chain without genesis.
    #[error("chain is not initialized")]
    Uninitialized,
    /// Mining stopped without a solution.
    #[error("mining: {0}")]
    Mining(#[from] MineError),
    /// Durable store failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Stored chain failed verification on load.
    #[error("integrity: {0}")]
    Integrity(#[from] IntegrityError),
    /// A previous holder of the chain lock panicked.
    #[error("chain lock poisoned")]
    Poisoned,
}

/// Construction options.
#[derive(Clone)]
pub struct LedgerOptions {
    /// Required leading zero hex digits for every appended block.
    pub difficulty: u32,
    /// Nonce search limits.
    pub miner: MinerConfig,
    /// Halts an in-flight search.
    pub halt: Shutdown,
    /// Source of block timestamps.
    pub clock: Arc<dyn Clock>,
    /// Optional durable store.
    pub store: Option<ChainStore>,
    /// Optional metrics sink.
    pub metrics: Option<Metrics>,
}

impl LedgerOptions {
    /// In-memory ledger at `difficulty` using system time.
    pub fn new(difficulty: u32) -> Self {
        Self {
            difficulty,
            miner: MinerConfig::default(),
            halt: Shutdown::never(),
            clock: Arc::new(SystemClock),
            store: None,
            metrics: None,
        }
    }
}

/// Read-only copy of the chain at one instant.
#[derive(Clone, Debug, Serialize)]
pub struct ChainSnapshot {
    /// Difficulty in force.
    pub difficulty: u32,
    /// Blocks, genesis first.
    pub blocks: Vec<Block>,
}

impl ChainSnapshot {
    /// Number of blocks including genesis.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true for a ledger-produced snapshot.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Last block.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Run full verification on this copy.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        verify_chain(&self.blocks)
    }
}

struct ChainState {
    blocks: Vec<Block>,
    audit: Vec<String>,
}

/// The ledger.
pub struct Ledger {
    state: Mutex<ChainState>,
    difficulty: u32,
    miner: Miner,
    clock: Arc<dyn Clock>,
    store: Option<ChainStore>,
    metrics: Option<Metrics>,
}

/// The fixed first block.
pub fn genesis_block() -> Block {
    Block {
        index: 0,
        timestamp_ms: 0,
        payload: GENESIS_PAYLOAD.to_string(),
        prev_hash: String::new(),
        hash: empty_digest(),
        nonce: 0,
        difficulty: 0,
        producer: GENESIS_PRODUCER.to_string(),
    }
}

/// Walk `blocks`, returning the first broken position.
///
/// Block 0 must equal [`genesis_block`]. Every later block must sit at its own index,
/// link to its predecessor, hash to its stored value and meet its recorded difficulty.
pub fn verify_chain(blocks: &[Block]) -> Result<(), IntegrityError> {
    let Some(first) = blocks.first() else {
        return Err(IntegrityError { index: 0, kind: IntegrityKind::Empty });
    };
    if *first != genesis_block() {
        return Err(IntegrityError { index: 0, kind: IntegrityKind::BadGenesis });
    }
    for (i, pair) in blocks.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        let pos = i as u64 + 1;
        let fail = |kind| Err(IntegrityError { index: pos, kind });
        if cur.index != pos {
            return fail(IntegrityKind::BadIndex);
        }
        if cur.prev_hash != prev.hash {
            return fail(IntegrityKind::BrokenLink);
        }
        if digest(cur) != cur.hash {
            return fail(IntegrityKind::HashMismatch);
        }
        if !meets_difficulty(&cur.hash, cur.difficulty) {
            return fail(IntegrityKind::DifficultyNotMet);
        }
    }
    Ok(())
}

impl Ledger {
    /// In-memory ledger with default options.
    pub fn new(difficulty: u32) -> Result<Self, LedgerError> {
        Self::open(LedgerOptions::new(difficulty))
    }

    /// Build a ledger. With a store, a previously persisted chain is reloaded and verified;
    /// otherwise a fresh genesis is created (and persisted, if a store is present).
    pub fn open(opts: LedgerOptions) -> Result<Self, LedgerError> {
        Miner::check_difficulty(opts.difficulty)
            .map_err(|_| LedgerError::ImpossibleDifficulty(opts.difficulty))?;
        if !opts.miner.covers(opts.difficulty) {
            warn!(
                difficulty = opts.difficulty,
                max_iterations = opts.miner.max_iterations,
                "expected mining work exceeds the iteration budget"
            );
        }

        let mut audit = Vec::new();
        let blocks = match &opts.store {
            Some(store) if !store.is_empty() => {
                let blocks = store.load()?;
                verify_chain(&blocks)?;
                info!(height = blocks.len(), "chain reloaded from store");
                audit.push(format!("chain reloaded with {} blocks", blocks.len()));
                blocks
            }
            _ => {
                let g = genesis_block();
                if let Some(store) = &opts.store {
                    store.append(&g)?;
                }
                audit.push("genesis block created".to_string());
                vec![g]
            }
        };

        if let Some(m) = &opts.metrics {
            m.block_height.set(blocks.len() as i64 - 1);
        }

        Ok(Self {
            state: Mutex::new(ChainState { blocks, audit }),
            difficulty: opts.difficulty,
            miner: Miner::new(opts.miner, opts.halt),
            clock: opts.clock,
            store: opts.store,
            metrics: opts.metrics,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChainState>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Difficulty applied to appended blocks.
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Mine and append a block carrying `payload`, attributed to `producer`.
    ///
    /// Holds the chain lock for the whole search; blocks the calling thread.
    pub fn append(
        &self,
        payload: impl Into<String>,
        producer: impl Into<String>,
    ) -> Result<Block, LedgerError> {
        let mut st = self.lock()?;
        let tip = st.blocks.last().ok_or(LedgerError::Uninitialized)?;

        let mut block = Block {
            index: tip.index + 1,
            timestamp_ms: self.clock.now_ms(),
            payload: payload.into(),
            prev_hash: tip.hash.clone(),
            hash: String::new(),
            nonce: 0,
            difficulty: self.difficulty,
            producer: producer.into(),
        };

        let solution = self.miner.search(&block, self.difficulty).map_err(|e| {
            warn!(index = block.index, error = %e, "mining aborted");
            e
        })?;
        block.nonce = solution.nonce;
        block.hash = solution.hash;

        if let Some(store) = &self.store {
            store.append(&block)?;
        }

        let entry = format!("block {} produced by {}", block.index, block.producer);
        debug!(%entry, "audit");
        st.blocks.push(block.clone());
        st.audit.push(entry);

        if let Some(m) = &self.metrics {
            m.block_height.set(block.index as i64);
            m.blocks_mined_total.inc();
            m.mining_iterations_total.inc_by(solution.iterations);
        }
        info!(
            index = block.index,
            producer = %block.producer,
            nonce = block.nonce,
            iterations = solution.iterations,
            hash = %block.hash,
            "block appended"
        );
        Ok(block)
    }

    /// Copy of the current chain.
    pub fn snapshot(&self) -> Result<ChainSnapshot, LedgerError> {
        let st = self.lock()?;
        Ok(ChainSnapshot { difficulty: self.difficulty, blocks: st.blocks.clone() })
    }

    /// Verify the live chain under the lock.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let st = self.lock()?;
        verify_chain(&st.blocks).map_err(|e| {
            warn!(index = e.index, kind = ?e.kind, "chain verification failed");
            LedgerError::Integrity(e)
        })
    }

    /// Boolean form of [`Ledger::verify`].
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Chain length including genesis.
    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.blocks.len())
    }

    /// Never true once constructed.
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.lock()?.blocks.is_empty())
    }

    /// Last block.
    pub fn tip(&self) -> Result<Block, LedgerError> {
        self.lock()?.blocks.last().cloned().ok_or(LedgerError::Uninitialized)
    }

    /// Audit entries, oldest first.
    pub fn audit_log(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.lock()?.audit.clone())
    }
}
