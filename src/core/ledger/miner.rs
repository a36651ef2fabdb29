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

//! Proof-of-work nonce search.
//!
//! The search runs on the caller's thread. It is bounded by `max_iterations` and polls a
//! [`Shutdown`] handle every `poll_every` attempts so an in-flight search can be abandoned.

use crate::core::{
    ledger::hasher::digest_with_nonce,
    shutdown::Shutdown,
    types::{meets_difficulty, Block, MAX_DIFFICULTY},
};
use thiserror::Error;

/// Mining errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MineError {
    /// Difficulty cannot be satisfied by a 256-bit hex digest.
    #[error("difficulty {0} exceeds {MAX_DIFFICULTY} hex digits")]
    ImpossibleDifficulty(u32),
    /// Shutdown was signalled mid-search.
    #[error("mining halted")]
    Halted,
    /// Iteration budget spent without a solution.
    #[error("no solution within {0} iterations")]
    Exhausted(u64),
}

/// Search limits.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Hard cap on hash attempts per block.
    pub max_iterations: u64,
    /// How often the shutdown handle is polled.
    pub poll_every: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self { max_iterations: u64::MAX, poll_every: 1024 }
    }
}

impl MinerConfig {
    /// True when the budget covers the expected work at `difficulty`.
    pub fn covers(&self, difficulty: u32) -> bool {
        expected_work(difficulty).is_some_and(|w| w <= self.max_iterations)
    }
}

/// Expected hash attempts for `difficulty` (16^difficulty), `None` past `u64`.
pub fn expected_work(difficulty: u32) -> Option<u64> {
    16u64.checked_pow(difficulty)
}

/// Successful search result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    /// Hex hash meeting the difficulty.
    pub hash: String,
    /// Nonce producing `hash`.
    pub nonce: u64,
    /// Attempts spent.
    pub iterations: u64,
}

/// Proof-of-work miner.
#[derive(Clone, Debug)]
pub struct Miner {
    cfg: MinerConfig,
    halt: Shutdown,
}

impl Miner {
    /// Miner with the given limits and halt signal.
    pub fn new(cfg: MinerConfig, halt: Shutdown) -> Self {
        Self { cfg, halt }
    }

    /// Reject difficulties no digest can meet.
    pub fn check_difficulty(difficulty: u32) -> Result<(), MineError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(MineError::ImpossibleDifficulty(difficulty));
        }
        Ok(())
    }

    /// Find a nonce, starting from `candidate.nonce`, whose digest meets `difficulty`.
    ///
    /// `candidate.difficulty` is part of the preimage; callers keep it equal to `difficulty`.
    pub fn search(&self, candidate: &Block, difficulty: u32) -> Result<Solution, MineError> {
        Self::check_difficulty(difficulty)?;
        let poll = self.cfg.poll_every.max(1);
        let mut nonce = candidate.nonce;
        let mut iterations: u64 = 0;
        loop {
            if iterations >= self.cfg.max_iterations {
                return Err(MineError::Exhausted(iterations));
            }
            if iterations % poll == 0 && self.halt.is_triggered() {
                return Err(MineError::Halted);
            }
            let hash = hex::encode(digest_with_nonce(candidate, nonce));
            iterations += 1;
            if meets_difficulty(&hash, difficulty) {
                return Ok(Solution { hash, nonce, iterations });
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}
