#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Ledger engine: digest, proof-of-work search, chain and durable store.

pub mod chain;
pub mod hasher;
pub mod miner;
pub mod store;

pub use chain::{
    genesis_block, verify_chain, ChainSnapshot, IntegrityError, IntegrityKind, Ledger,
    LedgerError, LedgerOptions,
};
