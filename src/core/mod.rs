#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Core primitives: types, clock, shutdown signal and the ledger engine.

pub mod clock;
pub mod ledger;
pub mod shutdown;
pub mod types;
