#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: peer registry, health monitor and operator alerts.

pub mod alert;
pub mod health;
pub mod peer_registry;
