//! Server and client simulation engines: deterministic, time-stepped state
//! machines over the profile data model.
//!
//! Both engines are single-writer per instance. Mutating calls serialize
//! through `RwLock::write`; read-only queries take `RwLock::read`. Nothing
//! here suspends — `Tick`, `Read`, and `Write` are all finite — so
//! `std::sync` locks are the right tool, not `tokio::sync`.

pub mod client;
pub mod server;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown name: {0}")]
    UnknownName(String),
    #[error("invalid value payload for tag '{tag}': {reason}")]
    InvalidValue { tag: String, reason: String },
    #[error(transparent)]
    Profile(#[from] crate::profile::ProfileError),
}

pub use client::ClientEngine;
pub use server::ServerEngine;
