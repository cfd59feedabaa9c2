//! tally-sync library.
//!
//! Persists optimistic edits made through a [`tally_core::Store`]: every
//! event is applied locally first, the implied writes run as tokio tasks
//! against a [`ModelApi`], and their results come back as control events
//! (`placeholdersActivated`, `modelsUpdated`, or a `rowDelete` rollback).

pub mod api;
pub mod orchestrator;

pub use api::{ApiCall, ApiError, InMemoryApi, ModelApi};
pub use orchestrator::{Orchestrator, Settled, SyncError};
