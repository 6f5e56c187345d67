#![doc = "asset-push-core: core logic library for asset-push."]

//! This crate contains the incremental publish pipeline: manifest handling,
//! change detection, upload ordering, bounded-concurrency uploads and manifest
//! reconciliation. It has no network code; destinations plug in through
//! [`contract::UploadBackend`].
//!
//! # Usage
//! Build a [`config::RunConfig`], pick a backend and call
//! [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod error;
pub mod filter;
pub mod listing;
pub mod manifest;
pub mod orchestrate;
pub mod reconcile;
pub mod sequence;
pub mod synchronise;

pub use error::SyncError;
pub use synchronise::{synchronise, SynchroniseReport};
