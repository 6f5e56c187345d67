//! High-level pipeline: one incremental publish run.
//!
//! This module wires the pipeline stages together for a single CI invocation:
//!   - Loads the manifest left by the previous run ([`ManifestStore::load`])
//!   - Lists the source root and keeps only new or changed files ([`ChangeFilter`])
//!   - Orders assets before HTML and builds the upload plan ([`sequence`])
//!   - Uploads with bounded concurrency ([`UploadOrchestrator`])
//!   - Records successful uploads in the manifest ([`reconcile::apply`]) and persists it
//!
//! # Error Handling
//! Failures of individual uploads are data: they end up in
//! [`SynchroniseReport::failed`] and are retried next run because the manifest
//! does not record them. Config errors, listing or read errors, and a failure to
//! persist the manifest abort the run with a [`SyncError`].
//!
//! # Callable From
//! - The CLI crate, with the backend selected from configuration
//! - Integration tests, with `MockUploadBackend` or an in-memory backend

use serde::Serialize;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::contract::{FileLister, UploadBackend};
use crate::error::SyncError;
use crate::filter::ChangeFilter;
use crate::manifest::ManifestStore;
use crate::orchestrate::UploadOrchestrator;
use crate::{reconcile, sequence};

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct SynchroniseReport {
    /// Relative paths confirmed uploaded, in completion order.
    pub uploaded: Vec<String>,
    pub failed: Vec<FailedUpload>,
    /// Entries returned by the lister, directories included.
    pub listed: usize,
    /// Files that passed the change filter.
    pub planned: usize,
    /// Size of the manifest that was persisted.
    pub manifest_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub path: String,
    pub remote_key: String,
    pub error: String,
}

impl SynchroniseReport {
    /// The run's output value: `success: ` followed by the uploaded paths as JSON.
    pub fn output_payload(&self) -> String {
        output_payload(&self.uploaded)
    }
}

/// `success: ` followed by `uploaded` as a JSON array.
pub fn output_payload(uploaded: &[String]) -> String {
    let list = serde_json::to_string(uploaded).unwrap_or_else(|_| "[]".to_string());
    format!("success: {list}")
}

pub async fn synchronise<B, L>(
    config: &RunConfig,
    backend: &B,
    lister: &L,
) -> Result<SynchroniseReport, SyncError>
where
    B: UploadBackend + ?Sized,
    L: FileLister + ?Sized,
{
    config.validate()?;
    info!(
        source_root = %config.source_root.display(),
        force = config.force,
        "[SYNC] Starting publish run"
    );

    let store = ManifestStore::new(backend, config.manifest_file_name.clone(), config.force)?;
    let mut manifest = store.load().await;

    let listed = lister.list(&config.source_root)?;
    let pending = ChangeFilter::new(&manifest, &config.skip_prefixes, &config.source_root)
        .force(config.force)
        .filter(&listed)
        .await?;
    let planned = pending.len();
    info!(listed = listed.len(), planned, "[SYNC] Computed changed files");

    let plan = sequence::plan(
        sequence::order(pending),
        &config.source_root,
        &config.dest_prefix,
    );
    let outcomes = UploadOrchestrator::new(backend, config.concurrency)
        .run(plan)
        .await;

    let uploaded = reconcile::apply(&outcomes, &mut manifest);
    let failed: Vec<FailedUpload> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome.result {
            Ok(_) => None,
            Err(e) => Some(FailedUpload {
                path: outcome.relative_path,
                remote_key: outcome.remote_key,
                error: e.to_string(),
            }),
        })
        .collect();
    if !failed.is_empty() {
        error!(
            failed = failed.len(),
            "[SYNC] Some uploads failed; they will be retried on the next run"
        );
    }

    if let Err(e) = store.save(&manifest).await {
        error!(error = %e, "[SYNC][ERROR] Manifest could not be persisted");
        return Err(match e {
            SyncError::ManifestPersist { key, source, .. } => SyncError::ManifestPersist {
                key,
                source,
                uploaded,
            },
            other => other,
        });
    }

    info!(
        uploaded = uploaded.len(),
        failed = failed.len(),
        manifest_entries = manifest.len(),
        "[SYNC] Publish run complete"
    );
    Ok(SynchroniseReport {
        uploaded,
        failed,
        listed: listed.len(),
        planned,
        manifest_entries: manifest.len(),
    })
}
