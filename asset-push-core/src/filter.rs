//! Change filter: which listed paths need uploading this run.
//!
//! Policy, in order:
//! 1. skip-prefix match on the relative path (plain string prefix, not a glob)
//! 2. directories are dropped
//! 3. paths whose manifest fingerprint still matches are dropped
//!    (presence for assets, content hash for HTML), unless forced

use std::path::Path;

use tracing::{debug, trace};

use crate::error::{io_err, SyncError};
use crate::manifest::{fingerprint_for, is_html, Fingerprint, Manifest};

/// A path that survived filtering, with the fingerprint to record once uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: String,
    pub fingerprint: Fingerprint,
}

pub fn is_skipped(path: &str, skip_prefixes: &[String]) -> bool {
    skip_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

/// Whether a file is already uploaded in its current state.
pub fn is_unchanged(manifest: &Manifest, path: &str, current: &Fingerprint) -> bool {
    match manifest.get(path) {
        None => false,
        Some(_) if !is_html(path) => true,
        Some(stored) => stored == current,
    }
}

pub struct ChangeFilter<'a> {
    manifest: &'a Manifest,
    skip_prefixes: &'a [String],
    code_root: &'a Path,
    force: bool,
}

impl<'a> ChangeFilter<'a> {
    pub fn new(manifest: &'a Manifest, skip_prefixes: &'a [String], code_root: &'a Path) -> Self {
        Self {
            manifest,
            skip_prefixes,
            code_root,
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Surviving paths in input order.
    pub async fn filter(&self, candidates: &[String]) -> Result<Vec<PendingFile>, SyncError> {
        let mut pending = Vec::new();
        for path in candidates {
            if is_skipped(path, self.skip_prefixes) {
                trace!(path = %path, "Skipped by prefix");
                continue;
            }

            let local = self.code_root.join(path);
            let meta = tokio::fs::metadata(&local)
                .await
                .map_err(|e| io_err(&local, e))?;
            if meta.is_dir() {
                continue;
            }

            let fingerprint = fingerprint_for(path, &local).await?;
            if !self.force && is_unchanged(self.manifest, path, &fingerprint) {
                trace!(path = %path, "Unchanged since last upload");
                continue;
            }
            pending.push(PendingFile {
                path: path.clone(),
                fingerprint,
            });
        }
        debug!(
            candidates = candidates.len(),
            pending = pending.len(),
            force = self.force,
            "Filtered candidate files"
        );
        Ok(pending)
    }
}
