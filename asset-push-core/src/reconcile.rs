//! Fold upload outcomes back into the manifest.

use tracing::debug;

use crate::manifest::Manifest;
use crate::orchestrate::UploadOutcome;

/// Record each successful upload in `manifest` and return the uploaded paths in
/// outcome order. Failed uploads leave the manifest untouched for their path so
/// the next run retries them.
pub fn apply(outcomes: &[UploadOutcome], manifest: &mut Manifest) -> Vec<String> {
    let mut changed = Vec::new();
    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        manifest.record(outcome.relative_path.clone(), outcome.fingerprint.clone());
        changed.push(outcome.relative_path.clone());
    }
    debug!(
        recorded = changed.len(),
        skipped = outcomes.len() - changed.len(),
        entries = manifest.len(),
        "Reconciled manifest"
    );
    changed
}
