//! Bounded-concurrency upload of a plan.
//!
//! Uploads are multiplexed on the calling task with `buffer_unordered`: at most
//! `concurrency` calls are in flight, the rest wait for a free slot. A failed
//! upload is recorded in its [`UploadOutcome`] and the batch carries on, so every
//! planned file is attempted exactly once.

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::contract::{BackendError, UploadBackend, UploadReceipt};
use crate::manifest::Fingerprint;
use crate::sequence::CandidateFile;

/// Result of one upload attempt.
#[derive(Debug)]
pub struct UploadOutcome {
    pub relative_path: String,
    pub remote_key: String,
    /// Fingerprint to record if the upload succeeded.
    pub fingerprint: Fingerprint,
    pub result: Result<UploadReceipt, BackendError>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct UploadOrchestrator<'a, B: UploadBackend + ?Sized> {
    backend: &'a B,
    concurrency: usize,
}

impl<'a, B: UploadBackend + ?Sized> UploadOrchestrator<'a, B> {
    pub fn new(backend: &'a B, concurrency: usize) -> Self {
        Self {
            backend,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every file in `plan`. Outcomes come back in completion order.
    pub async fn run(&self, plan: Vec<CandidateFile>) -> Vec<UploadOutcome> {
        info!(files = plan.len(), concurrency = self.concurrency, "Starting uploads");
        let outcomes: Vec<UploadOutcome> = stream::iter(plan)
            .map(|candidate| self.upload_one(candidate))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            uploaded = outcomes.len() - failed,
            failed,
            "Finished uploads"
        );
        outcomes
    }

    async fn upload_one(&self, candidate: CandidateFile) -> UploadOutcome {
        let result = self
            .backend
            .upload_file(&candidate.local_path, &candidate.remote_key)
            .await;
        match &result {
            Ok(receipt) => info!(
                location = %receipt.location,
                status = receipt.status_code,
                "Uploaded"
            ),
            Err(e) => error!(
                key = %candidate.remote_key,
                status = ?e.status_code(),
                code = ?e.code(),
                error = %e,
                "Upload failed"
            ),
        }
        UploadOutcome {
            relative_path: candidate.relative_path,
            remote_key: candidate.remote_key,
            fingerprint: candidate.fingerprint,
            result,
        }
    }
}
