//! Manifest — the persisted record of what previous runs uploaded.
//!
//! Wire format: `{"mapv2": {"<relative path>": 1 | "<md5 hex>"}}`. Assets are
//! recorded with the marker `1`; HTML entry points with the MD5 of their bytes so
//! they are re-uploaded whenever their content changes.
//!
//! The manifest lives next to the published files under a well-known key. It is
//! staged through a scratch file inside a [`TempDir`] owned by [`ManifestStore`],
//! so the scratch copy disappears on every exit path.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::contract::{BackendError, UploadBackend};
use crate::error::{io_err, SyncError};

/// Per-file upload state recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fingerprint {
    /// Uploaded; content is not tracked. Written as the integer `1`.
    Marker(u64),
    /// Hex MD5 of the content that was uploaded.
    Hash(String),
}

impl Fingerprint {
    pub const UPLOADED: Fingerprint = Fingerprint::Marker(1);

    pub fn of_content(bytes: &[u8]) -> Self {
        Fingerprint::Hash(format!("{:x}", md5::compute(bytes)))
    }
}

/// Whether `path` is tracked by content rather than by presence.
pub fn is_html(path: &str) -> bool {
    Path::new(path).extension() == Some(OsStr::new("html"))
}

/// Compute the fingerprint the manifest should hold for `relative_path` once
/// uploaded. Reads the file only for HTML.
pub async fn fingerprint_for(relative_path: &str, local_path: &Path) -> Result<Fingerprint, SyncError> {
    if !is_html(relative_path) {
        return Ok(Fingerprint::UPLOADED);
    }
    let bytes = tokio::fs::read(local_path)
        .await
        .map_err(|e| io_err(local_path, e))?;
    Ok(Fingerprint::of_content(&bytes))
}

/// In-memory manifest: relative path -> fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    #[serde(rename = "mapv2")]
    entries: HashMap<String, Fingerprint>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    mapv2: Option<HashMap<String, Fingerprint>>,
    #[serde(default)]
    map: Option<serde_json::Value>,
}

impl Manifest {
    pub fn get(&self, path: &str) -> Option<&Fingerprint> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn record(&mut self, path: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(path.into(), fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a fetched manifest. A legacy array-shaped `map` is not migrated.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let file: ManifestFile = serde_json::from_slice(bytes)?;
        if file.mapv2.is_none() && file.map.is_some() {
            warn!("Manifest only has the legacy `map` field; ignoring it");
        }
        Ok(Manifest {
            entries: file.mapv2.unwrap_or_default(),
        })
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromIterator<(String, Fingerprint)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, Fingerprint)>>(iter: I) -> Self {
        Manifest {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Loads the manifest at run start and persists it at run end.
pub struct ManifestStore<'a, B: UploadBackend + ?Sized> {
    backend: &'a B,
    key: String,
    force: bool,
    scratch: TempDir,
}

impl<'a, B: UploadBackend + ?Sized> ManifestStore<'a, B> {
    pub fn new(backend: &'a B, key: impl Into<String>, force: bool) -> Result<Self, SyncError> {
        let scratch = tempfile::Builder::new()
            .prefix("asset-push-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        Ok(Self {
            backend,
            key: key.into(),
            force,
            scratch,
        })
    }

    /// Directory holding the scratch copy; removed when the store is dropped.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn scratch_file(&self) -> PathBuf {
        let name = Path::new(&self.key)
            .file_name()
            .unwrap_or_else(|| OsStr::new("manifest.json"));
        self.scratch.path().join(name)
    }

    /// Fetch the stored manifest. Never fails: a missing, unreachable or
    /// unreadable manifest yields an empty one, as does force mode.
    pub async fn load(&self) -> Manifest {
        if self.force {
            info!(key = %self.key, "Force mode: starting from an empty manifest");
            return Manifest::default();
        }

        let path = self.scratch_file();
        if let Err(e) = self.backend.download_file(&self.key, &path).await {
            match &e {
                BackendError::NotFound { .. } => {
                    info!(key = %self.key, "No manifest found, treating as first run")
                }
                other => warn!(
                    key = %self.key,
                    status = ?other.status_code(),
                    code = ?other.code(),
                    error = %other,
                    "Failed to fetch manifest, uploading as if none existed"
                ),
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %e, "No partial manifest download to remove");
            }
            return Manifest::default();
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "Failed to read downloaded manifest");
                return Manifest::default();
            }
        };
        match Manifest::from_slice(&bytes) {
            Ok(manifest) => {
                info!(key = %self.key, entries = manifest.len(), "Loaded manifest");
                manifest
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Manifest is not valid JSON, ignoring it");
                Manifest::default()
            }
        }
    }

    /// Write `manifest` to the scratch file and upload it under the manifest key.
    pub async fn save(&self, manifest: &Manifest) -> Result<(), SyncError> {
        let path = self.scratch_file();
        let json = manifest.to_json()?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_err(&path, e))?;
        debug!(path = %path.display(), entries = manifest.len(), "Wrote manifest scratch file");

        let receipt = self
            .backend
            .upload_file(&path, &self.key)
            .await
            .map_err(|source| SyncError::ManifestPersist {
                key: self.key.clone(),
                source,
                uploaded: Vec::new(),
            })?;
        info!(
            location = %receipt.location,
            status = receipt.status_code,
            entries = manifest.len(),
            "Persisted manifest"
        );
        Ok(())
    }
}
