#![doc = "Concrete upload backends: bridges the core `UploadBackend` trait to real destinations."]
//
//! # Upload backends (CLI <-> Core)
//!
//! The core pipeline only knows the [`UploadBackend`] trait. This module provides
//! the implementations the CLI selects from, once, based on the configured
//! [`Destination`]:
//!
//! - [`HttpBackend`] for object storage (`bucket` + `region`) and static hosting
//!   (`envId`). Objects are written with an authenticated `PUT {endpoint}/{key}`
//!   and read back with `GET`. Credentials travel as HTTP basic auth.
//! - [`LocalDirBackend`] mirrors everything into a directory on disk.
//!
//! [`Backend`] wraps whichever one was chosen so the pipeline gets a single
//! concrete type.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use asset_push_core::config::{Credentials, Destination, RunConfig};
use asset_push_core::contract::{BackendError, UploadBackend, UploadReceipt};

/// Response headers that carry a service-specific error code.
const ERROR_CODE_HEADERS: [&str; 2] = ["x-cos-error-code", "x-error-code"];

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

pub fn object_storage_endpoint(bucket: &str, region: &str) -> String {
    format!("https://{bucket}.cos.{region}.myqcloud.com")
}

pub fn hosting_endpoint(env_id: &str) -> String {
    format!("https://{env_id}.tcloudbaseapp.com")
}

/// `Content-Type` to send for a key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Object storage or static hosting reached over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl HttpBackend {
    pub fn object_storage(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        credentials: Credentials,
    ) -> Result<Self> {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| object_storage_endpoint(bucket, region));
        tracing::info!(bucket, region, endpoint = %endpoint, "Using object storage backend");
        Self::new(&endpoint, credentials)
    }

    pub fn hosting(env_id: &str, endpoint: Option<&str>, credentials: Credentials) -> Result<Self> {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| hosting_endpoint(env_id));
        tracing::info!(env_id, endpoint = %endpoint, "Using static hosting backend");
        Self::new(&endpoint, credentials)
    }

    fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        let base_url =
            Url::parse(endpoint).with_context(|| format!("invalid endpoint URL {endpoint:?}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("endpoint {endpoint:?} cannot be used as a base URL");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("asset-push/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// URL of `key`, each `/`-separated segment percent-encoded.
    pub fn object_url(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(key.split('/'));
        }
        url
    }

    fn transport(key: &str, e: reqwest::Error) -> BackendError {
        BackendError::Transport {
            key: key.to_string(),
            message: e.to_string(),
        }
    }

    async fn status_error(key: &str, resp: reqwest::Response) -> BackendError {
        let status = resp.status();
        let code = ERROR_CODE_HEADERS
            .iter()
            .find_map(|h| resp.headers().get(*h))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut message = resp.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        BackendError::Status {
            key: key.to_string(),
            status: status.as_u16(),
            code,
            message,
        }
    }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadReceipt, BackendError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| BackendError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        let url = self.object_url(remote_key);
        tracing::debug!(url = %url, bytes = body.len(), "PUT object");

        let resp = self
            .client
            .put(url.clone())
            .basic_auth(&self.credentials.secret_id, Some(&self.credentials.secret_key))
            .header(reqwest::header::CONTENT_TYPE, content_type_for(remote_key))
            .body(body)
            .send()
            .await
            .map_err(|e| Self::transport(remote_key, e))?;

        if !resp.status().is_success() {
            return Err(Self::status_error(remote_key, resp).await);
        }
        Ok(UploadReceipt {
            location: url.to_string(),
            status_code: resp.status().as_u16(),
        })
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> Result<(), BackendError> {
        let url = self.object_url(remote_key);
        tracing::debug!(url = %url, "GET object");

        let resp = self
            .client
            .get(url)
            .basic_auth(&self.credentials.secret_id, Some(&self.credentials.secret_key))
            .send()
            .await
            .map_err(|e| Self::transport(remote_key, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound {
                key: remote_key.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(Self::status_error(remote_key, resp).await);
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::transport(remote_key, e))?;
        tokio::fs::write(local_path, &bytes)
            .await
            .map_err(|source| BackendError::Io {
                path: local_path.to_path_buf(),
                source,
            })
    }
}

/// Publishes into a directory on the local filesystem.
pub struct LocalDirBackend {
    root: PathBuf,
}

impl LocalDirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl UploadBackend for LocalDirBackend {
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadReceipt, BackendError> {
        let dest = self.object_path(remote_key);
        let io = |path: &Path, source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io(parent, e))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| io(local_path, e))?;
        Ok(UploadReceipt {
            location: dest.display().to_string(),
            status_code: 200,
        })
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> Result<(), BackendError> {
        let src = self.object_path(remote_key);
        match tokio::fs::copy(&src, local_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackendError::NotFound {
                key: remote_key.to_string(),
            }),
            Err(source) => Err(BackendError::Io { path: src, source }),
        }
    }
}

/// The backend chosen for this run.
pub enum Backend {
    Http(HttpBackend),
    Local(LocalDirBackend),
}

impl Backend {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let backend = match &config.destination {
            Destination::ObjectStorage {
                bucket,
                region,
                endpoint,
            } => Backend::Http(HttpBackend::object_storage(
                bucket,
                region,
                endpoint.as_deref(),
                config.credentials.clone(),
            )?),
            Destination::Hosting { env_id, endpoint } => Backend::Http(HttpBackend::hosting(
                env_id,
                endpoint.as_deref(),
                config.credentials.clone(),
            )?),
            Destination::LocalDirectory { root } => {
                tracing::info!(root = %root.display(), "Using local directory backend");
                Backend::Local(LocalDirBackend::new(root.clone()))
            }
        };
        Ok(backend)
    }
}

#[async_trait]
impl UploadBackend for Backend {
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadReceipt, BackendError> {
        match self {
            Backend::Http(b) => b.upload_file(local_path, remote_key).await,
            Backend::Local(b) => b.upload_file(local_path, remote_key).await,
        }
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> Result<(), BackendError> {
        match self {
            Backend::Http(b) => b.download_file(remote_key, local_path).await,
            Backend::Local(b) => b.download_file(remote_key, local_path).await,
        }
    }
}
