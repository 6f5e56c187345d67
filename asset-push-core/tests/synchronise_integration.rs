use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use asset_push_core::config::{
    Credentials, Destination, RunConfig, DEFAULT_CONCURRENCY, DEFAULT_MANIFEST_FILE_NAME,
};
use asset_push_core::contract::{
    BackendError, MockFileLister, MockUploadBackend, UploadBackend, UploadReceipt,
};
use asset_push_core::listing::WalkDirLister;
use asset_push_core::{synchronise, SyncError};

/// Bucket held in memory. Uploads listed in `fail_keys` are rejected.
#[derive(Default)]
struct MemoryBackend {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    fail_keys: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    fn fail(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    fn heal(&self) {
        self.fail_keys.lock().unwrap().clear();
    }

    /// Keys uploaded so far, excluding the manifest itself.
    fn uploaded_files(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() != DEFAULT_MANIFEST_FILE_NAME)
            .cloned()
            .collect()
    }

    fn reset_calls(&self) {
        self.uploads.lock().unwrap().clear();
    }

    fn stored_manifest(&self) -> serde_json::Value {
        let objects = self.objects.lock().unwrap();
        let bytes = objects
            .get(DEFAULT_MANIFEST_FILE_NAME)
            .expect("manifest was persisted");
        serde_json::from_slice(bytes).unwrap()
    }
}

#[async_trait]
impl UploadBackend for MemoryBackend {
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadReceipt, BackendError> {
        if self.fail_keys.lock().unwrap().contains(remote_key) {
            return Err(BackendError::Status {
                key: remote_key.to_string(),
                status: 503,
                code: Some("SlowDown".into()),
                message: "try again later".into(),
            });
        }
        let bytes = fs::read(local_path).map_err(|source| BackendError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        self.objects
            .lock()
            .unwrap()
            .insert(remote_key.to_string(), bytes);
        self.uploads.lock().unwrap().push(remote_key.to_string());
        Ok(UploadReceipt {
            location: format!("memory.example.com/{remote_key}"),
            status_code: 200,
        })
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> Result<(), BackendError> {
        let objects = self.objects.lock().unwrap();
        let bytes = objects.get(remote_key).ok_or_else(|| BackendError::NotFound {
            key: remote_key.to_string(),
        })?;
        fs::write(local_path, bytes).map_err(|source| BackendError::Io {
            path: local_path.to_path_buf(),
            source,
        })
    }
}

fn site(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn run_config(root: PathBuf) -> RunConfig {
    RunConfig {
        credentials: Credentials {
            secret_id: "AKIDtest".into(),
            secret_key: "secret".into(),
        },
        destination: Destination::ObjectStorage {
            bucket: "docs-1250000000".into(),
            region: "ap-guangzhou".into(),
            endpoint: None,
        },
        source_root: root,
        dest_prefix: String::new(),
        force: false,
        skip_prefixes: vec![],
        concurrency: DEFAULT_CONCURRENCY,
        manifest_file_name: DEFAULT_MANIFEST_FILE_NAME.to_string(),
    }
}

fn md5_hex(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

#[tokio::test]
async fn first_run_uploads_assets_before_html_and_records_fingerprints() {
    let dir = site(&[("a.js", "var a"), ("b.html", "<b>"), ("c.js", "var c")]);
    let mut config = run_config(dir.path().to_path_buf());
    config.concurrency = 1;
    let backend = MemoryBackend::default();

    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .expect("run succeeds");

    assert_eq!(backend.uploaded_files(), vec!["a.js", "c.js", "b.html"]);
    assert_eq!(report.uploaded, vec!["a.js", "c.js", "b.html"]);
    assert!(report.failed.is_empty());
    assert_eq!(
        backend.stored_manifest(),
        serde_json::json!({"mapv2": {"a.js": 1, "c.js": 1, "b.html": md5_hex("<b>")}})
    );
    assert_eq!(
        report.output_payload(),
        r#"success: ["a.js","c.js","b.html"]"#
    );
}

#[tokio::test]
async fn second_run_without_changes_uploads_nothing() {
    let dir = site(&[
        ("index.html", "<html>home</html>"),
        ("static/app.js", "app"),
        ("static/app.css", "css"),
    ]);
    let config = run_config(dir.path().to_path_buf());
    let backend = MemoryBackend::default();

    let first = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert_eq!(first.uploaded.len(), 3);

    backend.reset_calls();
    let second = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert!(second.uploaded.is_empty());
    assert_eq!(second.planned, 0);
    assert!(backend.uploaded_files().is_empty());
    assert_eq!(second.output_payload(), "success: []");
}

#[tokio::test]
async fn changed_html_is_reuploaded_but_changed_assets_are_not() {
    let dir = site(&[("index.html", "<h1>v1</h1>"), ("app.js", "v1")]);
    let config = run_config(dir.path().to_path_buf());
    let backend = MemoryBackend::default();
    synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();

    fs::write(dir.path().join("index.html"), "<h1>v2</h1>").unwrap();
    fs::write(dir.path().join("app.js"), "v2").unwrap();
    backend.reset_calls();

    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["index.html"]);
    assert_eq!(
        backend.stored_manifest()["mapv2"]["index.html"],
        serde_json::json!(md5_hex("<h1>v2</h1>"))
    );
}

#[tokio::test]
async fn partial_failure_records_only_successes_and_retries_next_run() {
    let dir = site(&[("a.js", "a"), ("b.js", "b")]);
    let mut config = run_config(dir.path().to_path_buf());
    config.dest_prefix = "docs".into();
    let backend = MemoryBackend::default();
    backend.fail("docs/a.js");

    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .expect("per-file failures do not fail the run");
    assert_eq!(report.uploaded, vec!["b.js"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "a.js");
    assert_eq!(report.failed[0].remote_key, "docs/a.js");
    assert!(report.failed[0].error.contains("503"));
    let manifest = backend.stored_manifest();
    assert_eq!(manifest["mapv2"]["b.js"], serde_json::json!(1));
    assert!(manifest["mapv2"].get("a.js").is_none());

    backend.heal();
    backend.reset_calls();
    let retry = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert_eq!(retry.uploaded, vec!["a.js"]);
    assert_eq!(backend.uploaded_files(), vec!["docs/a.js"]);
}

#[tokio::test]
async fn force_uploads_everything_and_rebuilds_manifest() {
    let dir = site(&[("a.js", "a"), ("index.html", "<i>")]);
    let backend = MemoryBackend::default();
    backend.objects.lock().unwrap().insert(
        DEFAULT_MANIFEST_FILE_NAME.to_string(),
        br#"{"mapv2":{"a.js":1,"removed.js":1}}"#.to_vec(),
    );

    let mut config = run_config(dir.path().to_path_buf());
    config.force = true;
    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();

    let mut uploaded = report.uploaded.clone();
    uploaded.sort();
    assert_eq!(uploaded, vec!["a.js", "index.html"]);
    assert_eq!(
        backend.stored_manifest(),
        serde_json::json!({"mapv2": {"a.js": 1, "index.html": md5_hex("<i>")}})
    );
}

#[tokio::test]
async fn skip_prefixes_win_over_manifest_and_force() {
    let dir = site(&[("a.js", "a"), ("drafts/x.html", "<x>"), ("drafts.txt", "t")]);
    let mut config = run_config(dir.path().to_path_buf());
    config.skip_prefixes = vec!["drafts".into()];
    config.force = true;
    let backend = MemoryBackend::default();

    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["a.js"]);
    assert_eq!(backend.uploaded_files(), vec!["a.js"]);
}

#[tokio::test]
async fn existing_manifest_limits_uploads_to_new_files() {
    let dir = site(&[("old.js", "o"), ("new.js", "n")]);
    let mut backend = MockUploadBackend::new();
    backend
        .expect_download_file()
        .times(1)
        .returning(|_, path: &Path| {
            fs::write(path, r#"{"mapv2":{"old.js":1}}"#).unwrap();
            Ok(())
        });
    backend
        .expect_upload_file()
        .withf(|_, key: &str| key == "new.js")
        .times(1)
        .returning(|_, key: &str| {
            Ok(UploadReceipt {
                location: format!("bucket/{key}"),
                status_code: 200,
            })
        });
    backend
        .expect_upload_file()
        .withf(|path: &Path, key: &str| {
            key == DEFAULT_MANIFEST_FILE_NAME && {
                let body = fs::read_to_string(path).unwrap();
                body.contains("old.js") && body.contains("new.js")
            }
        })
        .times(1)
        .returning(|_, key: &str| {
            Ok(UploadReceipt {
                location: format!("bucket/{key}"),
                status_code: 200,
            })
        });

    let config = run_config(dir.path().to_path_buf());
    let report = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["new.js"]);
    assert_eq!(report.manifest_entries, 2);
}

#[tokio::test]
async fn manifest_persist_failure_fails_the_run() {
    let dir = site(&[("a.js", "a")]);
    let mut backend = MockUploadBackend::new();
    backend.expect_download_file().returning(|key: &str, _| {
        Err(BackendError::NotFound {
            key: key.to_string(),
        })
    });
    backend
        .expect_upload_file()
        .returning(|_, key: &str| {
            if key == DEFAULT_MANIFEST_FILE_NAME {
                Err(BackendError::Transport {
                    key: key.to_string(),
                    message: "connection refused".into(),
                })
            } else {
                Ok(UploadReceipt {
                    location: key.to_string(),
                    status_code: 200,
                })
            }
        });

    let config = run_config(dir.path().to_path_buf());
    let err = synchronise(&config, &backend, &WalkDirLister::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ManifestPersist { .. }));
    assert!(err.to_string().contains(DEFAULT_MANIFEST_FILE_NAME));
    assert_eq!(err.uploaded(), ["a.js".to_string()]);
}

#[tokio::test]
async fn config_error_aborts_before_any_backend_call() {
    let dir = site(&[("a.js", "a")]);
    let mut backend = MockUploadBackend::new();
    backend.expect_download_file().never();
    backend.expect_upload_file().never();
    let mut lister = MockFileLister::new();
    lister.expect_list().never();

    let mut config = run_config(dir.path().to_path_buf());
    config.credentials.secret_id.clear();
    let err = synchronise(&config, &backend, &lister).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn lister_directories_are_not_uploaded() {
    let dir = site(&[("img/logo.png", "png")]);
    let mut lister = MockFileLister::new();
    lister
        .expect_list()
        .returning(|_| Ok(vec!["img".to_string(), "img/logo.png".to_string()]));
    let backend = MemoryBackend::default();

    let report = synchronise(&run_config(dir.path().to_path_buf()), &backend, &lister)
        .await
        .unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.uploaded, vec!["img/logo.png"]);
}
