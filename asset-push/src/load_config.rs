/// `load_config` module: resolves the run configuration from a YAML file, CI inputs and CLI flags.
///
/// This module is the only place where untrusted input is parsed and mapped to the
/// strongly-typed core [`RunConfig`].
///
/// # Sources, lowest precedence first
/// 1. Optional YAML file with camelCase keys (`secretId`, `staticSrcPath`, `skipFiles`, ...)
/// 2. CI inputs passed as `INPUT_<NAME>` environment variables; non-empty values win
/// 3. CLI flags (`--force`, `--concurrency`)
///
/// # Errors
/// All errors use `anyhow::Error` with context and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use asset_push_core::config::{
    Credentials, Destination, RunConfig, DEFAULT_CONCURRENCY, DEFAULT_MANIFEST_FILE_NAME,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Inputs as written in the YAML file or passed by the CI runner.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionInputs {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub env_id: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub target_dir: Option<PathBuf>,
    pub static_src_path: Option<String>,
    pub static_dest_path: Option<String>,
    pub is_force: Option<bool>,
    pub skip_files: Option<Vec<String>>,
    pub asset_file_name: Option<String>,
    pub concurrency: Option<usize>,
}

/// Flags given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub force: bool,
    pub concurrency: Option<usize>,
}

/// Environment variable the CI runner uses for input `name`.
pub fn input_var(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

fn env_input(name: &str) -> Option<String> {
    std::env::var(input_var(name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn set_from_env<T: From<String>>(slot: &mut Option<T>, name: &str) {
    if let Some(v) = env_input(name) {
        *slot = Some(v.into());
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ActionInputs {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        info!(config_path = ?path, "Loading configuration from file");

        let content = match fs::read_to_string(path) {
            Ok(content) => {
                info!(config_path = ?path, "Config file read successfully");
                content
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path, "Failed to read config file");
                return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path, e));
            }
        };

        match serde_yaml::from_str::<Option<Self>>(&content) {
            Ok(inputs) => {
                info!(config_path = ?path, "Parsed config YAML successfully");
                Ok(inputs.unwrap_or_default())
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
                Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
            }
        }
    }

    /// Overlay non-empty `INPUT_*` environment variables.
    pub fn overlay_env(&mut self) -> Result<()> {
        set_from_env(&mut self.secret_id, "secretId");
        set_from_env(&mut self.secret_key, "secretKey");
        set_from_env(&mut self.env_id, "envId");
        set_from_env(&mut self.bucket, "bucket");
        set_from_env(&mut self.region, "region");
        set_from_env(&mut self.endpoint, "endpoint");
        set_from_env(&mut self.target_dir, "targetDir");
        set_from_env(&mut self.static_src_path, "staticSrcPath");
        set_from_env(&mut self.static_dest_path, "staticDestPath");
        set_from_env(&mut self.asset_file_name, "assetFileName");

        if let Some(v) = env_input("isForce") {
            self.is_force = Some(match v.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => bail!("{} must be true or false, got {v:?}", input_var("isForce")),
            });
        }
        if let Some(v) = env_input("skipFiles") {
            let list: Vec<String> = serde_json::from_str(&v).with_context(|| {
                format!("{} must be a JSON array of strings", input_var("skipFiles"))
            })?;
            self.skip_files = Some(list);
        }
        if let Some(v) = env_input("concurrency") {
            let n: usize = v
                .parse()
                .with_context(|| format!("{} must be a positive integer", input_var("concurrency")))?;
            self.concurrency = Some(n);
        }
        Ok(())
    }

    fn destination(&self, workspace: &Path) -> Result<Destination> {
        let endpoint = non_empty(self.endpoint.clone());
        if let Some(env_id) = non_empty(self.env_id.clone()) {
            return Ok(Destination::Hosting { env_id, endpoint });
        }
        match (non_empty(self.bucket.clone()), non_empty(self.region.clone())) {
            (Some(bucket), Some(region)) => {
                return Ok(Destination::ObjectStorage {
                    bucket,
                    region,
                    endpoint,
                })
            }
            (Some(_), None) => bail!("bucket is set but region is missing"),
            (None, Some(_)) => bail!("region is set but bucket is missing"),
            (None, None) => {}
        }
        if let Some(dir) = self.target_dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            return Ok(Destination::LocalDirectory {
                root: workspace.join(dir),
            });
        }
        bail!("no destination configured: set envId, bucket and region, or targetDir")
    }

    /// Resolve into a [`RunConfig`] rooted at `workspace`.
    pub fn into_run_config(self, workspace: &Path, overrides: &CliOverrides) -> Result<RunConfig> {
        let destination = self.destination(workspace)?;
        let static_src_path =
            non_empty(self.static_src_path.clone()).context("staticSrcPath is required")?;

        let config = RunConfig {
            credentials: Credentials {
                secret_id: self.secret_id.unwrap_or_default(),
                secret_key: self.secret_key.unwrap_or_default(),
            },
            destination,
            source_root: workspace.join(static_src_path),
            dest_prefix: self.static_dest_path.unwrap_or_default(),
            force: overrides.force || self.is_force.unwrap_or(false),
            skip_prefixes: self
                .skip_files
                .unwrap_or_default()
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect(),
            concurrency: overrides
                .concurrency
                .or(self.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            manifest_file_name: non_empty(self.asset_file_name)
                .unwrap_or_else(|| DEFAULT_MANIFEST_FILE_NAME.to_string()),
        };
        Ok(config)
    }
}

/// The CI workspace: `GITHUB_WORKSPACE` when set, else the current directory.
pub fn workspace_root() -> Result<PathBuf> {
    match std::env::var_os("GITHUB_WORKSPACE").filter(|v| !v.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => std::env::current_dir().context("failed to determine current directory"),
    }
}

/// Loads the optional YAML file, overlays CI inputs and CLI flags, and returns the run configuration.
pub fn load_config(path: Option<&Path>, overrides: &CliOverrides) -> Result<RunConfig> {
    let mut inputs = match path {
        Some(path) => ActionInputs::from_yaml_file(path)?,
        None => ActionInputs::default(),
    };
    inputs.overlay_env()?;

    let workspace = workspace_root()?;
    let config = inputs.into_run_config(&workspace, overrides)?;
    config.trace_loaded();
    Ok(config)
}
