//! TW-010: App configuration: defaults, process environment, `twinform.yaml`.
//!
//! Precedence: built-in defaults, then the process environment, then the
//! config file, then CLI flags (applied by the caller).

use super::error::{SynthError, SynthResult};
use super::naming;
use super::session::HistoryMode;
use super::types::Environment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default manifest location, relative to the project root.
pub const DEFAULT_MANIFEST_PATH: &str = "docker/docker-compose.yml";
/// Default cloud output directory, relative to the project root.
pub const DEFAULT_CLOUD_OUT_DIR: &str = "cdk.out";
pub const DEFAULT_PROJECT: &str = "twinform";

/// Resolved settings for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    /// Project root; relative paths resolve against it
    pub root_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub cloud_out_dir: PathBuf,
    /// Compose project name
    pub project_name: String,
    /// Shared network every local service joins
    pub network_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub history: HistoryMode,
}

impl AppConfig {
    /// Defaults rooted at `root_dir`.
    pub fn for_root(root_dir: &Path, environment: Environment) -> Self {
        Self {
            environment,
            root_dir: root_dir.to_path_buf(),
            manifest_path: root_dir.join(DEFAULT_MANIFEST_PATH),
            cloud_out_dir: root_dir.join(DEFAULT_CLOUD_OUT_DIR),
            project_name: DEFAULT_PROJECT.to_string(),
            network_name: format!("{}-network", DEFAULT_PROJECT),
            account: None,
            region: None,
            history: HistoryMode::default(),
        }
    }

    /// Defaults rooted at the working directory, with `ENV`,
    /// `CDK_DEFAULT_ACCOUNT` and `CDK_DEFAULT_REGION` applied.
    pub fn from_env() -> SynthResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| SynthError::Config(format!("cannot read working directory: {}", e)))?;
        let mut config = Self::for_root(&cwd, Environment::from_env());
        config.account = std::env::var("CDK_DEFAULT_ACCOUNT").ok().filter(|v| !v.is_empty());
        config.region = std::env::var("CDK_DEFAULT_REGION").ok().filter(|v| !v.is_empty());
        Ok(config)
    }

    /// Overlay values present in a config file.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(ref env) = file.environment {
            self.environment = Environment::from_flag(env);
        }
        if let Some(ref p) = file.manifest {
            self.manifest_path = self.resolve(p);
        }
        if let Some(ref p) = file.cloud_out {
            self.cloud_out_dir = self.resolve(p);
        }
        if let Some(ref project) = file.project {
            self.project_name.clone_from(project);
            if file.network.is_none() {
                self.network_name = format!("{}-network", project);
            }
        }
        if let Some(ref network) = file.network {
            self.network_name.clone_from(network);
        }
        if file.account.is_some() {
            self.account.clone_from(&file.account);
        }
        if file.region.is_some() {
            self.region.clone_from(&file.region);
        }
        if let Some(history) = file.history {
            self.history = history;
        }
    }

    /// `path` against the project root unless already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Directory holding the manifest; volume sources are relative to it.
    pub fn manifest_dir(&self) -> PathBuf {
        let manifest = self.resolve(&self.manifest_path);
        manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root_dir.clone())
    }
}

// ============================================================================
// twinform.yaml
// ============================================================================

/// On-disk configuration. Every field but `version` is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Free-form environment flag (`prod*` selects production)
    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub manifest: Option<PathBuf>,

    #[serde(default)]
    pub cloud_out: Option<PathBuf>,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub history: Option<HistoryMode>,
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> SynthResult<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SynthError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse a config file from a string.
pub fn parse_config(yaml: &str) -> SynthResult<ConfigFile> {
    serde_yaml_ng::from_str(yaml).map_err(|e| SynthError::Config(format!("YAML parse error: {}", e)))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &ConfigFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    for (field, value) in [("project", &config.project), ("network", &config.network)] {
        if let Some(v) = value {
            if naming::validate_id(v).is_err() {
                errors.push(ValidationError {
                    message: format!("{} '{}' is not a valid name", field, v),
                });
            }
        }
    }

    if let Some(ref manifest) = config.manifest {
        let ext = manifest.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("yml") | Some("yaml")) {
            errors.push(ValidationError {
                message: format!("manifest '{}' must end in .yml or .yaml", manifest.display()),
            });
        }
    }

    if let Some(ref region) = config.region {
        if region.is_empty() || region.contains(char::is_whitespace) {
            errors.push(ValidationError {
                message: format!("region '{}' is not valid", region),
            });
        }
    }

    errors
}

/// Starter file written by `twinform init`.
pub const CONFIG_TEMPLATE: &str = r#"version: "1.0"
# environment: development
project: twinform
manifest: docker/docker-compose.yml
cloud_out: cdk.out
history: reset
"#;
