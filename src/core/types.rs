//! TW-001: Shared types: environment, service descriptions, health checks,
//! dependency conditions.
//!
//! These are the values that flow from concrete constructs into the local
//! manifest and the cloud template. Everything here is plain data.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Environment
// ============================================================================

/// Deployment target selected for one synthesis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Parse the free-form environment flag. Any case-insensitive `prod`
    /// prefix selects production, everything else development.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().to_ascii_lowercase().starts_with("prod") {
            Self::Production
        } else {
            Self::Development
        }
    }

    /// Resolve from the `ENV` process variable.
    pub fn from_env() -> Self {
        std::env::var("ENV")
            .map(|v| Self::from_flag(&v))
            .unwrap_or_default()
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

// ============================================================================
// Dependency conditions
// ============================================================================

/// When a dependent local service may start relative to its dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyCondition {
    #[serde(rename = "service_started")]
    Started,
    #[serde(rename = "service_healthy")]
    Healthy,
    #[serde(rename = "service_completed_successfully")]
    CompletedSuccessfully,
}

impl DependencyCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "service_started",
            Self::Healthy => "service_healthy",
            Self::CompletedSuccessfully => "service_completed_successfully",
        }
    }
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Health checks
// ============================================================================

/// Container health check. Required before a `healthy` condition can be
/// declared against a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Probe command, e.g. `["CMD-SHELL", "pg_isready"]`
    pub test: Vec<String>,

    /// Time between probes
    pub interval: String,

    /// Time before a single probe is considered failed
    pub timeout: String,

    /// Consecutive failures before the service is unhealthy
    pub retries: u32,

    /// Grace period during startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
}

impl HealthCheck {
    /// A shell-form probe with the default cadence (10s / 5s / 5 retries).
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            test: vec!["CMD-SHELL".to_string(), command.into()],
            interval: "10s".to_string(),
            timeout: "5s".to_string(),
            retries: 5,
            start_period: None,
        }
    }

    /// An exec-form probe (`["CMD", arg0, arg1, ...]`).
    pub fn exec<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut test = vec!["CMD".to_string()];
        test.extend(args.into_iter().map(Into::into));
        Self {
            test,
            ..Self::shell(String::new())
        }
    }

    pub fn interval(mut self, interval: &str) -> Self {
        self.interval = interval.to_string();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.timeout = timeout.to_string();
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn start_period(mut self, period: &str) -> Self {
        self.start_period = Some(period.to_string());
        self
    }
}

// ============================================================================
// Service description
// ============================================================================

/// Host-to-container port publication. Serializes as `"host:container"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}:{}", self.host, self.container))
    }
}

/// Bind mount. Serializes as `"source:target"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

impl Serialize for VolumeMount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}:{}", self.source, self.target))
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestartPolicy {
    #[serde(rename = "no")]
    No,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
}

/// Where a service's container comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSource {
    /// Pull `image[:tag]`
    Image { image: String, tag: Option<String> },
    /// Build from a context directory (relative to the manifest)
    Build { context: String },
}

/// One service entry contributed by a construct to the local manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service name, unique within the project
    pub name: String,
    pub source: ServiceSource,
    pub command: Option<String>,
    pub entrypoint: Option<String>,
    pub environment: IndexMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    /// Network aliases on the shared project network
    pub aliases: Vec<String>,
    pub health_check: Option<HealthCheck>,
    pub restart: Option<RestartPolicy>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
}

impl ServiceSpec {
    fn with_source(name: impl Into<String>, source: ServiceSource) -> Self {
        Self {
            name: name.into(),
            source,
            command: None,
            entrypoint: None,
            environment: IndexMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            aliases: Vec::new(),
            health_check: None,
            restart: None,
            working_dir: None,
            user: None,
        }
    }

    /// A service running a published image.
    pub fn image(name: impl Into<String>, image: &str, tag: Option<&str>) -> Self {
        Self::with_source(
            name,
            ServiceSource::Image {
                image: image.to_string(),
                tag: tag.map(str::to_string),
            },
        )
    }

    /// A service built from a local context directory.
    pub fn build(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::with_source(
            name,
            ServiceSource::Build {
                context: context.into(),
            },
        )
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortMapping { host, container });
        self
    }

    pub fn volume(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn health_check(mut self, check: HealthCheck) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = Some(policy);
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

// ============================================================================
// Local cloud emulation constants
// ============================================================================

/// Region used by local emulators and local ARNs.
pub const LOCAL_AWS_REGION: &str = "us-east-1";
/// Account id used by local emulators and local ARNs.
pub const LOCAL_AWS_ACCOUNT_ID: &str = "123456789012";
pub const LOCAL_AWS_ACCESS_KEY_ID: &str = "testAccessKey";
pub const LOCAL_AWS_SECRET_ACCESS_KEY: &str = "testSecretAccessKey";

/// Format an ARN in the local emulation account.
pub fn local_arn(service: &str, resource: &str) -> String {
    format!(
        "arn:aws:{}:{}:{}:{}",
        service, LOCAL_AWS_REGION, LOCAL_AWS_ACCOUNT_ID, resource
    )
}

// ============================================================================
// Tests
// ============================================================================
