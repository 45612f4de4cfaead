//! TW-005: Environment-resolved endpoints.
//!
//! Each construct records a remote value during cloud contribution and a
//! local value during local contribution. Dependents only ever read
//! `resolved()`, so they never branch on the environment themselves.
//! Emulators only exist locally; their endpoints are `local_only` and refuse
//! to resolve in production.

use super::error::{SynthError, SynthResult};
use super::types::Environment;
use std::cell::OnceCell;

/// An address or identifier that differs between deployment targets.
#[derive(Debug, Clone)]
pub struct Endpoint {
    path: String,
    environment: Environment,
    remote: Option<String>,
    local: Option<String>,
    local_only: bool,
    resolved: OnceCell<String>,
}

impl Endpoint {
    /// An empty endpoint for the construct at `path`.
    pub fn new(path: impl Into<String>, environment: Environment) -> Self {
        Self {
            path: path.into(),
            environment,
            remote: None,
            local: None,
            local_only: false,
            resolved: OnceCell::new(),
        }
    }

    /// Endpoint of a construct with no cloud counterpart.
    pub fn local_only(path: impl Into<String>, environment: Environment) -> Self {
        Self {
            local_only: true,
            ..Self::new(path, environment)
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Set during cloud contribution.
    pub fn set_remote(&mut self, value: impl Into<String>) {
        self.remote = Some(value.into());
        self.resolved = OnceCell::new();
    }

    /// Set during local contribution.
    pub fn set_local(&mut self, value: impl Into<String>) {
        self.local = Some(value.into());
        self.resolved = OnceCell::new();
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Local value in development, remote value in production. Fails until
    /// both sides are set; cached after the first successful read.
    pub fn resolved(&self) -> SynthResult<&str> {
        if let Some(v) = self.resolved.get() {
            return Ok(v);
        }
        if self.local_only {
            return match (self.environment, &self.local) {
                (Environment::Production, _) => Err(SynthError::unsupported(
                    &self.path,
                    "local-only construct has no production endpoint",
                )),
                (Environment::Development, Some(local)) => Ok(self.resolved.get_or_init(|| local.clone())),
                (Environment::Development, None) => Err(SynthError::not_initialized(&self.path, "endpoint")),
            };
        }
        let (Some(remote), Some(local)) = (&self.remote, &self.local) else {
            return Err(SynthError::not_initialized(&self.path, "endpoint"));
        };
        let chosen = match self.environment {
            Environment::Development => local,
            Environment::Production => remote,
        };
        Ok(self.resolved.get_or_init(|| chosen.clone()))
    }
}
