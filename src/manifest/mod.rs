//! TW-007: Local manifest: compose document model, rendering, atomic write.
//!
//! Every service contributed by a construct joins one project and one shared
//! network. The rendered file starts with a two-line banner; documents are
//! joined with `---` separator lines.

use crate::core::error::{SynthError, SynthResult};
use crate::core::types::{DependencyCondition, HealthCheck, RestartPolicy, ServiceSource, ServiceSpec};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Banner written above the generated documents.
pub const BANNER: [&str; 2] = ["# This file is auto-generated.", "# Do not modify directly."];

/// Separator line between documents.
pub const DOCUMENT_SEPARATOR: &str = "---";

#[derive(Debug, Clone)]
struct ServiceEntry {
    spec: ServiceSpec,
    owner: String,
    depends_on: IndexMap<String, DependencyCondition>,
}

/// All services of one local project.
#[derive(Debug, Clone)]
pub struct LocalManifest {
    project: String,
    network: String,
    services: IndexMap<String, ServiceEntry>,
}

impl LocalManifest {
    pub fn new(project: &str, network: &str) -> Self {
        Self {
            project: project.to_string(),
            network: network.to_string(),
            services: IndexMap::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Register a service owned by the construct at `owner`.
    pub fn add_service(&mut self, spec: ServiceSpec, owner: &str) -> SynthResult<()> {
        if self.services.contains_key(&spec.name) {
            return Err(SynthError::DuplicateId {
                parent: format!("project {}", self.project),
                id: spec.name,
            });
        }
        debug!(service = %spec.name, owner, "adding local service");
        self.services.insert(
            spec.name.clone(),
            ServiceEntry {
                spec,
                owner: owner.to_string(),
                depends_on: IndexMap::new(),
            },
        );
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name).map(|e| &e.spec)
    }

    /// Construct path that contributed `name`.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(|e| e.owner.as_str())
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Dependencies declared by `name`, in declaration order.
    pub fn dependencies(&self, name: &str) -> Vec<(&str, DependencyCondition)> {
        self.services
            .get(name)
            .map(|e| e.depends_on.iter().map(|(k, c)| (k.as_str(), *c)).collect())
            .unwrap_or_default()
    }

    /// Record that `dependent` waits for `dependency` under `condition`.
    /// A `healthy` condition requires a health check on the dependency.
    pub fn add_dependency(
        &mut self,
        dependent: &str,
        dependency: &str,
        condition: DependencyCondition,
    ) -> SynthResult<()> {
        if dependent == dependency {
            return Err(SynthError::unsupported(
                self.owner(dependent).unwrap_or(dependent),
                "a service cannot depend on itself",
            ));
        }
        let target = self
            .services
            .get(dependency)
            .ok_or_else(|| SynthError::not_initialized(dependency, "local service"))?;
        if condition == DependencyCondition::Healthy && target.spec.health_check.is_none() {
            return Err(SynthError::MissingHealthCheck {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }
        let entry = self
            .services
            .get_mut(dependent)
            .ok_or_else(|| SynthError::not_initialized(dependent, "local service"))?;
        if let Some(previous) = entry.depends_on.insert(dependency.to_string(), condition) {
            if previous != condition {
                warn!(
                    dependent,
                    dependency,
                    %previous,
                    %condition,
                    "dependency condition replaced"
                );
            }
        }
        Ok(())
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.services.values().map(|e| e.depends_on.len()).sum()
    }

    /// Render the banner plus the project document.
    pub fn render(&self) -> SynthResult<String> {
        let doc = serde_yaml_ng::to_string(&self.document())?;
        Ok(render_documents(&[doc]))
    }

    fn document(&self) -> ComposeDocument<'_> {
        let services = self
            .services
            .iter()
            .map(|(name, entry)| (name.as_str(), self.compose_service(entry)))
            .collect();
        let mut networks = IndexMap::new();
        networks.insert(self.network.as_str(), ComposeNetwork {});
        ComposeDocument {
            name: &self.project,
            services,
            networks,
        }
    }

    fn compose_service<'a>(&'a self, entry: &'a ServiceEntry) -> ComposeService<'a> {
        let spec = &entry.spec;
        let (image, build) = match &spec.source {
            ServiceSource::Image { image, tag } => (
                Some(match tag {
                    Some(t) => format!("{}:{}", image, t),
                    None => image.clone(),
                }),
                None,
            ),
            ServiceSource::Build { context } => (None, Some(ComposeBuild { context })),
        };
        let mut networks = IndexMap::new();
        networks.insert(
            self.network.as_str(),
            ComposeAttachment {
                aliases: &spec.aliases,
            },
        );
        ComposeService {
            image,
            build,
            user: spec.user.as_deref(),
            entrypoint: spec.entrypoint.as_deref(),
            command: spec.command.as_deref(),
            working_dir: spec.working_dir.as_deref(),
            environment: &spec.environment,
            ports: &spec.ports,
            volumes: &spec.volumes,
            networks,
            healthcheck: spec.health_check.as_ref(),
            restart: spec.restart,
            depends_on: entry
                .depends_on
                .iter()
                .map(|(k, c)| (k.as_str(), ComposeCondition { condition: *c }))
                .collect(),
        }
    }
}

/// Banner followed by `docs`, separated by `---` lines.
pub fn render_documents(docs: &[String]) -> String {
    let mut out = String::new();
    for line in BANNER {
        out.push_str(line);
        out.push('\n');
    }
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str(DOCUMENT_SEPARATOR);
            out.push('\n');
        }
        out.push_str(doc);
        if !doc.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Write the manifest atomically (temp file, then rename). Parent
/// directories are created.
pub fn write_manifest(path: &Path, content: &str) -> SynthResult<()> {
    let io_err = |source| SynthError::ManifestWrite {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let tmp_path = path.with_extension("yml.tmp");
    std::fs::write(&tmp_path, content).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

// ============================================================================
// Compose serialization
// ============================================================================

#[derive(Serialize)]
struct ComposeDocument<'a> {
    name: &'a str,
    services: IndexMap<&'a str, ComposeService<'a>>,
    networks: IndexMap<&'a str, ComposeNetwork>,
}

#[derive(Serialize)]
struct ComposeNetwork {}

#[derive(Serialize)]
struct ComposeBuild<'a> {
    context: &'a str,
}

#[derive(Serialize)]
struct ComposeAttachment<'a> {
    #[serde(skip_serializing_if = "is_empty_slice")]
    aliases: &'a [String],
}

#[derive(Serialize)]
struct ComposeCondition {
    condition: DependencyCondition,
}

#[derive(Serialize)]
struct ComposeService<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<ComposeBuild<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entrypoint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_env")]
    environment: &'a IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    ports: &'a [crate::core::types::PortMapping],
    #[serde(skip_serializing_if = "is_empty_slice")]
    volumes: &'a [crate::core::types::VolumeMount],
    networks: IndexMap<&'a str, ComposeAttachment<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<&'a HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restart: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    depends_on: IndexMap<&'a str, ComposeCondition>,
}

fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

fn is_empty_env(env: &&IndexMap<String, String>) -> bool {
    env.is_empty()
}
