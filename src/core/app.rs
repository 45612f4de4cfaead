//! TW-013: The app: root of the construct tree and driver of synthesis.
//!
//! Synthesis runs once per session:
//! 1. validate local service ordering (cycles abort),
//! 2. mirror same-stack edges into cloud `DependsOn`,
//! 3. render and atomically write the local manifest,
//! 4. hand the stacks to the cloud synthesizer.

use super::config::AppConfig;
use super::construct::Scope;
use super::error::{SynthError, SynthResult};
use super::naming;
use super::scope::{NodeId, NodeKind, ScopeTree};
use super::session::Session;
use super::types::{Environment, ServiceSpec};
use super::wiring::{self, DependencyEdge};
use crate::cloud::{CloudStack, CloudSynthesizer, TemplateWriter};
use crate::manifest::{self, LocalManifest};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Root id of every construct tree.
pub const APP_ID: &str = "App";

/// What one synthesis run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub manifest: PathBuf,
    pub templates: Vec<PathBuf>,
    /// Service names in start order
    pub service_order: Vec<String>,
}

/// Root of the construct tree.
pub struct App {
    config: AppConfig,
    pub(crate) session: Session,
    pub(crate) tree: ScopeTree,
    pub(crate) manifest: LocalManifest,
    pub(crate) stacks: IndexMap<NodeId, CloudStack>,
    pub(crate) edges: Vec<DependencyEdge>,
    synthesizer: Box<dyn CloudSynthesizer>,
    artifacts: Option<Artifacts>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("environment", &self.config.environment)
            .field("nodes", &self.tree.len())
            .field("services", &self.manifest.len())
            .field("stacks", &self.stacks.len())
            .field("session", &self.session)
            .finish()
    }
}

impl App {
    /// App with a fresh session and the template-file synthesizer.
    pub fn new(config: AppConfig) -> Self {
        Self::with_session(config, Session::new())
    }

    /// App reusing a previous session, recycled per `config.history`.
    pub fn with_session(config: AppConfig, session: Session) -> Self {
        let session = session.recycle(config.history);
        let manifest = LocalManifest::new(&config.project_name, &config.network_name);
        let synthesizer = Box::new(TemplateWriter::new(&config.resolve(&config.cloud_out_dir)));
        Self {
            config,
            session,
            tree: ScopeTree::new(APP_ID),
            manifest,
            stacks: IndexMap::new(),
            edges: Vec::new(),
            synthesizer,
            artifacts: None,
        }
    }

    /// Replace the cloud synthesizer.
    pub fn with_synthesizer(mut self, synthesizer: Box<dyn CloudSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Declare a stack and return a scope for its constructs.
    pub fn stack(&mut self, id: &str) -> SynthResult<Scope<'_>> {
        self.session.ensure_declaring(id)?;
        let node = self.tree.add_child(self.tree.root(), id, NodeKind::Stack)?;
        let stack = CloudStack::new(id, self.config.account.clone(), self.config.region.clone());
        self.stacks.insert(node, stack);
        info!(stack = id, "declared stack");
        Ok(Scope::new(self, node, node))
    }

    /// Scope of an already declared stack.
    pub fn open_stack(&mut self, id: &str) -> SynthResult<Scope<'_>> {
        let node = self
            .tree
            .child(self.tree.root(), id)
            .filter(|n| self.tree.node(*n).kind == NodeKind::Stack)
            .ok_or_else(|| SynthError::not_initialized(id, "stack"))?;
        Ok(Scope::new(self, node, node))
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn manifest(&self) -> &LocalManifest {
        &self.manifest
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn cloud_stack(&self, id: &str) -> Option<&CloudStack> {
        self.stacks.values().find(|s| s.name == id)
    }

    pub fn cloud_stacks(&self) -> impl Iterator<Item = &CloudStack> {
        self.stacks.values()
    }

    /// Result of the last `synthesize()`, if it succeeded.
    pub fn artifacts(&self) -> Option<&Artifacts> {
        self.artifacts.as_ref()
    }

    /// Local service owned by a construct node.
    pub fn local_service(&self, node: NodeId) -> SynthResult<&ServiceSpec> {
        let name = self.tree.service(node)?;
        self.manifest
            .service(name)
            .ok_or_else(|| SynthError::not_initialized(&self.tree.node(node).path, "local service"))
    }

    /// Host path as a volume source relative to the manifest directory.
    pub fn volume_source(&self, path: &Path) -> String {
        let target = self.config.resolve(path);
        let rel = naming::relative_path(&self.config.manifest_dir(), &target);
        let rel = rel.to_string_lossy();
        if rel.starts_with("..") || rel.starts_with('/') {
            rel.into_owned()
        } else {
            format!("./{}", rel)
        }
    }

    /// Render the manifest without writing it.
    pub fn render_manifest(&self) -> SynthResult<String> {
        self.manifest.render()
    }

    /// Produce both artifacts. Callable once per session.
    pub fn synthesize(&mut self) -> SynthResult<&Artifacts> {
        self.session.begin_synthesis()?;

        let service_order = wiring::service_order(&self.manifest)?;
        wiring::apply_cloud_ordering(self);

        let manifest_path = self.config.resolve(&self.config.manifest_path);
        let rendered = self.manifest.render()?;
        manifest::write_manifest(&manifest_path, &rendered)?;
        info!(
            path = %manifest_path.display(),
            services = self.manifest.len(),
            edges = self.manifest.edge_count(),
            "wrote local manifest"
        );

        let stacks: Vec<&CloudStack> = self.stacks.values().collect();
        let templates = self.synthesizer.synthesize(&stacks).map_err(SynthError::Cloud)?;

        self.session.finish_synthesis();
        info!(
            stacks = self.stacks.len(),
            services = service_order.len(),
            runs = self.session.runs(),
            "synthesis complete"
        );
        Ok(self.artifacts.insert(Artifacts {
            manifest: manifest_path,
            templates,
            service_order,
        }))
    }

    /// Give the session back for the next app.
    pub fn into_session(self) -> Session {
        self.session
    }

    pub(crate) fn register_service(&mut self, node: NodeId, spec: ServiceSpec) -> SynthResult<()> {
        let name = spec.name.clone();
        let path = self.tree.node(node).path.clone();
        self.tree.set_service(node, &name)?;
        self.manifest.add_service(spec, &path)
    }
}
