//! TW-011: Resource constructs and the construction context.
//!
//! A construct is declared through a `Scope`, which carries the app, the
//! owning stack and the parent node explicitly. Declaring one:
//!
//! 1. attaches a node (duplicate sibling ids fail) and derives its short id,
//! 2. runs the cloud contribution,
//! 3. runs the local contribution, which may return one service,
//! 4. registers that service and any edges requested from it.
//!
//! Singletons go through `Scope::singleton`, which consults the session
//! registry before the builder runs, so a duplicate never has side effects.

use super::allocator::PortSeed;
use super::app::App;
use super::config::AppConfig;
use super::endpoint::Endpoint;
use super::error::{SynthError, SynthResult};
use super::naming;
use super::scope::{NodeId, NodeKind, Phase};
use super::types::{DependencyCondition, Environment, ServiceSpec};
use super::wiring;
use crate::cloud::{self, CloudResource};
use std::ops::Deref;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// The two-phase contribution protocol every concrete resource implements.
pub trait Resource: 'static {
    /// Address or identifier dependents read; see `Construct::endpoint`.
    fn endpoint(&self) -> &Endpoint;

    /// Add cloud resources and set remote values. Runs first.
    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()>;

    /// Set local values and describe the local service, if the construct
    /// has a local runtime presence.
    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>>;
}

/// Identity of a declared construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructRef {
    node: NodeId,
    stack: NodeId,
    id: String,
    path: String,
    short_id: String,
    environment: Environment,
}

impl ConstructRef {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn stack(&self) -> NodeId {
        self.stack
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// `base` + short id.
    pub fn scoped_name(&self, base: &str) -> String {
        naming::scoped_name(base, &self.short_id)
    }

    /// `<short id>.base`.
    pub fn scoped_host(&self, base: &str) -> String {
        naming::scoped_host(base, &self.short_id)
    }

    /// Default local service name: lowercased id plus short id.
    pub fn service_name(&self) -> String {
        format!("{}-{}", self.id.to_ascii_lowercase(), self.short_id)
    }
}

/// Anything backed by a declared construct.
pub trait HasConstruct {
    fn construct_ref(&self) -> &ConstructRef;
}

impl HasConstruct for ConstructRef {
    fn construct_ref(&self) -> &ConstructRef {
        self
    }
}

impl<T: HasConstruct> HasConstruct for Rc<T> {
    fn construct_ref(&self) -> &ConstructRef {
        (**self).construct_ref()
    }
}

/// A declared construct and its resource state.
#[derive(Debug)]
pub struct Construct<R> {
    base: ConstructRef,
    resource: R,
}

impl<R> Construct<R> {
    pub fn base(&self) -> &ConstructRef {
        &self.base
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }
}

impl<R: Resource> Construct<R> {
    /// Endpoint for the active environment.
    pub fn endpoint(&self) -> SynthResult<&str> {
        self.resource.endpoint().resolved()
    }
}

impl<R> Deref for Construct<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R> HasConstruct for Construct<R> {
    fn construct_ref(&self) -> &ConstructRef {
        &self.base
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Construction context: where new constructs attach and which stack owns
/// them.
pub struct Scope<'a> {
    app: &'a mut App,
    parent: NodeId,
    stack: NodeId,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(app: &'a mut App, parent: NodeId, stack: NodeId) -> Self {
        Self { app, parent, stack }
    }

    pub fn environment(&self) -> Environment {
        self.app.environment()
    }

    pub fn stack_name(&self) -> &str {
        &self.app.tree.node(self.stack).id
    }

    pub fn parent_path(&self) -> &str {
        &self.app.tree.node(self.parent).path
    }

    /// Path a child with `id` would get under this scope.
    pub fn child_path(&self, id: &str) -> String {
        let parent = self.parent_path();
        if parent.is_empty() {
            id.to_string()
        } else {
            format!("{}{}{}", parent, naming::PATH_SEPARATOR, id)
        }
    }

    pub fn app(&self) -> &App {
        &*self.app
    }

    /// Scope whose new constructs attach under `parent`.
    pub fn nested(&mut self, parent: &ConstructRef) -> Scope<'_> {
        Scope {
            app: &mut *self.app,
            parent: parent.node(),
            stack: parent.stack(),
        }
    }

    /// Declare a construct under this scope. `builder` receives the new
    /// construct's identity and returns its initial resource state.
    pub fn construct<R, F>(&mut self, id: &str, builder: F) -> SynthResult<Construct<R>>
    where
        R: Resource,
        F: FnOnce(&ConstructRef) -> R,
    {
        self.build(self.parent, id, NodeKind::Construct, builder)
    }

    /// Declare the only construct of `kind` in this scope's stack. A failed
    /// build gives the claim back.
    pub fn construct_unique<R, F>(&mut self, kind: &'static str, id: &str, builder: F) -> SynthResult<Construct<R>>
    where
        R: Resource,
        F: FnOnce(&ConstructRef) -> R,
    {
        self.claim_unique(kind, id)?;
        let built = self.construct(id, builder);
        if built.is_err() {
            self.app.session.release_unique(self.stack, kind);
        }
        built
    }

    /// The stack's instance registered under `id`, built on first request.
    /// Singletons always attach directly under the stack.
    pub fn singleton<R, F>(&mut self, id: &str, builder: F) -> SynthResult<Rc<Construct<R>>>
    where
        R: Resource,
        F: FnOnce(&ConstructRef) -> R,
    {
        let stack_name = self.stack_name().to_string();
        if let Some(existing) = self.app.session.begin_singleton(self.stack, &stack_name, id)? {
            debug!(stack = %stack_name, id, "reusing singleton");
            return existing
                .downcast::<Construct<R>>()
                .map_err(|_| SynthError::SingletonTypeMismatch {
                    stack: stack_name,
                    id: id.to_string(),
                });
        }
        match self.build(self.stack, id, NodeKind::Singleton, builder) {
            Ok(construct) => {
                let shared = Rc::new(construct);
                self.app
                    .session
                    .finish_singleton(self.stack, id, Rc::clone(&shared) as Rc<dyn std::any::Any>);
                Ok(shared)
            }
            Err(e) => {
                self.app.session.abort_singleton(self.stack, id);
                Err(e)
            }
        }
    }

    /// Local ordering edge (`dependent` waits for `dependency`); on the
    /// cloud side `dependent`'s resources depend on `dependency`'s.
    pub fn depends_on(
        &mut self,
        dependent: &dyn HasConstruct,
        dependency: &dyn HasConstruct,
        condition: DependencyCondition,
    ) -> SynthResult<()> {
        wiring::add_edge(self.app, dependent.construct_ref(), dependency.construct_ref(), condition)
    }

    /// Make `dependent` wait for `dependency` in whatever way its service
    /// supports (see `wiring::readiness`). Returns the chosen condition.
    pub fn wait_for(
        &mut self,
        dependent: &dyn HasConstruct,
        dependency: &dyn HasConstruct,
    ) -> SynthResult<DependencyCondition> {
        let condition = wiring::readiness(self.local_service(dependency)?);
        self.depends_on(dependent, dependency, condition)?;
        Ok(condition)
    }

    /// Local service of a construct.
    pub fn local_service(&self, construct: &dyn HasConstruct) -> SynthResult<&ServiceSpec> {
        self.app.local_service(construct.construct_ref().node())
    }

    /// Allow only one construct of `kind` per stack.
    pub fn claim_unique(&mut self, kind: &'static str, id: &str) -> SynthResult<()> {
        if self.app.session.claim_unique(self.stack, kind) {
            Ok(())
        } else {
            Err(SynthError::unsupported(
                &self.child_path(id),
                format!("only one {} construct can be created per stack", kind),
            ))
        }
    }

    fn build<R, F>(&mut self, parent: NodeId, id: &str, kind: NodeKind, builder: F) -> SynthResult<Construct<R>>
    where
        R: Resource,
        F: FnOnce(&ConstructRef) -> R,
    {
        self.app.session.ensure_declaring(id)?;
        let node = self.app.tree.add_child(parent, id, kind)?;
        let scope_node = self.app.tree.node(node);
        let base = ConstructRef {
            node,
            stack: self.stack,
            id: scope_node.id.clone(),
            path: scope_node.path.clone(),
            short_id: scope_node.short_id.clone(),
            environment: self.app.environment(),
        };
        debug!(path = %base.path, short_id = %base.short_id, ?kind, "declaring construct");

        let mut resource = builder(&base);
        let pending = {
            let mut cx = Contribution {
                scope: Scope {
                    app: &mut *self.app,
                    parent: node,
                    stack: self.stack,
                },
                base: &base,
                pending: Vec::new(),
            };
            resource.contribute_cloud(&mut cx)?;
            cx.scope.app.tree.set_phase(node, Phase::CloudContributed);
            if let Some(spec) = resource.contribute_local(&mut cx)? {
                cx.scope.app.register_service(node, spec)?;
            }
            std::mem::take(&mut cx.pending)
        };
        self.app.tree.set_phase(node, Phase::LocalContributed);

        for (dependency, condition) in pending {
            wiring::add_edge(self.app, &base, &dependency, condition)?;
        }
        Ok(Construct { base, resource })
    }
}

// ============================================================================
// Contribution
// ============================================================================

/// Handed to a resource during its two contribution phases.
pub struct Contribution<'c> {
    scope: Scope<'c>,
    base: &'c ConstructRef,
    pending: Vec<(ConstructRef, DependencyCondition)>,
}

impl<'c> Contribution<'c> {
    pub fn base(&self) -> &ConstructRef {
        self.base
    }

    pub fn id(&self) -> &str {
        self.base.id()
    }

    pub fn path(&self) -> &str {
        self.base.path()
    }

    pub fn short_id(&self) -> &str {
        self.base.short_id()
    }

    pub fn environment(&self) -> Environment {
        self.base.environment()
    }

    pub fn stack_name(&self) -> &str {
        self.scope.stack_name()
    }

    pub fn config(&self) -> &AppConfig {
        self.scope.app.config()
    }

    /// Scope for constructs owned by this one (and for singletons).
    pub fn scope(&mut self) -> &mut Scope<'c> {
        &mut self.scope
    }

    /// Add a cloud resource; returns its logical id (`<Id><local><shortId>`).
    pub fn add_cloud_resource(&mut self, local_id: &str, resource: CloudResource) -> SynthResult<String> {
        let logical_id = logical_id(self.base, local_id);
        let stack = self.stack_mut()?;
        stack.add_resource(&logical_id, resource)?;
        self.scope.app.tree.add_cloud_id(self.base.node(), &logical_id);
        debug!(path = %self.base.path(), logical_id = %logical_id, "added cloud resource");
        Ok(logical_id)
    }

    pub fn add_cloud_output(&mut self, name: &str, value: &str) -> SynthResult<()> {
        self.stack_mut()?.add_output(name, value);
        Ok(())
    }

    /// Deployment region reference for remote values.
    pub fn region(&self) -> String {
        self.scope
            .app
            .stacks
            .get(&self.base.stack())
            .map(|s| s.region_ref())
            .unwrap_or_else(|| cloud::REGION_REF.to_string())
    }

    pub fn allocate_port(&mut self, seed: impl Into<PortSeed>) -> SynthResult<u16> {
        self.scope.app.session.allocator_mut().allocate(Some(seed.into()))
    }

    pub fn reserve_port(&mut self, port: u16) -> SynthResult<()> {
        self.scope.app.session.allocator_mut().reserve(port)
    }

    /// Host path as a volume source relative to the manifest directory.
    pub fn volume_source(&self, path: &Path) -> String {
        self.scope.app.volume_source(path)
    }

    pub fn network(&self) -> &str {
        self.scope.app.manifest.network()
    }

    /// Once this construct's service is registered, make it wait for
    /// `dependency`.
    pub fn after_local(&mut self, dependency: &dyn HasConstruct, condition: DependencyCondition) {
        self.pending.push((dependency.construct_ref().clone(), condition));
    }

    fn stack_mut(&mut self) -> SynthResult<&mut cloud::CloudStack> {
        let base = self.base;
        self.scope
            .app
            .stacks
            .get_mut(&base.stack())
            .ok_or_else(|| SynthError::not_initialized(base.path(), "cloud stack"))
    }
}

fn logical_id(base: &ConstructRef, local_id: &str) -> String {
    let id: String = base.id().chars().filter(char::is_ascii_alphanumeric).collect();
    let local: String = local_id.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("{}{}{}", id, local, base.short_id())
}
