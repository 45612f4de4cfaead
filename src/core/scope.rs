//! TW-006: Scope tree: parent/child ownership with unique sibling ids.
//!
//! Nodes live in an arena and refer to each other by `NodeId`, so the tree
//! is acyclic by construction: a node can only be attached to a parent that
//! already exists. Every node carries a `NodeKind` marker; traversal matches
//! on it instead of inspecting types.

use super::error::{SynthError, SynthResult};
use super::naming::{self, PATH_SEPARATOR};
use indexmap::IndexMap;

/// Index of a node in its `ScopeTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node is. Only `Construct` and `Singleton` nodes contribute to the
/// two deployment artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    App,
    Stack,
    Construct,
    Singleton,
}

impl NodeKind {
    pub fn contributes(self) -> bool {
        matches!(self, Self::Construct | Self::Singleton)
    }
}

/// Lifecycle of a contributing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Declared,
    CloudContributed,
    LocalContributed,
}

/// A node of the construct tree.
#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub id: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    /// Fully-qualified path, e.g. `MainStack/Api/Queue`
    pub path: String,
    /// First 8 hex chars of the path hash
    pub short_id: String,
    pub phase: Phase,
    /// Ordered children, keyed by id
    children: IndexMap<String, NodeId>,
    /// Name of the local service this node owns, if any
    service: Option<String>,
    /// Logical ids this node contributed to the cloud template
    cloud_ids: Vec<String>,
}

impl ScopeNode {
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub fn cloud_ids(&self) -> &[String] {
        &self.cloud_ids
    }
}

/// Arena-backed construct tree.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    /// A tree with a single `App` root. The root's id is not part of paths.
    pub fn new(root_id: &str) -> Self {
        Self {
            nodes: vec![ScopeNode {
                id: root_id.to_string(),
                parent: None,
                kind: NodeKind::App,
                path: String::new(),
                short_id: naming::short_id(""),
                phase: Phase::LocalContributed,
                children: IndexMap::new(),
                service: None,
                cloud_ids: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut ScopeNode {
        &mut self.nodes[id.0]
    }

    /// Attach a new child. Fails on an invalid or duplicate sibling id.
    pub fn add_child(&mut self, parent: NodeId, id: &str, kind: NodeKind) -> SynthResult<NodeId> {
        naming::validate_id(id)?;
        let parent_node = self.node(parent);
        if parent_node.children.contains_key(id) {
            return Err(SynthError::DuplicateId {
                parent: display_path(parent_node),
                id: id.to_string(),
            });
        }

        let path = if parent_node.path.is_empty() {
            id.to_string()
        } else {
            format!("{}{}{}", parent_node.path, PATH_SEPARATOR, id)
        };
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(ScopeNode {
            id: id.to_string(),
            parent: Some(parent),
            kind,
            short_id: naming::short_id(&path),
            path,
            phase: if kind.contributes() {
                Phase::Declared
            } else {
                Phase::LocalContributed
            },
            children: IndexMap::new(),
            service: None,
            cloud_ids: Vec::new(),
        });
        self.node_mut(parent).children.insert(id.to_string(), node_id);
        Ok(node_id)
    }

    /// Child of `parent` with the given id.
    pub fn child(&self, parent: NodeId, id: &str) -> Option<NodeId> {
        self.node(parent).children.get(id).copied()
    }

    pub fn set_phase(&mut self, id: NodeId, phase: Phase) {
        self.node_mut(id).phase = phase;
    }

    /// Record that `id` owns local service `name`. A node owns at most one.
    pub fn set_service(&mut self, id: NodeId, name: &str) -> SynthResult<()> {
        let node = self.node_mut(id);
        if node.service.is_some() {
            return Err(SynthError::unsupported(
                &node.path,
                "local service already created",
            ));
        }
        node.service = Some(name.to_string());
        Ok(())
    }

    /// Local service owned by `id`. Errors before local contribution ran, or
    /// when the construct has no local runtime presence.
    pub fn service(&self, id: NodeId) -> SynthResult<&str> {
        let node = self.node(id);
        if node.phase != Phase::LocalContributed {
            return Err(SynthError::not_initialized(&node.path, "local service"));
        }
        node.service
            .as_deref()
            .ok_or_else(|| SynthError::unsupported(&node.path, "construct has no local service"))
    }

    pub fn add_cloud_id(&mut self, id: NodeId, logical_id: &str) {
        self.node_mut(id).cloud_ids.push(logical_id.to_string());
    }

    /// Cloud logical ids of `id` and everything beneath it.
    pub fn cloud_ids_under(&self, id: NodeId) -> Vec<String> {
        self.descendants(id)
            .into_iter()
            .flat_map(|n| self.node(n).cloud_ids.iter().cloned())
            .collect()
    }

    /// `id` followed by its descendants, depth-first in declaration order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children: Vec<NodeId> = self.node(current).children().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Contributing nodes of the whole tree, depth-first.
    pub fn constructs(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|n| self.node(*n).kind.contributes())
            .collect()
    }
}

fn display_path(node: &ScopeNode) -> String {
    if node.path.is_empty() {
        node.id.clone()
    } else {
        node.path.clone()
    }
}
