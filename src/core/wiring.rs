//! TW-012: Dependency wiring between constructs.
//!
//! An edge orders two local services (`depends_on` with a condition) and,
//! when both constructs live in the same stack, their cloud resources
//! (`DependsOn`, expanded at synthesis). Service start order is computed
//! with Kahn's algorithm, alphabetical tie-breaking for determinism.

use super::app::App;
use super::construct::ConstructRef;
use super::error::{SynthError, SynthResult};
use super::scope::NodeId;
use super::types::{DependencyCondition, RestartPolicy, ServiceSpec};
use crate::manifest::LocalManifest;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// `dependent` waits for `dependency` under `condition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: NodeId,
    pub dependency: NodeId,
    pub condition: DependencyCondition,
    /// Shared stack of both ends; `None` for cross-stack edges, which stay
    /// local-only.
    pub stack: Option<NodeId>,
}

/// Record an edge. Both constructs must own a local service.
pub(crate) fn add_edge(
    app: &mut App,
    dependent_ref: &ConstructRef,
    dependency_ref: &ConstructRef,
    condition: DependencyCondition,
) -> SynthResult<()> {
    let dependent = dependent_ref.node();
    let dependency = dependency_ref.node();
    let stack = (dependent_ref.stack() == dependency_ref.stack()).then_some(dependent_ref.stack());
    app.session.ensure_declaring(&app.tree.node(dependent).path)?;
    let dependent_svc = app.tree.service(dependent)?.to_string();
    let dependency_svc = app.tree.service(dependency)?.to_string();
    app.manifest
        .add_dependency(&dependent_svc, &dependency_svc, condition)?;

    debug!(
        dependent = %app.tree.node(dependent).path,
        dependency = %app.tree.node(dependency).path,
        %condition,
        "wired dependency"
    );
    match app
        .edges
        .iter_mut()
        .find(|e| e.dependent == dependent && e.dependency == dependency)
    {
        Some(edge) => edge.condition = condition,
        None => app.edges.push(DependencyEdge {
            dependent,
            dependency,
            condition,
            stack,
        }),
    }
    Ok(())
}

/// Strongest condition `spec` can satisfy: healthy when it has a health
/// check, completed for one-shot services, otherwise started.
pub fn readiness(spec: &ServiceSpec) -> DependencyCondition {
    if spec.health_check.is_some() {
        DependencyCondition::Healthy
    } else if spec.restart == Some(RestartPolicy::No) {
        DependencyCondition::CompletedSuccessfully
    } else {
        DependencyCondition::Started
    }
}

/// Mirror local edges as cloud `DependsOn`, for pairs in the same stack.
pub(crate) fn apply_cloud_ordering(app: &mut App) {
    let mut work = Vec::new();
    for edge in &app.edges {
        let Some(stack) = edge.stack else {
            continue;
        };
        work.push((
            stack,
            app.tree.cloud_ids_under(edge.dependent),
            app.tree.cloud_ids_under(edge.dependency),
        ));
    }

    for (stack, dependents, dependencies) in work {
        let Some(stack) = app.stacks.get_mut(&stack) else {
            continue;
        };
        for d in &dependents {
            for p in dependencies.iter().filter(|p| !dependents.contains(p)) {
                stack.add_depends_on(d, p);
            }
        }
    }
}

/// Service start order: every service after the services it depends on.
/// Fails with `DependencyCycle` if the edges form a cycle.
pub fn service_order(manifest: &LocalManifest) -> SynthResult<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in manifest.service_names() {
        in_degree.insert(name, 0);
        adjacency.insert(name, Vec::new());
    }

    for name in manifest.service_names() {
        for (dep, _) in manifest.dependencies(name) {
            if let (Some(next), Some(degree)) = (adjacency.get_mut(dep), in_degree.get_mut(name)) {
                next.push(name);
                *degree += 1;
            }
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(name, _)| *name)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<&str> = ready.into_iter().collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready = Vec::new();
        for neighbor in adjacency.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(neighbor) {
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(*neighbor);
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != in_degree.len() {
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(name, _)| *name)
            .collect();
        stuck.sort_unstable();
        return Err(SynthError::DependencyCycle(stuck.join(", ")));
    }

    Ok(order)
}
