//! Dependency graph construction.
//!
//! Each declared dependency is unwrapped (collections, deferred wrappers),
//! checked against the framework allow-list, and resolved through the
//! [`Registry`]. Resolved targets become adjacency entries; unresolved ones
//! are kept aside for the resolution-failure rules.

use crate::config::VerifierOptions;
use crate::declaration::{Identity, Location, ServiceDeclaration, Wrapping};
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, Related};
use crate::internal::{catch_fault, FastMap};
use crate::registry::{Registry, ResolutionStage};
use crate::signature::{ContractSignature, TypeExpr};

/// One resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub from: Identity,
    pub to: Identity,
    /// The unwrapped target the edge was resolved from.
    pub target: ContractSignature,
    pub wrapping: Wrapping,
    pub stage: ResolutionStage,
    pub location: Option<Location>,
}

/// A dependency for which resolution found no registered candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedEdge {
    pub from: Identity,
    pub target: ContractSignature,
    pub wrapping: Wrapping,
    pub location: Option<Location>,
}

/// Strips collection and deferred wrappers, innermost type last.
///
/// ```rust
/// use ferrous_di_verify::{unwrap_target, TypeExpr, VerifierOptions, Wrapping};
///
/// let options = VerifierOptions::default();
/// let target = TypeExpr::parse("Lazy<IEnumerable<IPlugin>>", &[]).unwrap();
/// let (inner, wrapping) = unwrap_target(&target, Wrapping::Direct, &options);
/// assert_eq!(inner.to_string(), "IPlugin");
/// assert_eq!(wrapping, Wrapping::Collection);
/// ```
pub fn unwrap_target(target: &TypeExpr, declared: Wrapping, options: &VerifierOptions) -> (TypeExpr, Wrapping) {
    let mut current = target;
    let mut wrapping = declared;
    loop {
        if options.is_deferred_wrapper(current) {
            wrapping = wrapping.combine(Wrapping::Deferred);
        } else if options.is_collection_wrapper(current) {
            wrapping = wrapping.combine(Wrapping::Collection);
        } else {
            return (current.clone(), wrapping);
        }
        current = &current.args()[0];
    }
}

/// The resolved dependency graph of one snapshot.
///
/// Nodes are the non-external declarations in source order. External
/// declarations appear neither as sources nor as targets.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Identity>,
    adjacency: FastMap<Identity, Vec<ResolvedEdge>>,
    unresolved: Vec<UnresolvedEdge>,
}

impl DependencyGraph {
    /// Resolves every declaration's dependencies.
    ///
    /// Faults raised while processing one declaration are reported into
    /// `faults` and the declaration contributes no edges.
    pub fn build(
        declarations: &[ServiceDeclaration],
        registry: &Registry,
        options: &VerifierOptions,
        faults: &mut DiagnosticBuffer,
    ) -> Self {
        let mut graph = DependencyGraph::default();
        for declaration in declarations.iter().filter(|d| !d.is_external) {
            graph.nodes.push(declaration.identity.clone());
            match catch_fault(&declaration.identity, || resolve_declaration(declaration, registry, options)) {
                Ok((edges, unresolved)) => {
                    graph.adjacency.insert(declaration.identity.clone(), edges);
                    graph.unresolved.extend(unresolved);
                }
                Err(error) => faults.push(Diagnostic::new(
                    DiagnosticKind::InternalError,
                    declaration.identity.clone(),
                    Related::Text("graph".to_string()),
                    error.to_string(),
                )),
            }
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edge_count(),
            unresolved = graph.unresolved.len(),
            "built dependency graph"
        );
        graph
    }

    pub fn nodes(&self) -> &[Identity] {
        &self.nodes
    }

    pub fn edges_from(&self, identity: &Identity) -> &[ResolvedEdge] {
        self.adjacency.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All edges, grouped by source in node order.
    pub fn edges(&self) -> impl Iterator<Item = &ResolvedEdge> {
        self.nodes.iter().flat_map(move |node| self.edges_from(node).iter())
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Targets of Direct and Deferred edges, the edges that can close a cycle.
    pub fn strong_successors<'a>(&'a self, identity: &Identity) -> impl Iterator<Item = &'a Identity> + 'a {
        self.edges_from(identity)
            .iter()
            .filter(|edge| edge.wrapping.is_strong())
            .map(|edge| &edge.to)
    }

    pub fn unresolved(&self) -> &[UnresolvedEdge] {
        &self.unresolved
    }
}

fn resolve_declaration(
    declaration: &ServiceDeclaration,
    registry: &Registry,
    options: &VerifierOptions,
) -> (Vec<ResolvedEdge>, Vec<UnresolvedEdge>) {
    let mut edges = Vec::new();
    let mut unresolved = Vec::new();

    for dependency in &declaration.dependency_edges {
        let (inner, wrapping) = unwrap_target(dependency.target.expr(), dependency.wrapping, options);
        if matches!(inner, TypeExpr::Param(_)) || options.is_framework_type(&inner) {
            continue;
        }
        let target = ContractSignature::new(inner);
        let resolution = registry.resolve(&target);
        let Some(stage) = resolution.stage else {
            unresolved.push(UnresolvedEdge {
                from: declaration.identity.clone(),
                target,
                wrapping,
                location: dependency.location.clone(),
            });
            continue;
        };

        for candidate in resolution.candidates {
            if registry.is_external(&candidate) {
                continue;
            }
            let edge = ResolvedEdge {
                from: declaration.identity.clone(),
                to: candidate,
                target: target.clone(),
                wrapping,
                stage,
                location: dependency.location.clone(),
            };
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
    }
    (edges, unresolved)
}
