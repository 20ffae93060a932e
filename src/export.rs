//! Export of a verified dependency graph for visualization.
//!
//! DOT and Mermaid are always available. JSON and YAML need the
//! `graph-export` feature.

use std::collections::HashSet;

#[cfg(feature = "graph-export")]
use serde::{Deserialize, Serialize};

use crate::declaration::{Identity, Wrapping};
use crate::diagnostics::{DiagnosticKind, Related, Severity};
use crate::error::{VerifyError, VerifyResult};
use crate::internal::FastSet;
use crate::lifetime::Lifetime;
use crate::verifier::VerificationReport;

/// A declaration in the exported graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct ExportNode {
    /// Display form of the identity, e.g. `Repository<_>`.
    pub id: String,
    pub name: String,
    pub lifetime: Lifetime,
    pub is_external: bool,
    pub is_background: bool,
    pub contracts: Vec<String>,
}

/// A resolved dependency in the exported graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct ExportEdge {
    pub from: String,
    pub to: String,
    /// The contract the edge was resolved from.
    pub contract: String,
    pub wrapping: Wrapping,
    /// Whether both ends lie on a reported cycle.
    pub in_cycle: bool,
}

/// Graph-level counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct ExportMetadata {
    pub declaration_count: usize,
    pub singleton_count: usize,
    pub scoped_count: usize,
    pub transient_count: usize,
    pub edge_count: usize,
    pub unresolved_count: usize,
    pub cycle_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

/// A verification report flattened for export.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
    pub metadata: ExportMetadata,
}

/// What to include in an export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Include external declarations as isolated nodes.
    pub include_external: bool,
    /// Include collection edges.
    pub include_collections: bool,
    /// When non-empty, only these declaration names are exported.
    pub type_filter: HashSet<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_external: true,
            include_collections: true,
            type_filter: HashSet::new(),
        }
    }
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
    /// Graphviz DOT.
    Dot,
    Mermaid,
}

impl GraphExport {
    /// Flattens a report into nodes, edges and counts.
    ///
    /// ```rust
    /// use ferrous_di_verify::{DeclarationFragment, ExportOptions, GraphExport, Verifier};
    ///
    /// let report = Verifier::default().verify(&[
    ///     DeclarationFragment::class("A").singleton().depends_on("B"),
    ///     DeclarationFragment::class("B").singleton(),
    /// ]);
    /// let export = GraphExport::from_report(&report, &ExportOptions::default());
    /// assert_eq!(export.nodes.len(), 2);
    /// assert_eq!(export.edges[0].from, "A");
    /// assert_eq!(export.metadata.singleton_count, 2);
    /// ```
    pub fn from_report(report: &VerificationReport, options: &ExportOptions) -> Self {
        let included = |identity: &Identity| options.type_filter.is_empty() || options.type_filter.contains(&identity.name);

        let mut cycle_members: FastSet<(&Identity, &Identity)> = FastSet::default();
        let mut cycle_count = 0;
        for diagnostic in report.of_kind(DiagnosticKind::CircularDependency) {
            if let Related::Cycle(path) = &diagnostic.related {
                cycle_count += 1;
                for (i, node) in path.iter().enumerate() {
                    cycle_members.insert((node, &path[(i + 1) % path.len()]));
                }
            }
        }

        let mut metadata = ExportMetadata {
            cycle_count,
            unresolved_count: report.graph().unresolved().len(),
            error_count: report.count(Severity::Error),
            warning_count: report.count(Severity::Warning),
            ..ExportMetadata::default()
        };

        let mut nodes = Vec::new();
        for declaration in report.declarations() {
            if !included(&declaration.identity) || (declaration.is_external && !options.include_external) {
                continue;
            }
            metadata.declaration_count += 1;
            match declaration.lifetime {
                Lifetime::Singleton => metadata.singleton_count += 1,
                Lifetime::Scoped => metadata.scoped_count += 1,
                Lifetime::Transient => metadata.transient_count += 1,
            }
            nodes.push(ExportNode {
                id: declaration.identity.to_string(),
                name: declaration.identity.name.clone(),
                lifetime: declaration.lifetime,
                is_external: declaration.is_external,
                is_background: declaration.is_background,
                contracts: declaration.registered_contracts().map(|c| c.to_string()).collect(),
            });
        }

        let edges: Vec<ExportEdge> = report
            .graph()
            .edges()
            .filter(|edge| included(&edge.from) && included(&edge.to))
            .filter(|edge| options.include_collections || edge.wrapping != Wrapping::Collection)
            .map(|edge| ExportEdge {
                from: edge.from.to_string(),
                to: edge.to.to_string(),
                contract: edge.target.to_string(),
                wrapping: edge.wrapping,
                in_cycle: edge.wrapping.is_strong() && cycle_members.contains(&(&edge.from, &edge.to)),
            })
            .collect();
        metadata.edge_count = edges.len();

        GraphExport { nodes, edges, metadata }
    }
}

/// Renders a [`GraphExport`] in some format.
pub trait GraphExporter {
    fn export(&self, graph: &GraphExport, format: ExportFormat) -> VerifyResult<String>;
}

/// Exporter for the built-in formats.
#[derive(Debug, Default)]
pub struct DefaultGraphExporter;

impl GraphExporter for DefaultGraphExporter {
    fn export(&self, graph: &GraphExport, format: ExportFormat) -> VerifyResult<String> {
        match format {
            ExportFormat::Json => self.export_json(graph),
            ExportFormat::Yaml => self.export_yaml(graph),
            ExportFormat::Dot => Ok(self.export_dot(graph)),
            ExportFormat::Mermaid => Ok(self.export_mermaid(graph)),
        }
    }
}

impl DefaultGraphExporter {
    #[cfg(feature = "graph-export")]
    fn export_json(&self, graph: &GraphExport) -> VerifyResult<String> {
        serde_json::to_string_pretty(graph).map_err(|e| VerifyError::Export(e.to_string()))
    }

    #[cfg(not(feature = "graph-export"))]
    fn export_json(&self, _graph: &GraphExport) -> VerifyResult<String> {
        Err(VerifyError::Export("JSON export requires the `graph-export` feature".to_string()))
    }

    #[cfg(feature = "graph-export")]
    fn export_yaml(&self, graph: &GraphExport) -> VerifyResult<String> {
        serde_yaml::to_string(graph).map_err(|e| VerifyError::Export(e.to_string()))
    }

    #[cfg(not(feature = "graph-export"))]
    fn export_yaml(&self, _graph: &GraphExport) -> VerifyResult<String> {
        Err(VerifyError::Export("YAML export requires the `graph-export` feature".to_string()))
    }

    /// Graphviz DOT; cycle edges are drawn red, deferred edges dashed,
    /// collection edges bold.
    fn export_dot(&self, graph: &GraphExport) -> String {
        let mut output = String::new();
        output.push_str("digraph DependencyGraph {\n");
        output.push_str("  rankdir=TB;\n");
        output.push_str("  node [shape=box];\n\n");

        for node in &graph.nodes {
            let color = match node.lifetime {
                Lifetime::Singleton => "lightblue",
                Lifetime::Scoped => "lightgreen",
                Lifetime::Transient => "lightyellow",
            };
            let style = if node.is_external { "\"filled,dashed\"" } else { "filled" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n({})\", fillcolor={}, style={}];\n",
                node.id, node.id, node.lifetime, color, style
            ));
        }

        output.push('\n');

        for edge in &graph.edges {
            let style = match edge.wrapping {
                Wrapping::Direct => "solid",
                Wrapping::Deferred => "dashed",
                Wrapping::Collection => "bold",
            };
            let color = if edge.in_cycle { ", color=red" } else { "" };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}{}];\n",
                edge.from, edge.to, edge.contract, style, color
            ));
        }

        output.push_str("}\n");
        output
    }

    fn export_mermaid(&self, graph: &GraphExport) -> String {
        let mut output = String::new();
        output.push_str("graph TD\n");

        for node in &graph.nodes {
            output.push_str(&format!("  {}[\"{}\"]\n", mermaid_id(&node.id), node.id));
        }

        for edge in &graph.edges {
            let arrow = match edge.wrapping {
                Wrapping::Direct => "-->",
                Wrapping::Deferred => "-.->",
                Wrapping::Collection => "==>",
            };
            output.push_str(&format!("  {} {} {}\n", mermaid_id(&edge.from), arrow, mermaid_id(&edge.to)));
        }

        output.push_str("\n  classDef singleton fill:#e1f5fe\n");
        output.push_str("  classDef scoped fill:#e8f5e8\n");
        output.push_str("  classDef transient fill:#fff3e0\n");

        for node in &graph.nodes {
            output.push_str(&format!("  class {} {}\n", mermaid_id(&node.id), node.lifetime));
        }

        output
    }
}

/// Mermaid identifiers allow no punctuation.
fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclarationFragment;
    use crate::verifier::Verifier;

    fn export() -> GraphExport {
        let report = Verifier::default().verify(&[
            DeclarationFragment::class("A").singleton().depends_on("IB"),
            DeclarationFragment::class("B").type_params(["T"]).scoped().implements("IB").depends_on("Lazy<A>"),
            DeclarationFragment::class("Ext").external(),
        ]);
        GraphExport::from_report(&report, &ExportOptions::default())
    }

    #[test]
    fn cycle_edges_are_flagged() {
        let graph = export();
        assert_eq!(graph.metadata.cycle_count, 1);
        assert!(graph.edges.iter().all(|e| e.in_cycle));
        assert_eq!(graph.metadata.declaration_count, 3);
    }

    #[test]
    fn dot_output_marks_cycles_and_wrapping() {
        let dot = DefaultGraphExporter.export(&export(), ExportFormat::Dot).unwrap();
        assert!(dot.starts_with("digraph DependencyGraph {"));
        assert!(dot.contains("\"B<_>\" -> \"A\" [label=\"A\", style=dashed, color=red];"));
    }

    #[test]
    fn mermaid_ids_are_sanitized() {
        let mermaid = DefaultGraphExporter.export(&export(), ExportFormat::Mermaid).unwrap();
        assert!(mermaid.contains("  B___[\"B<_>\"]\n"));
        assert!(mermaid.contains("  B___ -.-> A\n"));
        assert!(mermaid.contains("  class A singleton\n"));
    }

    #[test]
    fn type_filter_limits_nodes_and_edges() {
        let report = Verifier::default().verify(&[
            DeclarationFragment::class("A").singleton().depends_on("B"),
            DeclarationFragment::class("B").singleton(),
        ]);
        let options = ExportOptions {
            type_filter: ["A".to_string()].into_iter().collect(),
            ..ExportOptions::default()
        };
        let graph = GraphExport::from_report(&report, &options);
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[cfg(feature = "graph-export")]
    #[test]
    fn json_export_round_trips() {
        let graph = export();
        let json = DefaultGraphExporter.export(&graph, ExportFormat::Json).unwrap();
        let parsed: GraphExport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
    }

    #[cfg(not(feature = "graph-export"))]
    #[test]
    fn json_export_needs_feature() {
        assert!(matches!(
            DefaultGraphExporter.export(&export(), ExportFormat::Json),
            Err(VerifyError::Export(_))
        ));
    }
}
