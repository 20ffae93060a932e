//! Circular dependency detection.
//!
//! Iterative depth-first search with an explicit path over Direct and
//! Deferred edges. Collection edges never close a cycle, and external
//! declarations are not part of the graph at all.

use crate::declaration::Identity;
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, Related};
use crate::graph::DependencyGraph;
use crate::internal::{FastMap, FastSet};

/// Finds every distinct cycle reachable by the search, canonicalized.
///
/// Roots and successors are visited in identity order and each cycle is
/// rotated to start at its smallest identity, so the result depends only on
/// the graph, not on declaration order. The search keeps its own stack, so
/// chain length is bounded by memory rather than by the thread's stack.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<Identity>> {
    let successors: FastMap<&Identity, Vec<&Identity>> = graph
        .nodes()
        .iter()
        .map(|node| {
            let mut next: Vec<&Identity> = graph.strong_successors(node).collect();
            next.sort();
            next.dedup();
            (node, next)
        })
        .collect();
    let mut roots: Vec<&Identity> = graph.nodes().iter().collect();
    roots.sort();

    let mut search = CycleSearch::default();
    for root in roots {
        search.run(root, &successors);
    }
    search.cycles.sort();
    search.cycles
}

/// Reports one `circular-dependency` diagnostic per distinct cycle.
pub fn check_cycles(graph: &DependencyGraph, diagnostics: &mut DiagnosticBuffer) {
    let cycles = find_cycles(graph);
    tracing::debug!(cycles = cycles.len(), "cycle detection finished");

    for cycle in cycles {
        let subject = cycle[0].clone();
        let next = &cycle[1 % cycle.len()];
        let location = graph
            .edges_from(&subject)
            .iter()
            .find(|edge| edge.wrapping.is_strong() && &edge.to == next)
            .and_then(|edge| edge.location.clone());

        let mut names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        names.push(subject.to_string());
        let message = format!("Circular dependency detected: {}", names.join(" -> "));

        diagnostics.push(
            Diagnostic::new(DiagnosticKind::CircularDependency, subject, Related::Cycle(cycle), message).at(location),
        );
    }
}

#[derive(Default)]
struct CycleSearch<'a> {
    visited: FastSet<&'a Identity>,
    path: Vec<&'a Identity>,
    /// Position of each node currently on `path`.
    on_path: FastMap<&'a Identity, usize>,
    seen: FastSet<Vec<Identity>>,
    cycles: Vec<Vec<Identity>>,
}

impl<'a> CycleSearch<'a> {
    /// Depth-first search from `root` with explicit (node, next successor) frames.
    fn run(&mut self, root: &'a Identity, successors: &FastMap<&'a Identity, Vec<&'a Identity>>) {
        if !self.visited.insert(root) {
            return;
        }
        let mut frames: Vec<(&'a Identity, usize)> = Vec::new();
        self.enter(root, &mut frames);

        while let Some(frame) = frames.last_mut() {
            let (node, index) = *frame;
            let Some(&next) = successors.get(node).and_then(|next| next.get(index)) else {
                frames.pop();
                self.path.pop();
                self.on_path.remove(node);
                continue;
            };
            frame.1 += 1;

            if let Some(&start) = self.on_path.get(next) {
                let cycle = canonicalize(self.path[start..].iter().map(|&id| id.clone()).collect());
                if self.seen.insert(cycle.clone()) {
                    self.cycles.push(cycle);
                }
            } else if self.visited.insert(next) {
                self.enter(next, &mut frames);
            }
        }
    }

    fn enter(&mut self, node: &'a Identity, frames: &mut Vec<(&'a Identity, usize)>) {
        self.on_path.insert(node, self.path.len());
        self.path.push(node);
        frames.push((node, 0));
    }
}

fn canonicalize(mut cycle: Vec<Identity>) -> Vec<Identity> {
    if let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(index, _)| index)
    {
        cycle.rotate_left(start);
    }
    cycle
}
