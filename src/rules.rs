//! Per-declaration rules: resolution failures, duplicate and conflicting
//! dependency declarations, exclusion markers and conditional markers.

use std::collections::BTreeMap;

use crate::declaration::{Condition, DeclarationStyle, Location, ServiceDeclaration, Wrapping};
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, Related};
use crate::graph::DependencyGraph;
use crate::internal::catch_fault;
use crate::registry::Registry;
use crate::signature::ContractSignature;

/// Reports unresolved Direct and Deferred dependencies.
///
/// A target implemented only by a type without a service marker is reported
/// as unregistered; anything else as missing. Collection dependencies may
/// legitimately be empty and are never reported.
pub fn check_resolution(graph: &DependencyGraph, registry: &Registry, diagnostics: &mut DiagnosticBuffer) {
    for unresolved in graph.unresolved() {
        if unresolved.wrapping == Wrapping::Collection {
            continue;
        }
        let implementers = registry.resolve_unregistered(&unresolved.target).candidates;
        let diagnostic = if implementers.is_empty() {
            Diagnostic::new(
                DiagnosticKind::NoImplementation,
                unresolved.from.clone(),
                Related::Contract(unresolved.target.clone()),
                format!(
                    "No registered implementation of '{}' found for '{}'",
                    unresolved.target, unresolved.from
                ),
            )
        } else {
            let names: Vec<String> = implementers.iter().map(ToString::to_string).collect();
            Diagnostic::new(
                DiagnosticKind::ImplementationUnregistered,
                unresolved.from.clone(),
                Related::Contract(unresolved.target.clone()),
                format!(
                    "'{}' implements '{}' but is not registered as a service",
                    names.join("', '"),
                    unresolved.target
                ),
            )
        };
        diagnostics.push(diagnostic.at(unresolved.location.clone()));
    }
}

/// Runs the declaration-shape rules over every declaration.
pub fn check_declarations(declarations: &[ServiceDeclaration], diagnostics: &mut DiagnosticBuffer) {
    for declaration in declarations {
        match catch_fault(&declaration.identity, || declaration_rules(declaration)) {
            Ok(found) => diagnostics.extend(found),
            Err(error) => diagnostics.push(Diagnostic::new(
                DiagnosticKind::InternalError,
                declaration.identity.clone(),
                Related::Text("rules".to_string()),
                error.to_string(),
            )),
        }
    }
}

fn declaration_rules(declaration: &ServiceDeclaration) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    check_duplicates(declaration, &mut found);
    check_exclusions(declaration, &mut found);
    check_conditions(declaration, &mut found);
    found
}

#[derive(Default)]
struct TargetUse<'a> {
    /// List group → occurrences within it.
    groups: BTreeMap<usize, usize>,
    field: bool,
    location: Option<&'a Location>,
}

fn check_duplicates(declaration: &ServiceDeclaration, found: &mut Vec<Diagnostic>) {
    let mut uses: Vec<(&ContractSignature, TargetUse<'_>)> = Vec::new();
    for edge in &declaration.dependency_edges {
        let slot = match uses.iter().position(|(target, _)| *target == &edge.target) {
            Some(index) => index,
            None => {
                uses.push((&edge.target, TargetUse::default()));
                uses.len() - 1
            }
        };
        let entry = &mut uses[slot].1;
        match edge.style {
            DeclarationStyle::List { group } => *entry.groups.entry(group).or_default() += 1,
            DeclarationStyle::Field { .. } => entry.field = true,
        }
        if entry.location.is_none() {
            entry.location = edge.location.as_ref();
        }
    }

    let subject = &declaration.identity;
    for (target, usage) in uses {
        let make = |kind: DiagnosticKind, message: String| {
            Diagnostic::new(kind, subject.clone(), Related::Contract(target.clone()), message)
                .at(usage.location.cloned().or_else(|| declaration.location.clone()))
        };
        if usage.groups.values().any(|&count| count > 1) {
            found.push(make(
                DiagnosticKind::DuplicateWithinDeclaration,
                format!("'{}' lists dependency '{}' more than once in one marker", subject, target),
            ));
        }
        if usage.groups.len() > 1 {
            found.push(make(
                DiagnosticKind::DuplicateDependency,
                format!("'{}' declares dependency '{}' in {} separate markers", subject, target, usage.groups.len()),
            ));
        }
        if usage.field && !usage.groups.is_empty() {
            found.push(make(
                DiagnosticKind::ConflictingDeclarationStyles,
                format!("'{}' declares dependency '{}' both as a field and in a dependency list", subject, target),
            ));
        }
    }
}

fn check_exclusions(declaration: &ServiceDeclaration, found: &mut Vec<Diagnostic>) {
    for excluded in &declaration.excluded_contracts {
        if !declaration.implemented_contracts.contains(excluded) {
            found.push(
                Diagnostic::new(
                    DiagnosticKind::UnnecessaryExclusion,
                    declaration.identity.clone(),
                    Related::Contract(excluded.clone()),
                    format!(
                        "'{}' excludes '{}' from registration but does not implement it",
                        declaration.identity, excluded
                    ),
                )
                .at(declaration.location.clone()),
            );
        }
    }
}

fn check_conditions(declaration: &ServiceDeclaration, found: &mut Vec<Diagnostic>) {
    let subject = &declaration.identity;
    let at = || declaration.location.clone();

    if declaration.is_conditional && declaration.conditions.iter().all(Condition::is_empty) {
        found.push(
            Diagnostic::new(
                DiagnosticKind::ConditionalEmpty,
                subject.clone(),
                Related::None,
                format!("Conditional service '{}' has no condition and is always registered", subject),
            )
            .at(at()),
        );
    }

    for condition in &declaration.conditions {
        for environment in conflicting_environments(condition) {
            found.push(
                Diagnostic::new(
                    DiagnosticKind::ConditionalConflicting,
                    subject.clone(),
                    Related::Text(format!("environment:{}", environment)),
                    format!(
                        "Conditional service '{}' both requires and excludes environment '{}'",
                        subject, environment
                    ),
                )
                .at(at()),
            );
        }

        if let (Some(equals), Some(not_equals)) = (&condition.equals, &condition.not_equals) {
            if equals == not_equals {
                let key = condition.config_value.as_deref().unwrap_or_default();
                found.push(
                    Diagnostic::new(
                        DiagnosticKind::ConditionalConflicting,
                        subject.clone(),
                        Related::Text(format!("config:{}", key)),
                        format!(
                            "Conditional service '{}' requires config '{}' to both equal and not equal '{}'",
                            subject, key, equals
                        ),
                    )
                    .at(at()),
                );
            }
        }

        if let Some(reason) = malformed_config(condition) {
            found.push(
                Diagnostic::new(
                    DiagnosticKind::ConditionalMalformedConfig,
                    subject.clone(),
                    Related::Text(format!("config:{}", condition.config_value.as_deref().unwrap_or_default())),
                    format!("Conditional service '{}' {}", subject, reason),
                )
                .at(at()),
            );
        }
    }
}

/// Environments named both as required and as excluded, case-insensitively.
fn conflicting_environments(condition: &Condition) -> Vec<String> {
    let (Some(required), Some(excluded)) = (&condition.environment, &condition.not_environment) else {
        return Vec::new();
    };
    let excluded: Vec<String> = split_environments(excluded).map(str::to_lowercase).collect();
    let mut conflicts: Vec<String> = Vec::new();
    for environment in split_environments(required) {
        if excluded.contains(&environment.to_lowercase()) && !conflicts.iter().any(|c| c.eq_ignore_ascii_case(environment)) {
            conflicts.push(environment.to_string());
        }
    }
    conflicts
}

fn split_environments(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn malformed_config(condition: &Condition) -> Option<&'static str> {
    let has_comparison = condition.equals.is_some() || condition.not_equals.is_some();
    match condition.config_value.as_deref() {
        Some(key) if key.trim().is_empty() => Some("names a blank configuration key"),
        Some(_) if !has_comparison => Some("names a configuration key without an equals or not-equals value"),
        None if has_comparison => Some("compares a configuration value without naming its key"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collect;
    use crate::config::VerifierOptions;
    use crate::declaration::DeclarationFragment;

    fn kinds(fragments: &[DeclarationFragment]) -> Vec<(DiagnosticKind, String)> {
        let options = VerifierOptions::default();
        let collected = collect(fragments);
        let registry = Registry::build(&collected.declarations, &collected.arena, true);
        let mut buffer = DiagnosticBuffer::new();
        let graph = DependencyGraph::build(&collected.declarations, &registry, &options, &mut buffer);
        check_resolution(&graph, &registry, &mut buffer);
        check_declarations(&collected.declarations, &mut buffer);
        buffer.into_vec().into_iter().map(|d| (d.kind, d.related.to_string())).collect()
    }

    #[test]
    fn missing_and_unregistered_implementations() {
        let found = kinds(&[
            DeclarationFragment::class("A").singleton().depends_on_all(["IMissing", "IPlain"]),
            DeclarationFragment::class("Plain").implements("IPlain"),
        ]);
        assert_eq!(
            found,
            vec![
                (DiagnosticKind::NoImplementation, "IMissing".to_string()),
                (DiagnosticKind::ImplementationUnregistered, "IPlain".to_string()),
            ]
        );
    }

    #[test]
    fn empty_collections_are_fine() {
        let found = kinds(&[DeclarationFragment::class("A").singleton().depends_on("IEnumerable<IPlugin>")]);
        assert!(found.is_empty());
    }

    #[test]
    fn duplicate_and_conflicting_declarations() {
        let found = kinds(&[
            DeclarationFragment::class("B").scoped().implements("IB"),
            DeclarationFragment::class("A")
                .scoped()
                .depends_on_all(["IB", "IB"])
                .depends_on("IB")
                .inject_field("b", "IB"),
        ]);
        let rule_kinds: Vec<_> = found.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            rule_kinds,
            vec![
                DiagnosticKind::DuplicateWithinDeclaration,
                DiagnosticKind::DuplicateDependency,
                DiagnosticKind::ConflictingDeclarationStyles,
            ]
        );
    }

    #[test]
    fn exclusion_of_unimplemented_contract() {
        let found = kinds(&[DeclarationFragment::class("A")
            .scoped()
            .implements("IA")
            .skip_registration("IA")
            .skip_registration("IOther")]);
        assert_eq!(found, vec![(DiagnosticKind::UnnecessaryExclusion, "IOther".to_string())]);
    }

    #[test]
    fn conditional_markers() {
        let found = kinds(&[
            DeclarationFragment::class("Empty").conditional(),
            DeclarationFragment::class("Env").when(Condition::environment("Dev, Test").with_not_environment("test")),
            DeclarationFragment::class("Same").when(Condition::config_equals("Mode", "x").with_not_equals("x")),
            DeclarationFragment::class("NoKey").when(Condition::default().with_equals("x")),
            DeclarationFragment::class("NoValue").when(Condition::default().with_config_value("Mode")),
            DeclarationFragment::class("Blank").when(Condition::config_equals("  ", "x")),
            DeclarationFragment::class("Fine").when(Condition::config_not_equals("Mode", "off")),
        ]);
        assert_eq!(
            found,
            vec![
                (DiagnosticKind::ConditionalEmpty, String::new()),
                (DiagnosticKind::ConditionalConflicting, "environment:Test".to_string()),
                (DiagnosticKind::ConditionalConflicting, "config:Mode".to_string()),
                (DiagnosticKind::ConditionalMalformedConfig, "config:".to_string()),
                (DiagnosticKind::ConditionalMalformedConfig, "config:Mode".to_string()),
                (DiagnosticKind::ConditionalMalformedConfig, "config:  ".to_string()),
            ]
        );
    }
}
