//! Lifetime validation: captive dependencies, inheritance chains and background services.

use crate::arena::TypeArena;
use crate::config::VerifierOptions;
use crate::declaration::{DependencyEdge, Identity, Location, ServiceDeclaration};
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, Related};
use crate::graph::{unwrap_target, DependencyGraph};
use crate::internal::{catch_fault, FastMap, FastSet};
use crate::lifetime::{check_lifetimes, Lifetime, LifetimeCompatibility};
use crate::registry::{Registry, ResolutionStage};
use crate::signature::{ContractSignature, TypeExpr};

/// Checks every non-external declaration against the lifetime rule table.
///
/// Read-only over the snapshot; safe to run next to cycle detection.
pub struct LifetimeValidator<'a> {
    declarations: &'a [ServiceDeclaration],
    by_identity: FastMap<&'a Identity, &'a ServiceDeclaration>,
    arena: &'a TypeArena,
    registry: &'a Registry,
    graph: &'a DependencyGraph,
    options: &'a VerifierOptions,
}

impl<'a> LifetimeValidator<'a> {
    pub fn new(
        declarations: &'a [ServiceDeclaration],
        arena: &'a TypeArena,
        registry: &'a Registry,
        graph: &'a DependencyGraph,
        options: &'a VerifierOptions,
    ) -> Self {
        let by_identity = declarations.iter().map(|d| (&d.identity, d)).collect();
        LifetimeValidator {
            declarations,
            by_identity,
            arena,
            registry,
            graph,
            options,
        }
    }

    pub fn validate(&self, diagnostics: &mut DiagnosticBuffer) {
        if !self.options.lifetime_validation_enabled {
            tracing::debug!("lifetime validation disabled");
            return;
        }

        let before = diagnostics.len();
        for declaration in self.declarations.iter().filter(|d| !d.is_external) {
            match catch_fault(&declaration.identity, || self.validate_declaration(declaration)) {
                Ok(found) => diagnostics.extend(found),
                Err(error) => diagnostics.push(Diagnostic::new(
                    DiagnosticKind::InternalError,
                    declaration.identity.clone(),
                    Related::Text("lifetimes".to_string()),
                    error.to_string(),
                )),
            }
        }
        tracing::debug!(violations = diagnostics.len() - before, "lifetime validation finished");
    }

    fn validate_declaration(&self, declaration: &ServiceDeclaration) -> Vec<Diagnostic> {
        let mut found = Vec::new();

        if declaration.is_background
            && declaration.lifetime != Lifetime::Singleton
            && !declaration.suppress_background_lifetime_check
        {
            found.push(
                Diagnostic::new(
                    DiagnosticKind::BackgroundServiceWrongLifetime,
                    declaration.identity.clone(),
                    Related::None,
                    format!(
                        "Background service '{}' is registered as {} but must be a singleton",
                        declaration.identity, declaration.lifetime
                    ),
                )
                .at(declaration.location.clone()),
            );
        }

        if declaration.lifetime != Lifetime::Singleton {
            return found;
        }

        let mut fallback_targets: FastSet<&ContractSignature> = FastSet::default();
        for edge in self.graph.edges_from(&declaration.identity) {
            if edge.stage == ResolutionStage::Fallback && !fallback_targets.insert(&edge.target) {
                continue;
            }
            if let Some(diagnostic) = self.captive(declaration, &edge.to, edge.location.clone(), false) {
                found.push(diagnostic);
            }
        }

        for ancestor in self.arena.ancestors(&declaration.identity) {
            let ancestor_id = &ancestor.record.identity;
            // External bases are owned elsewhere; only their own bases are checked.
            if self.registry.is_external(ancestor_id) {
                continue;
            }
            if let Some(lifetime) = self.registry.lifetime_of(ancestor_id) {
                if lifetime != Lifetime::Singleton {
                    found.push(
                        Diagnostic::new(
                            DiagnosticKind::InheritanceChainLifetimeViolation,
                            declaration.identity.clone(),
                            Related::Identity(ancestor_id.clone()),
                            format!(
                                "Singleton '{}' inherits from {} service '{}'",
                                declaration.identity, lifetime, ancestor_id
                            ),
                        )
                        .at(declaration.location.clone()),
                    );
                }
            }

            let Some(base) = self.by_identity.get(ancestor_id) else {
                continue;
            };
            for edge in &base.dependency_edges {
                let target = edge.target.expr().substitute(&ancestor.bindings);
                for candidate in self.resolve_inherited(&target, edge) {
                    if let Some(diagnostic) = self.captive(declaration, &candidate, edge.location.clone(), true) {
                        found.push(diagnostic);
                    }
                }
            }
        }
        found
    }

    /// Candidates whose lifetime counts for an inherited dependency.
    fn resolve_inherited(&self, target: &TypeExpr, edge: &DependencyEdge) -> Vec<Identity> {
        let (inner, _) = unwrap_target(target, edge.wrapping, self.options);
        if matches!(inner, TypeExpr::Param(_)) || self.options.is_framework_type(&inner) {
            return Vec::new();
        }
        let resolution = self.registry.resolve(&ContractSignature::new(inner));
        let mut candidates: Vec<Identity> = resolution
            .candidates
            .into_iter()
            .filter(|c| !self.registry.is_external(c))
            .collect();
        if resolution.stage == Some(ResolutionStage::Fallback) {
            candidates.truncate(1);
        }
        candidates
    }

    fn captive(
        &self,
        consumer: &ServiceDeclaration,
        dependency: &Identity,
        location: Option<Location>,
        inherited: bool,
    ) -> Option<Diagnostic> {
        let lifetime = self.registry.lifetime_of(dependency)?;
        let (kind, message) = match check_lifetimes(consumer.lifetime, lifetime) {
            LifetimeCompatibility::Compatible => return None,
            LifetimeCompatibility::SingletonCapturesScoped => (
                DiagnosticKind::SingletonDependsOnScoped,
                format!("Singleton service '{}' cannot depend on scoped service '{}'", consumer.identity, dependency),
            ),
            // Inherited dependencies are only checked for scoped captures.
            LifetimeCompatibility::SingletonCapturesTransient if inherited => return None,
            LifetimeCompatibility::SingletonCapturesTransient => (
                DiagnosticKind::SingletonDependsOnTransient,
                format!(
                    "Singleton '{}' depends on transient '{}' and will always get the same instance",
                    consumer.identity, dependency
                ),
            ),
        };
        let message = if inherited {
            format!("{} (dependency inherited from a base type)", message)
        } else {
            message
        };
        Some(Diagnostic::new(kind, consumer.identity.clone(), Related::Identity(dependency.clone()), message).at(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collect;
    use crate::declaration::DeclarationFragment;

    fn validate(fragments: &[DeclarationFragment], options: &VerifierOptions) -> Vec<(DiagnosticKind, String)> {
        let collected = collect(fragments);
        let registry = Registry::build(&collected.declarations, &collected.arena, options.heuristic_fallback);
        let mut buffer = DiagnosticBuffer::new();
        let graph = DependencyGraph::build(&collected.declarations, &registry, options, &mut buffer);
        LifetimeValidator::new(&collected.declarations, &collected.arena, &registry, &graph, options)
            .validate(&mut buffer);
        buffer
            .into_vec()
            .into_iter()
            .map(|d| (d.kind, d.related.to_string()))
            .collect()
    }

    #[test]
    fn singleton_capturing_scoped_and_transient() {
        let found = validate(
            &[
                DeclarationFragment::class("A").singleton().depends_on_all(["IB", "IC", "ID"]),
                DeclarationFragment::class("B").scoped().implements("IB"),
                DeclarationFragment::class("C").transient().implements("IC"),
                DeclarationFragment::class("D").singleton().implements("ID"),
            ],
            &VerifierOptions::default(),
        );
        assert_eq!(
            found,
            vec![
                (DiagnosticKind::SingletonDependsOnScoped, "B".to_string()),
                (DiagnosticKind::SingletonDependsOnTransient, "C".to_string()),
            ]
        );
    }

    #[test]
    fn scoped_consumers_are_never_captive() {
        let found = validate(
            &[
                DeclarationFragment::class("A").scoped().depends_on("IB"),
                DeclarationFragment::class("B").transient().implements("IB"),
            ],
            &VerifierOptions::default(),
        );
        assert!(found.is_empty());
    }

    #[test]
    fn inherited_dependency_reports_on_the_derived_singleton() {
        let found = validate(
            &[
                DeclarationFragment::class("Base").type_params(["T"]).depends_on("IRepo<T>"),
                DeclarationFragment::class("Derived").singleton().extends("Base<User>"),
                DeclarationFragment::class("UserRepo").scoped().implements("IRepo<User>"),
            ],
            &VerifierOptions::default(),
        );
        assert!(found.contains(&(DiagnosticKind::SingletonDependsOnScoped, "UserRepo".to_string())));
        assert!(found.contains(&(DiagnosticKind::InheritanceChainLifetimeViolation, "Base<_>".to_string())));
    }

    #[test]
    fn external_base_is_not_checked_through_its_subclasses() {
        let found = validate(
            &[
                DeclarationFragment::class("Base").scoped().external().depends_on("IUserContext"),
                DeclarationFragment::class("Worker").singleton().extends("Base"),
                DeclarationFragment::class("UserContext").scoped().implements("IUserContext"),
            ],
            &VerifierOptions::default(),
        );
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn background_services_must_be_singletons_unless_suppressed() {
        let options = VerifierOptions::default();
        let found = validate(&[DeclarationFragment::class("Worker").scoped().background()], &options);
        assert_eq!(found, vec![(DiagnosticKind::BackgroundServiceWrongLifetime, String::new())]);

        let suppressed = validate(
            &[DeclarationFragment::class("Worker")
                .scoped()
                .background()
                .suppress_background_lifetime_check()],
            &options,
        );
        assert!(suppressed.is_empty());
    }

    #[test]
    fn disabled_validation_reports_nothing() {
        let options = VerifierOptions::builder().lifetime_validation_enabled(false).build();
        let found = validate(
            &[
                DeclarationFragment::class("A").singleton().depends_on("B"),
                DeclarationFragment::class("B").scoped(),
            ],
            &options,
        );
        assert!(found.is_empty());
    }
}
