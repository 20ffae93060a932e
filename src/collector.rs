//! Declaration collection: merges partial fragments into one declaration per type.

use crate::arena::{TypeArena, TypeRecord};
use crate::declaration::{
    DeclarationFragment, DeclarationStyle, DependencyEdge, Identity, Location, ServiceDeclaration, TypeKind,
};
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, Related};
use crate::internal::FastMap;
use crate::lifetime::Lifetime;
use crate::signature::{ContractSignature, TypeExpr};

/// Result of collecting one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Service declarations in source order.
    pub declarations: Vec<ServiceDeclaration>,
    /// Every type seen, services and plain types alike.
    pub arena: TypeArena,
    /// Problems found while parsing fragment signatures.
    pub diagnostics: DiagnosticBuffer,
}

#[derive(Debug)]
struct Merged<'a> {
    identity: Identity,
    fragments: Vec<&'a DeclarationFragment>,
}

/// Merges fragments by identity and builds the declarations and type arena.
///
/// A type becomes a service declaration when any of its fragments carries a
/// lifetime, conditional, background or external marker, or declares a
/// dependency. Output order is the order in which identities first appear.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{collect, DeclarationFragment, Lifetime};
///
/// let collected = collect(&[
///     DeclarationFragment::class("Cache").singleton(),
///     DeclarationFragment::class("Cache").depends_on("IClock"),
///     DeclarationFragment::class("Clock").implements("IClock"),
/// ]);
///
/// assert_eq!(collected.declarations.len(), 1);
/// assert_eq!(collected.declarations[0].lifetime, Lifetime::Singleton);
/// assert_eq!(collected.declarations[0].dependency_edges.len(), 1);
/// assert_eq!(collected.arena.len(), 2);
/// ```
pub fn collect(fragments: &[DeclarationFragment]) -> Collected {
    let mut merged: Vec<Merged<'_>> = Vec::new();
    let mut index: FastMap<Identity, usize> = FastMap::default();
    for fragment in fragments {
        let identity = fragment.identity();
        let slot = *index.entry(identity.clone()).or_insert_with(|| {
            merged.push(Merged { identity, fragments: Vec::new() });
            merged.len() - 1
        });
        merged[slot].fragments.push(fragment);
    }

    let mut diagnostics = DiagnosticBuffer::new();
    let mut arena = TypeArena::new();
    let mut services = Vec::new();

    for (order, group) in merged.iter().enumerate() {
        let mut parser = FragmentParser {
            identity: &group.identity,
            type_params: &group.fragments[0].type_params,
            diagnostics: &mut diagnostics,
        };

        let kind = if group.fragments.iter().any(|f| f.kind == TypeKind::Contract) {
            TypeKind::Contract
        } else {
            TypeKind::Class
        };
        let is_service = kind == TypeKind::Class && group.fragments.iter().any(|f| f.has_service_marker());

        let base_type = group
            .fragments
            .iter()
            .find_map(|f| f.base_type.as_deref().filter(|b| !b.trim().is_empty()))
            .and_then(|base| parser.parse(base, None));

        let mut contracts: Vec<TypeExpr> = Vec::new();
        for raw in group.fragments.iter().flat_map(|f| f.contracts.iter()) {
            if let Some(contract) = parser.parse(raw, None) {
                if !contracts.contains(&contract) {
                    contracts.push(contract);
                }
            }
        }

        arena.insert(TypeRecord {
            identity: group.identity.clone(),
            type_params: parser.type_params.to_vec(),
            kind,
            base_type: base_type.clone(),
            contracts,
            is_service,
            order,
        });

        if is_service {
            services.push((order, group, base_type));
        }
    }

    let mut declarations = Vec::with_capacity(services.len());
    for (order, group, base_type) in services {
        let first = group.fragments[0];
        let mut parser = FragmentParser {
            identity: &group.identity,
            type_params: &first.type_params,
            diagnostics: &mut diagnostics,
        };

        let lifetimes: Vec<Lifetime> = group.fragments.iter().filter_map(|f| f.lifetime).collect();
        if lifetimes.windows(2).any(|pair| pair[0] != pair[1]) {
            tracing::debug!(service = %group.identity, ?lifetimes, "fragments disagree on lifetime, first one wins");
        }

        let mut excluded_contracts: Vec<ContractSignature> = Vec::new();
        for raw in group.fragments.iter().flat_map(|f| f.excluded_contracts.iter()) {
            if let Some(contract) = parser.parse(raw, None) {
                let contract = ContractSignature::new(contract);
                if !excluded_contracts.contains(&contract) {
                    excluded_contracts.push(contract);
                }
            }
        }

        // List groups are numbered per fragment; shift them so markers of
        // different fragments never share a group.
        let mut dependency_edges = Vec::new();
        let mut group_offset = 0;
        for fragment in &group.fragments {
            let mut groups_used = 0;
            for spec in &fragment.dependencies {
                let style = match &spec.style {
                    DeclarationStyle::List { group } => {
                        groups_used = groups_used.max(group + 1);
                        DeclarationStyle::List { group: group + group_offset }
                    }
                    field => field.clone(),
                };
                let location = spec.location.clone().or_else(|| fragment.location.clone());
                if let Some(target) = parser.parse(&spec.target, location.clone()) {
                    dependency_edges.push(DependencyEdge {
                        target: ContractSignature::new(target),
                        wrapping: spec.wrapping,
                        style,
                        location,
                    });
                }
            }
            group_offset += groups_used;
        }

        declarations.push(ServiceDeclaration {
            identity: group.identity.clone(),
            type_params: first.type_params.clone(),
            lifetime: lifetimes.first().copied().unwrap_or(Lifetime::DEFAULT),
            is_external: group.fragments.iter().any(|f| f.is_external),
            is_conditional: group.fragments.iter().any(|f| f.is_conditional),
            conditions: group.fragments.iter().flat_map(|f| f.conditions.iter().cloned()).collect(),
            is_background: group.fragments.iter().any(|f| f.is_background),
            suppress_background_lifetime_check: group
                .fragments
                .iter()
                .any(|f| f.suppress_background_lifetime_check),
            base_type: base_type.map(ContractSignature::new),
            implemented_contracts: arena.collect_contracts(&group.identity),
            excluded_contracts,
            dependency_edges,
            location: group.fragments.iter().find_map(|f| f.location.clone()),
            order,
        });
    }

    tracing::debug!(
        fragments = fragments.len(),
        types = arena.len(),
        declarations = declarations.len(),
        malformed = diagnostics.len(),
        "collected declarations"
    );

    Collected {
        declarations,
        arena,
        diagnostics,
    }
}

/// Builds an arena from already-collected declarations.
///
/// Used when the parsing layer hands over finished declarations; plain
/// types are then unknown and inheritance walks see declarations only.
pub fn arena_from_declarations(declarations: &[ServiceDeclaration]) -> TypeArena {
    let mut arena = TypeArena::new();
    for declaration in declarations {
        arena.insert(TypeRecord {
            identity: declaration.identity.clone(),
            type_params: declaration.type_params.clone(),
            kind: TypeKind::Class,
            base_type: declaration.base_type.as_ref().map(|b| b.expr().clone()),
            contracts: declaration
                .implemented_contracts
                .iter()
                .map(|c| c.expr().clone())
                .collect(),
            is_service: true,
            order: declaration.order,
        });
    }
    arena
}

struct FragmentParser<'a> {
    identity: &'a Identity,
    type_params: &'a [String],
    diagnostics: &'a mut DiagnosticBuffer,
}

impl FragmentParser<'_> {
    fn parse(&mut self, raw: &str, location: Option<Location>) -> Option<TypeExpr> {
        match TypeExpr::parse(raw, self.type_params) {
            Ok(expr) => Some(expr),
            Err(error) => {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MalformedSignature,
                        self.identity.clone(),
                        Related::Text(raw.to_string()),
                        error.to_string(),
                    )
                    .at(location),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{Condition, Wrapping};

    #[test]
    fn types_without_markers_are_not_declarations() {
        let collected = collect(&[
            DeclarationFragment::class("Plain").implements("IPlain"),
            DeclarationFragment::contract("IPlain"),
        ]);
        assert!(collected.declarations.is_empty());
        assert_eq!(collected.arena.len(), 2);
    }

    #[test]
    fn markers_alone_make_a_declaration_with_default_lifetime() {
        let collected = collect(&[DeclarationFragment::class("Job").when(Condition::environment("Dev"))]);
        assert_eq!(collected.declarations.len(), 1);
        assert!(collected.declarations[0].is_conditional);
        assert_eq!(collected.declarations[0].lifetime, Lifetime::DEFAULT);
    }

    #[test]
    fn partial_fragments_merge_in_first_appearance_order() {
        let collected = collect(&[
            DeclarationFragment::class("B").scoped(),
            DeclarationFragment::class("A").singleton().depends_on("IX"),
            DeclarationFragment::class("B").depends_on("IY"),
            DeclarationFragment::class("A").depends_on("IZ").transient(),
        ]);
        let names: Vec<_> = collected.declarations.iter().map(|d| d.identity.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        let a = &collected.declarations[1];
        assert_eq!(a.lifetime, Lifetime::Singleton);
        let styles: Vec<_> = a.dependency_edges.iter().map(|e| e.style.clone()).collect();
        assert_eq!(
            styles,
            vec![DeclarationStyle::List { group: 0 }, DeclarationStyle::List { group: 1 }]
        );
    }

    #[test]
    fn contracts_are_inherited_through_plain_bases() {
        let collected = collect(&[
            DeclarationFragment::class("RepoBase").type_params(["T"]).implements("IRepo<T>"),
            DeclarationFragment::class("UserRepo").extends("RepoBase<User>").scoped(),
        ]);
        let repo = &collected.declarations[0];
        let contracts: Vec<_> = repo.implemented_contracts.iter().map(|c| c.to_string()).collect();
        assert_eq!(contracts, vec!["IRepo<User>"]);
        assert_eq!(repo.base_type.as_ref().map(|b| b.to_string()).as_deref(), Some("RepoBase<User>"));
    }

    #[test]
    fn malformed_targets_are_reported_and_dropped() {
        let collected = collect(&[DeclarationFragment::class("A")
            .singleton()
            .depends_on("IRepo<User")
            .inject_wrapped("lazy", "Lazy<IB>", Wrapping::Deferred)]);
        assert_eq!(collected.declarations[0].dependency_edges.len(), 1);
        let diagnostics = collected.diagnostics.into_vec();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::MalformedSignature);
        assert_eq!(diagnostics[0].related, Related::Text("IRepo<User".to_string()));
    }
}
