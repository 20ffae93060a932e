//! Contract-to-implementation registry and resolution.
//!
//! Resolution precedence is fixed: exact signature, then the generic-normalized
//! form, then the heuristic [`FallbackResolver`] for constructed targets. The
//! registry is built once per snapshot and read-only afterwards, so lookups
//! are pure functions of the target and the index.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::arena::{self, TypeArena};
use crate::declaration::{Identity, ServiceDeclaration, TypeKind};
use crate::internal::{FastMap, FastSet};
use crate::lifetime::Lifetime;
use crate::signature::{ContractSignature, TypeExpr};

/// Contract signature → implementing identities, in declaration order.
///
/// Open generic implementations appear twice: under their exact signature
/// and under the generic-normalized one. This is the read-only artifact the
/// code-generation layer consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplementationIndex {
    entries: BTreeMap<ContractSignature, Vec<Identity>>,
}

impl ImplementationIndex {
    fn insert(&mut self, contract: ContractSignature, identity: &Identity) {
        let implementations = self.entries.entry(contract).or_default();
        if !implementations.contains(identity) {
            implementations.push(identity.clone());
        }
    }

    pub fn get(&self, contract: &ContractSignature) -> &[Identity] {
        self.entries.get(contract).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, contract: &ContractSignature) -> bool {
        self.entries.contains_key(contract)
    }

    /// Entries sorted by contract signature.
    pub fn iter(&self) -> impl Iterator<Item = (&ContractSignature, &[Identity])> {
        self.entries.iter().map(|(contract, ids)| (contract, ids.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which lookup stage produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Exact,
    Normalized,
    Fallback,
}

/// Candidates found for one target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub stage: Option<ResolutionStage>,
    pub candidates: Vec<Identity>,
}

impl Resolution {
    fn found(stage: ResolutionStage, candidates: Vec<Identity>) -> Self {
        Resolution { stage: Some(stage), candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Last-resort resolution strategy, used only when exact and normalized lookups fail.
///
/// Implementations are heuristics, not correctness guarantees. They see the
/// constructed target and every open contract in declaration order.
pub trait FallbackResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, target: &ContractSignature, open_contracts: &[(ContractSignature, Identity)]) -> Vec<Identity>;
}

/// Matches open contracts by unqualified base name and type-argument count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArityFallback;

impl FallbackResolver for ArityFallback {
    fn resolve(&self, target: &ContractSignature, open_contracts: &[(ContractSignature, Identity)]) -> Vec<Identity> {
        let wanted = simple_name(target.base_name());
        let mut found: Vec<Identity> = Vec::new();
        for (contract, identity) in open_contracts {
            if contract.arity() == target.arity()
                && simple_name(contract.base_name()) == wanted
                && !found.contains(identity)
            {
                found.push(identity.clone());
            }
        }
        found
    }
}

/// Disables heuristic resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackResolver for NoFallback {
    fn resolve(&self, _target: &ContractSignature, _open_contracts: &[(ContractSignature, Identity)]) -> Vec<Identity> {
        Vec::new()
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

/// One index plus what normalization needs to query it.
#[derive(Debug, Clone, Default)]
struct ContractTable {
    index: ImplementationIndex,
    open_keys: FastSet<(String, usize)>,
    open_contracts: Vec<(ContractSignature, Identity)>,
}

impl ContractTable {
    fn build<'a>(entries: impl IntoIterator<Item = (&'a Identity, Vec<ContractSignature>)>) -> Self {
        let entries: Vec<(&Identity, Vec<ContractSignature>)> = entries.into_iter().collect();
        let mut table = ContractTable::default();

        for (identity, contracts) in &entries {
            for contract in contracts.iter().filter(|c| c.is_open()) {
                if let Some((name, arity)) = contract.expr().open_key() {
                    table.open_keys.insert((name.to_string(), arity));
                }
                table.open_contracts.push((contract.clone(), (*identity).clone()));
            }
        }

        for (identity, contracts) in &entries {
            for contract in contracts {
                table.index.insert(contract.clone(), identity);
                if contract.is_open() && contract.expr().is_generic() {
                    let normalized = table.normalize(contract.expr());
                    table.index.insert(ContractSignature::new(normalized), identity);
                }
            }
        }
        table
    }

    fn normalize(&self, expr: &TypeExpr) -> TypeExpr {
        let keep = |name: &str, arity: usize| self.open_keys.contains(&(name.to_string(), arity));
        expr.normalized(&keep)
    }

    fn lookup(&self, target: &ContractSignature, fallback: &dyn FallbackResolver) -> Resolution {
        let exact = self.index.get(target);
        if !exact.is_empty() {
            return Resolution::found(ResolutionStage::Exact, exact.to_vec());
        }

        // Closed registrations have no normalized entry, so an open target
        // only ever meets open registrations here.
        let expr = target.expr();
        if !expr.is_generic() {
            return Resolution::default();
        }

        let nested = self.normalize(expr);
        let found = self.index.get(&ContractSignature::new(nested.clone()));
        if !found.is_empty() {
            return Resolution::found(ResolutionStage::Normalized, found.to_vec());
        }
        let flat = expr.flat_normalized();
        if flat != nested {
            let found = self.index.get(&ContractSignature::new(flat));
            if !found.is_empty() {
                return Resolution::found(ResolutionStage::Normalized, found.to_vec());
            }
        }

        if !expr.is_constructed() {
            return Resolution::default();
        }
        let guessed = fallback.resolve(target, &self.open_contracts);
        if guessed.is_empty() {
            Resolution::default()
        } else {
            Resolution::found(ResolutionStage::Fallback, guessed)
        }
    }
}

/// Lookup structures for one snapshot.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{collect, ContractSignature, DeclarationFragment, Registry, ResolutionStage};
///
/// let collected = collect(&[
///     DeclarationFragment::class("Repository").type_params(["T"]).scoped().implements("IRepo<T>"),
/// ]);
/// let registry = Registry::build(&collected.declarations, &collected.arena, true);
///
/// let target = ContractSignature::parse("IRepo<User>", &[]).unwrap();
/// let resolution = registry.resolve(&target);
/// assert_eq!(resolution.stage, Some(ResolutionStage::Normalized));
/// assert_eq!(resolution.candidates[0].name, "Repository");
/// ```
#[derive(Debug)]
pub struct Registry {
    registered: ContractTable,
    unregistered: ContractTable,
    lifetimes: FastMap<Identity, Lifetime>,
    externals: FastSet<Identity>,
    fallback: Arc<dyn FallbackResolver>,
}

impl Registry {
    /// Builds the registry; `heuristic_fallback` selects [`ArityFallback`] or [`NoFallback`].
    pub fn build(declarations: &[ServiceDeclaration], arena: &TypeArena, heuristic_fallback: bool) -> Self {
        let fallback: Arc<dyn FallbackResolver> = if heuristic_fallback {
            Arc::new(ArityFallback)
        } else {
            Arc::new(NoFallback)
        };
        Self::with_fallback(declarations, arena, fallback)
    }

    /// Builds the registry with a custom fallback strategy.
    pub fn with_fallback(
        declarations: &[ServiceDeclaration],
        arena: &TypeArena,
        fallback: Arc<dyn FallbackResolver>,
    ) -> Self {
        let registered = ContractTable::build(
            declarations
                .iter()
                .map(|d| (&d.identity, d.registered_contracts().collect())),
        );

        let unregistered = ContractTable::build(
            arena
                .records()
                .filter(|r| !r.is_service && r.kind == TypeKind::Class)
                .map(|r| {
                    let mut contracts = vec![arena::self_signature(&r.identity, &r.type_params)];
                    contracts.extend(arena.collect_contracts(&r.identity));
                    (&r.identity, contracts)
                }),
        );

        let lifetimes = declarations
            .iter()
            .map(|d| (d.identity.clone(), d.lifetime))
            .collect();
        let externals = declarations
            .iter()
            .filter(|d| d.is_external)
            .map(|d| d.identity.clone())
            .collect();

        tracing::debug!(
            contracts = registered.index.len(),
            unregistered_contracts = unregistered.index.len(),
            open_contracts = registered.open_contracts.len(),
            ?fallback,
            "built implementation registry"
        );

        Registry {
            registered,
            unregistered,
            lifetimes,
            externals,
            fallback,
        }
    }

    /// Resolves a target against registered services.
    pub fn resolve(&self, target: &ContractSignature) -> Resolution {
        let resolution = self.registered.lookup(target, self.fallback.as_ref());
        tracing::trace!(%target, stage = ?resolution.stage, candidates = resolution.candidates.len(), "resolved");
        resolution
    }

    /// Resolves a target against known types that carry no service marker.
    pub fn resolve_unregistered(&self, target: &ContractSignature) -> Resolution {
        self.unregistered.lookup(target, self.fallback.as_ref())
    }

    pub fn index(&self) -> &ImplementationIndex {
        &self.registered.index
    }

    pub fn lifetime_of(&self, identity: &Identity) -> Option<Lifetime> {
        self.lifetimes.get(identity).copied()
    }

    pub fn is_registered(&self, identity: &Identity) -> bool {
        self.lifetimes.contains_key(identity)
    }

    pub fn is_external(&self, identity: &Identity) -> bool {
        self.externals.contains(identity)
    }
}
