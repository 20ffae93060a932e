//! Arena of every type known to a snapshot and the shared base-chain walk.
//!
//! Service declarations and plain (unmarked) types both live here so that
//! inheritance walks can pass through intermediate classes that carry no
//! service marker of their own.

use std::collections::HashMap;

use crate::declaration::{Identity, TypeKind};
use crate::internal::{FastMap, FastSet};
use crate::signature::{ContractSignature, TypeExpr};

/// Names treated as the implicit universal root of every class hierarchy.
pub const ROOT_TYPES: &[&str] = &["object", "Object", "System.Object"];

/// One type known to the snapshot.
#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub identity: Identity,
    pub type_params: Vec<String>,
    pub kind: TypeKind,
    /// Base type, expressed in this record's type-parameter context.
    pub base_type: Option<TypeExpr>,
    /// Own contracts (for a contract record: its super-contracts).
    pub contracts: Vec<TypeExpr>,
    /// Whether the type carries a service marker.
    pub is_service: bool,
    pub order: usize,
}

/// One step of a base-chain walk.
#[derive(Debug, Clone)]
pub struct Ancestor<'a> {
    pub record: &'a TypeRecord,
    /// The base type as the derived type wrote it, with generics substituted
    /// down to the start of the walk.
    pub signature: TypeExpr,
    /// Bindings from the ancestor's type parameters to the arguments seen.
    pub bindings: HashMap<String, TypeExpr>,
}

/// All types of one snapshot, indexed by identity.
#[derive(Debug, Clone, Default)]
pub struct TypeArena {
    records: Vec<TypeRecord>,
    by_identity: FastMap<Identity, usize>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record; a record with an already known identity replaces the old one.
    pub fn insert(&mut self, record: TypeRecord) {
        match self.by_identity.get(&record.identity) {
            Some(&index) => self.records[index] = record,
            None => {
                self.by_identity.insert(record.identity.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&TypeRecord> {
        self.by_identity.get(identity).map(|&index| &self.records[index])
    }

    /// Looks up the record a signature refers to, by base name and arity.
    pub fn lookup(&self, signature: &TypeExpr) -> Option<&TypeRecord> {
        match signature {
            TypeExpr::Leaf(name) | TypeExpr::Generic { name, .. } => {
                self.get(&Identity::new(name.clone(), signature.arity()))
            }
            _ => None,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &TypeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Walks the base-type chain of `identity`, nearest ancestor first.
    ///
    /// Stops at the universal root, at a base type unknown to the arena, and
    /// on a repeated identity (cyclic inheritance in malformed input).
    pub fn ancestors(&self, identity: &Identity) -> Ancestors<'_> {
        let mut visited = FastSet::default();
        visited.insert(identity.clone());
        let (next, bindings) = match self.get(identity) {
            Some(record) => (record.base_type.clone(), HashMap::new()),
            None => (None, HashMap::new()),
        };
        Ancestors {
            arena: self,
            next,
            bindings,
            visited,
        }
    }

    /// Every contract `identity` implements: its own, those of its ancestors
    /// (with generic arguments substituted) and all super-contracts, in
    /// first-seen order without duplicates.
    pub fn collect_contracts(&self, identity: &Identity) -> Vec<ContractSignature> {
        let Some(record) = self.get(identity) else {
            return Vec::new();
        };

        let mut direct: Vec<TypeExpr> = record.contracts.clone();
        for ancestor in self.ancestors(identity) {
            direct.extend(
                ancestor
                    .record
                    .contracts
                    .iter()
                    .map(|contract| contract.substitute(&ancestor.bindings)),
            );
        }

        let mut seen = FastSet::default();
        let mut ordered = Vec::new();
        let mut pending: Vec<TypeExpr> = direct.into_iter().rev().collect();
        while let Some(contract) = pending.pop() {
            if !seen.insert(contract.clone()) {
                continue;
            }
            if let Some(contract_record) = self.lookup(&contract) {
                if contract_record.kind == TypeKind::Contract {
                    let bindings = bind(&contract_record.type_params, contract.args());
                    for parent in contract_record.contracts.iter().rev() {
                        pending.push(parent.substitute(&bindings));
                    }
                }
            }
            ordered.push(ContractSignature::new(contract));
        }
        ordered
    }
}

/// Iterator returned by [`TypeArena::ancestors`].
pub struct Ancestors<'a> {
    arena: &'a TypeArena,
    next: Option<TypeExpr>,
    bindings: HashMap<String, TypeExpr>,
    visited: FastSet<Identity>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = Ancestor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.next.take()?.substitute(&self.bindings);
        if ROOT_TYPES.contains(&base.base_name()) {
            return None;
        }
        let record = self.arena.lookup(&base)?;
        if !self.visited.insert(record.identity.clone()) {
            return None;
        }
        self.bindings = bind(&record.type_params, base.args());
        self.next = record.base_type.clone();
        Some(Ancestor {
            record,
            signature: base,
            bindings: self.bindings.clone(),
        })
    }
}

fn bind(params: &[String], args: &[TypeExpr]) -> HashMap<String, TypeExpr> {
    params.iter().cloned().zip(args.iter().cloned()).collect()
}

/// A type's own signature, e.g. `Repository<T>` for `Repository` with parameter `T`.
pub fn self_signature(identity: &Identity, type_params: &[String]) -> ContractSignature {
    if type_params.is_empty() {
        ContractSignature::new(TypeExpr::Leaf(identity.name.clone()))
    } else {
        ContractSignature::new(TypeExpr::Generic {
            name: identity.name.clone(),
            args: type_params.iter().cloned().map(TypeExpr::Param).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, params: &[&str], base: Option<&str>, contracts: &[&str], kind: TypeKind) -> TypeRecord {
        let type_params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        TypeRecord {
            identity: Identity::new(name, params.len()),
            base_type: base.map(|b| TypeExpr::parse(b, &type_params).unwrap()),
            contracts: contracts
                .iter()
                .map(|c| TypeExpr::parse(c, &type_params).unwrap())
                .collect(),
            type_params,
            kind,
            is_service: false,
            order: 0,
        }
    }

    #[test]
    fn ancestors_substitute_generic_arguments() {
        let mut arena = TypeArena::new();
        arena.insert(record("Root", &["U"], Some("object"), &["IRoot<U>"], TypeKind::Class));
        arena.insert(record("Base", &["T"], Some("Root<List<T>>"), &[], TypeKind::Class));
        arena.insert(record("Derived", &[], Some("Base<User>"), &[], TypeKind::Class));

        let chain: Vec<String> = arena
            .ancestors(&Identity::new("Derived", 0))
            .map(|a| a.signature.to_string())
            .collect();
        assert_eq!(chain, vec!["Base<User>", "Root<List<User>>"]);

        let contracts: Vec<String> = arena
            .collect_contracts(&Identity::new("Derived", 0))
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(contracts, vec!["IRoot<List<User>>"]);
    }

    #[test]
    fn cyclic_inheritance_terminates() {
        let mut arena = TypeArena::new();
        arena.insert(record("A", &[], Some("B"), &[], TypeKind::Class));
        arena.insert(record("B", &[], Some("A"), &[], TypeKind::Class));
        assert_eq!(arena.ancestors(&Identity::new("A", 0)).count(), 1);
    }

    #[test]
    fn super_contracts_are_expanded_once() {
        let mut arena = TypeArena::new();
        arena.insert(record("IBase", &[], None, &[], TypeKind::Contract));
        arena.insert(record("IReader", &[], None, &["IBase"], TypeKind::Contract));
        arena.insert(record("IWriter", &[], None, &["IBase"], TypeKind::Contract));
        arena.insert(record("Store", &[], None, &["IReader", "IWriter"], TypeKind::Class));
        let contracts: Vec<String> = arena
            .collect_contracts(&Identity::new("Store", 0))
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(contracts, vec!["IReader", "IBase", "IWriter"]);
    }
}
