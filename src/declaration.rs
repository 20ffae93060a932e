//! Declaration model: the input fragments and the collected service declarations.

use std::fmt;

#[cfg(feature = "graph-export")]
use serde::{Deserialize, Serialize};

use crate::lifetime::Lifetime;
use crate::signature::ContractSignature;

/// Canonical identity of a declared type: its name and generic arity.
///
/// ```rust
/// use ferrous_di_verify::Identity;
///
/// assert_eq!(Identity::new("Repository", 1).to_string(), "Repository<_>");
/// assert_eq!(Identity::new("UserService", 0).to_string(), "UserService");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct Identity {
    pub name: String,
    pub arity: usize,
}

impl Identity {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Identity { name: name.into(), arity }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.arity > 0 {
            f.write_str("<")?;
            for i in 0..self.arity {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str("_")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// Source position attached to declarations, edges and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location { file: file.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// How a dependency reference wraps its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub enum Wrapping {
    /// Plain reference to one instance.
    #[default]
    Direct,
    /// "Has many": a collection of every implementation. Not a cycle edge.
    Collection,
    /// Lazily resolved reference. Still a cycle edge and still lifetime-checked.
    Deferred,
}

impl Wrapping {
    /// Combines two wrapping layers; a collection anywhere wins, then deferral.
    pub fn combine(self, inner: Wrapping) -> Wrapping {
        match (self, inner) {
            (Wrapping::Collection, _) | (_, Wrapping::Collection) => Wrapping::Collection,
            (Wrapping::Deferred, _) | (_, Wrapping::Deferred) => Wrapping::Deferred,
            _ => Wrapping::Direct,
        }
    }

    /// Whether edges with this wrapping take part in cycle detection.
    pub fn is_strong(self) -> bool {
        !matches!(self, Wrapping::Collection)
    }
}

/// Declaration style a dependency was written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclarationStyle {
    /// A dependency written as an injected field.
    Field { name: String },
    /// A dependency listed in a type-list marker; `group` numbers the marker
    /// within its declaration.
    List { group: usize },
}

/// One resolved dependency reference of a collected declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub target: ContractSignature,
    pub wrapping: Wrapping,
    pub style: DeclarationStyle,
    pub location: Option<Location>,
}

/// One condition of a conditional service.
///
/// Environment lists are comma separated. A config comparison names a key
/// and expects either `equals` or `not_equals`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Condition {
    pub environment: Option<String>,
    pub not_environment: Option<String>,
    pub config_value: Option<String>,
    pub equals: Option<String>,
    pub not_equals: Option<String>,
}

impl Condition {
    pub fn environment(env: impl Into<String>) -> Self {
        Condition { environment: Some(env.into()), ..Default::default() }
    }

    pub fn not_environment(env: impl Into<String>) -> Self {
        Condition { not_environment: Some(env.into()), ..Default::default() }
    }

    pub fn config_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Condition {
            config_value: Some(key.into()),
            equals: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn config_not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Condition {
            config_value: Some(key.into()),
            not_equals: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    pub fn with_not_environment(mut self, env: impl Into<String>) -> Self {
        self.not_environment = Some(env.into());
        self
    }

    pub fn with_config_value(mut self, key: impl Into<String>) -> Self {
        self.config_value = Some(key.into());
        self
    }

    pub fn with_equals(mut self, value: impl Into<String>) -> Self {
        self.equals = Some(value.into());
        self
    }

    pub fn with_not_equals(mut self, value: impl Into<String>) -> Self {
        self.not_equals = Some(value.into());
        self
    }

    /// True if no field carries any content.
    pub fn is_empty(&self) -> bool {
        [&self.environment, &self.not_environment, &self.config_value, &self.equals, &self.not_equals]
            .iter()
            .all(|field| field.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

/// A service's complete, collected metadata.
///
/// Built by the [`collector`](crate::collector) from one or more
/// fragments and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ServiceDeclaration {
    pub identity: Identity,
    pub type_params: Vec<String>,
    pub lifetime: Lifetime,
    pub is_external: bool,
    pub is_conditional: bool,
    pub conditions: Vec<Condition>,
    pub is_background: bool,
    pub suppress_background_lifetime_check: bool,
    pub base_type: Option<ContractSignature>,
    /// Own, inherited and super-contracts, in first-seen order.
    pub implemented_contracts: Vec<ContractSignature>,
    pub excluded_contracts: Vec<ContractSignature>,
    pub dependency_edges: Vec<DependencyEdge>,
    pub location: Option<Location>,
    /// Position in source declaration order.
    pub order: usize,
}

impl ServiceDeclaration {
    /// The declaration's own type as a signature, e.g. `Repository<T>`.
    pub fn self_signature(&self) -> ContractSignature {
        crate::arena::self_signature(&self.identity, &self.type_params)
    }

    /// Contracts the service is registered under: its own type plus every
    /// implemented contract not removed by an exclusion marker.
    pub fn registered_contracts(&self) -> impl Iterator<Item = ContractSignature> + '_ {
        std::iter::once(self.self_signature()).chain(
            self.implemented_contracts
                .iter()
                .filter(|contract| !self.excluded_contracts.contains(contract))
                .cloned(),
        )
    }
}

/// Kind of a source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    Class,
    /// An abstract contract (interface); may list super-contracts.
    Contract,
}

/// A dependency as written in source, before signature parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub target: String,
    pub wrapping: Wrapping,
    pub style: DeclarationStyle,
    pub location: Option<Location>,
}

/// A raw, possibly partial declaration as produced by the parsing layer.
///
/// Many fragments may describe one logical type (partial declarations);
/// the collector merges them by identity.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{DeclarationFragment, Lifetime};
///
/// let fragment = DeclarationFragment::class("UserService")
///     .singleton()
///     .implements("IUserService")
///     .depends_on("IUserRepository")
///     .inject_field("clock", "IClock");
///
/// assert_eq!(fragment.lifetime, Some(Lifetime::Singleton));
/// assert_eq!(fragment.dependencies.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeclarationFragment {
    pub name: String,
    pub type_params: Vec<String>,
    pub kind: TypeKind,
    pub base_type: Option<String>,
    pub contracts: Vec<String>,
    pub lifetime: Option<Lifetime>,
    pub is_external: bool,
    pub is_conditional: bool,
    pub conditions: Vec<Condition>,
    pub is_background: bool,
    pub suppress_background_lifetime_check: bool,
    pub excluded_contracts: Vec<String>,
    pub dependencies: Vec<DependencySpec>,
    pub location: Option<Location>,
    next_group: usize,
}

impl DeclarationFragment {
    /// A fragment of a concrete class.
    pub fn class(name: impl Into<String>) -> Self {
        DeclarationFragment { name: name.into(), ..Default::default() }
    }

    /// A fragment of a contract (interface).
    pub fn contract(name: impl Into<String>) -> Self {
        DeclarationFragment {
            name: name.into(),
            kind: TypeKind::Contract,
            ..Default::default()
        }
    }

    pub fn type_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn singleton(self) -> Self {
        self.lifetime(Lifetime::Singleton)
    }

    pub fn scoped(self) -> Self {
        self.lifetime(Lifetime::Scoped)
    }

    pub fn transient(self) -> Self {
        self.lifetime(Lifetime::Transient)
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    /// Adds an implemented contract (or, for a contract fragment, a super-contract).
    pub fn implements(mut self, contract: impl Into<String>) -> Self {
        self.contracts.push(contract.into());
        self
    }

    pub fn external(mut self) -> Self {
        self.is_external = true;
        self
    }

    pub fn background(mut self) -> Self {
        self.is_background = true;
        self
    }

    pub fn suppress_background_lifetime_check(mut self) -> Self {
        self.suppress_background_lifetime_check = true;
        self
    }

    /// Marks the service conditional and adds a condition.
    pub fn when(mut self, condition: Condition) -> Self {
        self.is_conditional = true;
        self.conditions.push(condition);
        self
    }

    /// Marks the service conditional without adding a condition.
    pub fn conditional(mut self) -> Self {
        self.is_conditional = true;
        self
    }

    /// Adds an exclusion marker: do not register under `contract`.
    pub fn skip_registration(mut self, contract: impl Into<String>) -> Self {
        self.excluded_contracts.push(contract.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Adds a single-entry list-style dependency.
    pub fn depends_on(self, target: impl Into<String>) -> Self {
        self.depends_on_all([target])
    }

    /// Adds one list-style marker naming several targets.
    pub fn depends_on_all<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = self.next_group;
        self.next_group += 1;
        for target in targets {
            self.dependencies.push(DependencySpec {
                target: target.into(),
                wrapping: Wrapping::Direct,
                style: DeclarationStyle::List { group },
                location: None,
            });
        }
        self
    }

    /// Adds a field-style dependency.
    pub fn inject_field(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.dependencies.push(DependencySpec {
            target: target.into(),
            wrapping: Wrapping::Direct,
            style: DeclarationStyle::Field { name: field.into() },
            location: None,
        });
        self
    }

    /// Adds a field-style dependency with an explicit wrapping mode.
    pub fn inject_wrapped(mut self, field: impl Into<String>, target: impl Into<String>, wrapping: Wrapping) -> Self {
        self.dependencies.push(DependencySpec {
            target: target.into(),
            wrapping,
            style: DeclarationStyle::Field { name: field.into() },
            location: None,
        });
        self
    }

    /// Adds a fully specified dependency.
    pub fn dependency(mut self, spec: DependencySpec) -> Self {
        if let DeclarationStyle::List { group } = spec.style {
            self.next_group = self.next_group.max(group + 1);
        }
        self.dependencies.push(spec);
        self
    }

    /// Whether this fragment carries a service or dependency marker.
    pub fn has_service_marker(&self) -> bool {
        self.lifetime.is_some()
            || self.is_conditional
            || self.is_background
            || self.is_external
            || !self.dependencies.is_empty()
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.type_params.len())
    }
}
