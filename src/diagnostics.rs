//! Diagnostic records and the emitter that finalizes them.
//!
//! Every analysis stage writes into its own [`DiagnosticBuffer`]. The
//! [`DiagnosticEmitter`] merges the buffers, drops re-discoveries of the
//! same violation, applies the configured severities and sorts the result
//! into a stable order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(any(feature = "config", feature = "graph-export"))]
use serde::{Deserialize, Serialize};

use crate::config::VerifierOptions;
use crate::declaration::{Identity, Location};
use crate::internal::{FastMap, FastSet};
use crate::signature::ContractSignature;

/// Diagnostic severity.
///
/// Parsing is lenient: anything unrecognised becomes `Warning`.
///
/// ```rust
/// use ferrous_di_verify::Severity;
///
/// assert_eq!(Severity::parse_or_default("error"), Severity::Error);
/// assert_eq!(Severity::parse_or_default("loud"), Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(feature = "config", feature = "graph-export"), derive(Serialize))]
#[cfg_attr(any(feature = "config", feature = "graph-export"), derive(Deserialize))]
#[cfg_attr(any(feature = "config", feature = "graph-export"), serde(from = "String"))]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn parse_or_default(value: &str) -> Severity {
        value.parse().unwrap_or(Severity::Warning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Hidden => "hidden",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" | "information" | "suggestion" => Ok(Severity::Info),
            "hidden" | "none" | "silent" => Ok(Severity::Hidden),
            _ => Err(()),
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        Severity::parse_or_default(&value)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable diagnostic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
///
/// Serialized as its kebab-case name; deserialized from a code, a name or
/// the variant name, like every other options source.
#[cfg_attr(any(feature = "config", feature = "graph-export"), derive(Serialize, Deserialize))]
#[cfg_attr(
    any(feature = "config", feature = "graph-export"),
    serde(try_from = "String", into = "String")
)]
pub enum DiagnosticKind {
    NoImplementation,
    ImplementationUnregistered,
    DuplicateDependency,
    ConflictingDeclarationStyles,
    DuplicateWithinDeclaration,
    UnnecessaryExclusion,
    CircularDependency,
    SingletonDependsOnScoped,
    SingletonDependsOnTransient,
    BackgroundServiceWrongLifetime,
    InheritanceChainLifetimeViolation,
    ConditionalEmpty,
    ConditionalConflicting,
    ConditionalMalformedConfig,
    MalformedSignature,
    InternalError,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 16] = [
        DiagnosticKind::NoImplementation,
        DiagnosticKind::ImplementationUnregistered,
        DiagnosticKind::DuplicateDependency,
        DiagnosticKind::ConflictingDeclarationStyles,
        DiagnosticKind::DuplicateWithinDeclaration,
        DiagnosticKind::UnnecessaryExclusion,
        DiagnosticKind::CircularDependency,
        DiagnosticKind::SingletonDependsOnScoped,
        DiagnosticKind::SingletonDependsOnTransient,
        DiagnosticKind::BackgroundServiceWrongLifetime,
        DiagnosticKind::InheritanceChainLifetimeViolation,
        DiagnosticKind::ConditionalEmpty,
        DiagnosticKind::ConditionalConflicting,
        DiagnosticKind::ConditionalMalformedConfig,
        DiagnosticKind::MalformedSignature,
        DiagnosticKind::InternalError,
    ];

    /// Stable code, e.g. `FDV007`.
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::NoImplementation => "FDV001",
            DiagnosticKind::ImplementationUnregistered => "FDV002",
            DiagnosticKind::DuplicateDependency => "FDV003",
            DiagnosticKind::ConflictingDeclarationStyles => "FDV004",
            DiagnosticKind::DuplicateWithinDeclaration => "FDV005",
            DiagnosticKind::UnnecessaryExclusion => "FDV006",
            DiagnosticKind::CircularDependency => "FDV007",
            DiagnosticKind::SingletonDependsOnScoped => "FDV008",
            DiagnosticKind::SingletonDependsOnTransient => "FDV009",
            DiagnosticKind::BackgroundServiceWrongLifetime => "FDV010",
            DiagnosticKind::InheritanceChainLifetimeViolation => "FDV011",
            DiagnosticKind::ConditionalEmpty => "FDV012",
            DiagnosticKind::ConditionalConflicting => "FDV013",
            DiagnosticKind::ConditionalMalformedConfig => "FDV014",
            DiagnosticKind::MalformedSignature => "FDV015",
            DiagnosticKind::InternalError => "FDV099",
        }
    }

    /// Kebab-case name, e.g. `circular-dependency`.
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::NoImplementation => "no-implementation",
            DiagnosticKind::ImplementationUnregistered => "implementation-unregistered",
            DiagnosticKind::DuplicateDependency => "duplicate-dependency-declaration",
            DiagnosticKind::ConflictingDeclarationStyles => "conflicting-declaration-styles",
            DiagnosticKind::DuplicateWithinDeclaration => "duplicate-within-one-declaration",
            DiagnosticKind::UnnecessaryExclusion => "unnecessary-exclusion-marker",
            DiagnosticKind::CircularDependency => "circular-dependency",
            DiagnosticKind::SingletonDependsOnScoped => "singleton-depends-on-scoped",
            DiagnosticKind::SingletonDependsOnTransient => "singleton-depends-on-transient",
            DiagnosticKind::BackgroundServiceWrongLifetime => "background-service-wrong-lifetime",
            DiagnosticKind::InheritanceChainLifetimeViolation => "inheritance-chain-lifetime-violation",
            DiagnosticKind::ConditionalEmpty => "conditional-empty",
            DiagnosticKind::ConditionalConflicting => "conditional-conflicting",
            DiagnosticKind::ConditionalMalformedConfig => "conditional-malformed-config",
            DiagnosticKind::MalformedSignature => "malformed-signature",
            DiagnosticKind::InternalError => "internal-error",
        }
    }

    /// Severity used when the options say nothing about this kind.
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticKind::NoImplementation
            | DiagnosticKind::ImplementationUnregistered
            | DiagnosticKind::DuplicateDependency
            | DiagnosticKind::DuplicateWithinDeclaration
            | DiagnosticKind::UnnecessaryExclusion
            | DiagnosticKind::SingletonDependsOnTransient
            | DiagnosticKind::ConditionalEmpty => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether the kind belongs to lifetime validation.
    pub fn is_lifetime_kind(self) -> bool {
        matches!(
            self,
            DiagnosticKind::SingletonDependsOnScoped
                | DiagnosticKind::SingletonDependsOnTransient
                | DiagnosticKind::BackgroundServiceWrongLifetime
                | DiagnosticKind::InheritanceChainLifetimeViolation
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DiagnosticKind {
    type Err = String;

    /// Accepts the code (`FDV007`), the name (`circular-dependency`) or the
    /// variant name (`CircularDependency`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DiagnosticKind::ALL
            .iter()
            .copied()
            .find(|kind| {
                kind.code().eq_ignore_ascii_case(wanted)
                    || kind.name().eq_ignore_ascii_case(wanted)
                    || format!("{:?}", kind).eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown diagnostic kind '{}'", wanted))
    }
}

impl TryFrom<String> for DiagnosticKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DiagnosticKind> for String {
    fn from(kind: DiagnosticKind) -> Self {
        kind.name().to_string()
    }
}

/// What a diagnostic points at besides its subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Related {
    None,
    Identity(Identity),
    Contract(ContractSignature),
    Cycle(Vec<Identity>),
    Text(String),
}

impl fmt::Display for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::None => Ok(()),
            Related::Identity(identity) => identity.fmt(f),
            Related::Contract(contract) => contract.fmt(f),
            Related::Cycle(path) => {
                for (i, node) in path.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" -> ")?;
                    }
                    node.fmt(f)?;
                }
                Ok(())
            }
            Related::Text(text) => f.write_str(text),
        }
    }
}

/// One finding of the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub subject: Identity,
    pub related: Related,
    pub location: Option<Location>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: Identity, related: Related, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            severity: kind.default_severity(),
            subject,
            related,
            location: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{} {}: {}", self.severity, self.kind.code(), self.message)
    }
}

/// Per-stage accumulator of unfinalized diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBuffer {
    items: Vec<Diagnostic>,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// Merges, deduplicates, configures and orders diagnostics.
pub struct DiagnosticEmitter<'a> {
    options: &'a VerifierOptions,
    order: FastMap<Identity, usize>,
}

impl<'a> DiagnosticEmitter<'a> {
    /// `order` lists subjects in source declaration order.
    pub fn new<'i>(options: &'a VerifierOptions, order: impl IntoIterator<Item = &'i Identity>) -> Self {
        let order = order
            .into_iter()
            .enumerate()
            .map(|(index, identity)| (identity.clone(), index))
            .collect();
        DiagnosticEmitter { options, order }
    }

    /// Finalizes the buffers, in the order given, into the output list.
    pub fn emit(&self, buffers: impl IntoIterator<Item = DiagnosticBuffer>) -> Vec<Diagnostic> {
        if !self.options.diagnostics_enabled {
            return Vec::new();
        }

        let mut seen: FastSet<(DiagnosticKind, Identity, Related)> = FastSet::default();
        let mut output: Vec<Diagnostic> = Vec::new();
        for buffer in buffers {
            for mut diagnostic in buffer.into_vec() {
                if self.options.is_disabled(diagnostic.kind) {
                    continue;
                }
                let key = (diagnostic.kind, diagnostic.subject.clone(), diagnostic.related.clone());
                if !seen.insert(key) {
                    continue;
                }
                diagnostic.severity = self.options.severity_for(diagnostic.kind);
                output.push(diagnostic);
            }
        }

        output.sort_by(|a, b| self.compare(a, b));
        output
    }

    fn compare(&self, a: &Diagnostic, b: &Diagnostic) -> Ordering {
        let rank = |d: &Diagnostic| self.order.get(&d.subject).copied().unwrap_or(usize::MAX);
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.kind.code().cmp(b.kind.code()))
            .then_with(|| a.related.to_string().cmp(&b.related.to_string()))
            .then_with(|| a.message.cmp(&b.message))
    }
}
