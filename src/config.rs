//! Verifier options and the sources they can be loaded from.
//!
//! Options come from code (the builder), from a flat key/value property
//! source such as build properties, from environment variables, or, with
//! the `config` feature, from a JSON document. Malformed values never fail:
//! a severity that cannot be parsed becomes `Warning`, anything else that
//! cannot be parsed keeps its default.

use std::collections::{BTreeMap, BTreeSet};
use std::env;

#[cfg(feature = "config")]
use serde::Deserialize;

use crate::diagnostics::{DiagnosticKind, Severity};
#[cfg(feature = "config")]
use crate::error::{VerifyError, VerifyResult};
use crate::signature::{TypeExpr, ARRAY};

/// Types supplied by the host framework or runtime; dependencies on them never become edges.
pub const DEFAULT_FRAMEWORK_TYPES: &[&str] = &[
    "ILogger",
    "ILoggerFactory",
    "IConfiguration",
    "IServiceProvider",
    "IServiceScopeFactory",
    "IHostEnvironment",
    "IWebHostEnvironment",
    "IHostApplicationLifetime",
    "IOptions",
    "IOptionsSnapshot",
    "IOptionsMonitor",
    "IHttpClientFactory",
    "HttpClient",
    "CancellationToken",
    "TimeProvider",
    "object",
    "string",
    "bool",
    "int",
    "long",
    "double",
    "decimal",
    "Guid",
    "TimeSpan",
    "DateTime",
];

/// Wrappers that mean "every implementation of the element type".
pub const DEFAULT_COLLECTION_WRAPPERS: &[&str] = &[
    "IEnumerable",
    "IReadOnlyList",
    "IReadOnlyCollection",
    "IList",
    "ICollection",
    "List",
    ARRAY,
];

/// Wrappers that resolve their inner type lazily.
pub const DEFAULT_DEFERRED_WRAPPERS: &[&str] = &["Lazy", "Func"];

/// Options for one verification pass.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{DiagnosticKind, Severity, VerifierOptions};
///
/// let options = VerifierOptions::from_properties([
///     ("DiagnosticsEnabled", "true"),
///     ("NoImplementationSeverity", "error"),
///     ("LifetimeValidationSeverity", "very-bad"),
/// ]);
///
/// assert_eq!(options.severity_for(DiagnosticKind::NoImplementation), Severity::Error);
/// // Unparsable severities fall back to Warning.
/// assert_eq!(options.severity_for(DiagnosticKind::SingletonDependsOnScoped), Severity::Warning);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(default, rename_all = "PascalCase"))]
pub struct VerifierOptions {
    /// When false, the verifier emits nothing at all.
    pub diagnostics_enabled: bool,
    /// When false, lifetime validation is skipped.
    pub lifetime_validation_enabled: bool,
    pub no_implementation_severity: Severity,
    pub unregistered_implementation_severity: Severity,
    /// Severity of scoped captures, inheritance-chain and background-service violations.
    pub lifetime_validation_severity: Severity,
    /// Per-kind severities, applied over everything else.
    pub severity_overrides: BTreeMap<DiagnosticKind, Severity>,
    pub disabled_kinds: BTreeSet<DiagnosticKind>,
    pub framework_types: BTreeSet<String>,
    pub collection_wrappers: BTreeSet<String>,
    pub deferred_wrappers: BTreeSet<String>,
    /// Enables the last-resort name/arity resolution heuristic.
    pub heuristic_fallback: bool,
    /// Runs cycle detection and lifetime validation on separate threads.
    pub parallel: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            diagnostics_enabled: true,
            lifetime_validation_enabled: true,
            no_implementation_severity: Severity::Warning,
            unregistered_implementation_severity: Severity::Warning,
            lifetime_validation_severity: Severity::Error,
            severity_overrides: BTreeMap::new(),
            disabled_kinds: BTreeSet::new(),
            framework_types: DEFAULT_FRAMEWORK_TYPES.iter().map(|s| s.to_string()).collect(),
            collection_wrappers: DEFAULT_COLLECTION_WRAPPERS.iter().map(|s| s.to_string()).collect(),
            deferred_wrappers: DEFAULT_DEFERRED_WRAPPERS.iter().map(|s| s.to_string()).collect(),
            heuristic_fallback: true,
            parallel: true,
        }
    }
}

impl VerifierOptions {
    pub fn builder() -> VerifierOptionsBuilder {
        VerifierOptionsBuilder::default()
    }

    /// Effective severity of `kind`.
    pub fn severity_for(&self, kind: DiagnosticKind) -> Severity {
        if let Some(&severity) = self.severity_overrides.get(&kind) {
            return severity;
        }
        match kind {
            DiagnosticKind::NoImplementation => self.no_implementation_severity,
            DiagnosticKind::ImplementationUnregistered => self.unregistered_implementation_severity,
            DiagnosticKind::SingletonDependsOnScoped
            | DiagnosticKind::BackgroundServiceWrongLifetime
            | DiagnosticKind::InheritanceChainLifetimeViolation => self.lifetime_validation_severity,
            DiagnosticKind::SingletonDependsOnTransient => {
                kind.default_severity().min(self.lifetime_validation_severity)
            }
            other => other.default_severity(),
        }
    }

    pub fn is_disabled(&self, kind: DiagnosticKind) -> bool {
        self.disabled_kinds.contains(&kind)
    }

    /// True if `target` names a framework-provided type.
    ///
    /// Matches on the base name, qualified or not.
    pub fn is_framework_type(&self, target: &TypeExpr) -> bool {
        let name = target.base_name();
        self.framework_types.contains(name) || self.framework_types.contains(simple_name(name))
    }

    pub fn is_collection_wrapper(&self, target: &TypeExpr) -> bool {
        target.arity() == 1 && {
            let name = target.base_name();
            self.collection_wrappers.contains(name) || self.collection_wrappers.contains(simple_name(name))
        }
    }

    pub fn is_deferred_wrapper(&self, target: &TypeExpr) -> bool {
        target.arity() == 1 && {
            let name = target.base_name();
            self.deferred_wrappers.contains(name) || self.deferred_wrappers.contains(simple_name(name))
        }
    }

    /// Loads options from key/value properties over the defaults.
    ///
    /// Keys are matched case-insensitively with `_`, `-` and `.` ignored, so
    /// `LifetimeValidationSeverity` and `lifetime_validation_severity` are
    /// the same key.
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in properties {
            options.apply_property(key.as_ref(), value.as_ref());
        }
        options
    }

    /// Loads options from a [`ConfigSource`] over the defaults.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let mut options = Self::default();
        for key in source.keys() {
            if let Some(value) = source.get(&key) {
                options.apply_property(&key, &value);
            }
        }
        options
    }

    /// Loads options from environment variables named `{PREFIX}_{KEY}`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_source(&EnvironmentConfigSource::with_prefix(prefix))
    }

    /// Loads options from a JSON object with PascalCase keys.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> VerifyResult<Self> {
        serde_json::from_str(json).map_err(|e| VerifyError::Config(e.to_string()))
    }

    /// Applies one property; unknown keys are ignored.
    pub fn apply_property(&mut self, key: &str, value: &str) {
        let key = normalize_key(key);
        match key.as_str() {
            "diagnosticsenabled" => set_bool(&mut self.diagnostics_enabled, value),
            "disablediagnostics" => {
                if let Some(disabled) = parse_bool(value) {
                    self.diagnostics_enabled = !disabled;
                }
            }
            "lifetimevalidationenabled" => set_bool(&mut self.lifetime_validation_enabled, value),
            "disablelifetimevalidation" => {
                if let Some(disabled) = parse_bool(value) {
                    self.lifetime_validation_enabled = !disabled;
                }
            }
            "noimplementationseverity" => self.no_implementation_severity = Severity::parse_or_default(value),
            "unregisteredimplementationseverity" => {
                self.unregistered_implementation_severity = Severity::parse_or_default(value)
            }
            "lifetimevalidationseverity" => self.lifetime_validation_severity = Severity::parse_or_default(value),
            "disabledkinds" | "disableddiagnostics" => {
                self.disabled_kinds
                    .extend(split_list(value).filter_map(|item| item.parse::<DiagnosticKind>().ok()));
            }
            "frameworktypes" => self.framework_types.extend(split_list(value).map(str::to_string)),
            "collectionwrappers" => self.collection_wrappers.extend(split_list(value).map(str::to_string)),
            "deferredwrappers" => self.deferred_wrappers.extend(split_list(value).map(str::to_string)),
            "heuristicfallback" => set_bool(&mut self.heuristic_fallback, value),
            "parallel" => set_bool(&mut self.parallel, value),
            other => {
                if let Some(kind) = other
                    .strip_prefix("severity")
                    .and_then(|code| code.parse::<DiagnosticKind>().ok())
                {
                    self.severity_overrides.insert(kind, Severity::parse_or_default(value));
                } else {
                    tracing::trace!(key = other, "ignoring unknown verifier option");
                }
            }
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn set_bool(target: &mut bool, value: &str) {
    if let Some(parsed) = parse_bool(value) {
        *target = parsed;
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn simple_name(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

/// Fluent builder for [`VerifierOptions`].
#[derive(Debug, Clone, Default)]
pub struct VerifierOptionsBuilder {
    options: VerifierOptions,
}

impl VerifierOptionsBuilder {
    pub fn diagnostics_enabled(mut self, enabled: bool) -> Self {
        self.options.diagnostics_enabled = enabled;
        self
    }

    pub fn lifetime_validation_enabled(mut self, enabled: bool) -> Self {
        self.options.lifetime_validation_enabled = enabled;
        self
    }

    pub fn no_implementation_severity(mut self, severity: Severity) -> Self {
        self.options.no_implementation_severity = severity;
        self
    }

    pub fn unregistered_implementation_severity(mut self, severity: Severity) -> Self {
        self.options.unregistered_implementation_severity = severity;
        self
    }

    pub fn lifetime_validation_severity(mut self, severity: Severity) -> Self {
        self.options.lifetime_validation_severity = severity;
        self
    }

    pub fn severity(mut self, kind: DiagnosticKind, severity: Severity) -> Self {
        self.options.severity_overrides.insert(kind, severity);
        self
    }

    pub fn disable(mut self, kind: DiagnosticKind) -> Self {
        self.options.disabled_kinds.insert(kind);
        self
    }

    pub fn framework_type(mut self, name: impl Into<String>) -> Self {
        self.options.framework_types.insert(name.into());
        self
    }

    pub fn collection_wrapper(mut self, name: impl Into<String>) -> Self {
        self.options.collection_wrappers.insert(name.into());
        self
    }

    pub fn deferred_wrapper(mut self, name: impl Into<String>) -> Self {
        self.options.deferred_wrappers.insert(name.into());
        self
    }

    pub fn heuristic_fallback(mut self, enabled: bool) -> Self {
        self.options.heuristic_fallback = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.options.parallel = enabled;
        self
    }

    pub fn build(self) -> VerifierOptions {
        self.options
    }
}

/// A flat source of option values.
pub trait ConfigSource: std::fmt::Debug {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// List all available keys
    fn keys(&self) -> Vec<String>;
}

/// In-memory property source, e.g. build properties handed over by a host.
#[derive(Debug, Clone, Default)]
pub struct PropertiesConfigSource {
    values: BTreeMap<String, String>,
}

impl PropertiesConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for PropertiesConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// Environment variable source
#[derive(Debug, Default)]
pub struct EnvironmentConfigSource {
    /// Prefix to filter environment variables
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }

    fn env_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(self.env_key(key)).ok()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = env::vars()
            .filter_map(|(key, _)| match &self.prefix {
                Some(prefix) => {
                    let prefix_upper = format!("{}_", prefix.to_uppercase());
                    key.strip_prefix(&prefix_upper).map(str::to_lowercase)
                }
                None => Some(key.to_lowercase()),
            })
            .collect();
        keys.sort();
        keys
    }
}
