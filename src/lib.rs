//! # ferrous-di-verify
//!
//! Build-time verification for declarative dependency injection.
//!
//! Services declare their lifetime, the contracts they implement and the
//! contracts they depend on. The verifier turns a snapshot of those
//! declarations into diagnostics before anything runs: missing or
//! unregistered implementations, circular dependencies and lifetime
//! violations such as a singleton capturing a scoped service.
//!
//! ## Features
//!
//! - **Generic-aware resolution**: exact, then generic-normalized, then an
//!   optional name/arity heuristic
//! - **Cycle detection**: one report per distinct cycle, independent of
//!   declaration order
//! - **Lifetime validation**: direct dependencies, inherited dependencies,
//!   base-type lifetimes and background services
//! - **Declaration rules**: duplicate or conflicting dependency markers,
//!   needless exclusions, malformed conditional registrations
//! - **Deterministic output**: diagnostics are deduplicated and sorted, so
//!   repeated runs over the same snapshot are identical
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_di_verify::{DeclarationFragment, DiagnosticKind, Severity, Verifier};
//!
//! let report = Verifier::default().verify(&[
//!     DeclarationFragment::class("OrderService")
//!         .singleton()
//!         .implements("IOrderService")
//!         .depends_on_all(["IOrderRepository", "ILogger<OrderService>"]),
//!     DeclarationFragment::class("OrderRepository")
//!         .scoped()
//!         .implements("IOrderRepository"),
//! ]);
//!
//! let diagnostic = &report.diagnostics()[0];
//! assert_eq!(diagnostic.kind, DiagnosticKind::SingletonDependsOnScoped);
//! assert_eq!(diagnostic.severity, Severity::Error);
//! assert_eq!(diagnostic.code(), "FDV008");
//! ```
//!
//! ## Lifetimes
//!
//! - **Singleton**: one instance for the whole application
//! - **Scoped**: one instance per scope
//! - **Transient**: a new instance per resolution
//!
//! A singleton may not depend on a scoped service (error) and should not
//! depend on a transient one (warning).
//!
//! ## Configuration
//!
//! ```rust
//! use ferrous_di_verify::{DiagnosticKind, Severity, Verifier, VerifierOptions};
//!
//! let options = VerifierOptions::builder()
//!     .no_implementation_severity(Severity::Error)
//!     .disable(DiagnosticKind::UnnecessaryExclusion)
//!     .framework_type("IClock")
//!     .build();
//! let verifier = Verifier::new(options);
//! assert!(verifier.options().is_disabled(DiagnosticKind::UnnecessaryExclusion));
//! ```
//!
//! ## Crate features
//!
//! - `config`: load [`VerifierOptions`] from JSON
//! - `graph-export`: JSON and YAML graph export
//! - `ahash` / `performance`: faster hashing for the internal maps

pub mod arena;
pub mod collector;
pub mod config;
pub mod cycles;
pub mod declaration;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod graph;
pub mod lifetime;
pub mod lifetimes;
pub mod observer;
pub mod registry;
pub mod rules;
pub mod signature;
pub mod verifier;

mod internal;

pub use arena::{Ancestor, TypeArena, TypeRecord};
pub use collector::{arena_from_declarations, collect, Collected};
pub use config::{ConfigSource, EnvironmentConfigSource, PropertiesConfigSource, VerifierOptions, VerifierOptionsBuilder};
pub use cycles::find_cycles;
pub use declaration::{
    Condition, DeclarationFragment, DeclarationStyle, DependencyEdge, DependencySpec, Identity, Location,
    ServiceDeclaration, TypeKind, Wrapping,
};
pub use diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticEmitter, DiagnosticKind, Related, Severity};
pub use error::{VerifyError, VerifyResult};
pub use export::{
    DefaultGraphExporter, ExportEdge, ExportFormat, ExportMetadata, ExportNode, ExportOptions, GraphExport,
    GraphExporter,
};
pub use graph::{unwrap_target, DependencyGraph, ResolvedEdge, UnresolvedEdge};
pub use lifetime::{check_lifetimes, Lifetime, LifetimeCompatibility};
pub use lifetimes::LifetimeValidator;
pub use observer::{LoggingObserver, Stage, VerifyObserver};
pub use registry::{ArityFallback, FallbackResolver, ImplementationIndex, NoFallback, Registry, Resolution, ResolutionStage};
pub use signature::{ContractSignature, TypeExpr};
pub use verifier::{VerificationReport, Verifier};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_snapshot_has_no_diagnostics() {
        let report = Verifier::default().verify(&[
            DeclarationFragment::class("Clock").singleton().implements("IClock"),
            DeclarationFragment::class("Cache").singleton().depends_on("IClock"),
            DeclarationFragment::class("Handler").scoped().depends_on_all(["ICache", "Cache", "ILogger<Handler>"]),
            DeclarationFragment::class("Cache").implements("ICache"),
        ]);
        assert!(report.diagnostics().is_empty(), "{:?}", report.diagnostics());
        assert!(!report.has_errors());
        assert_eq!(report.graph().edge_count(), 3);
    }

    #[test]
    fn report_exposes_index_for_code_generation() {
        let report = Verifier::default().verify(&[DeclarationFragment::class("Repository")
            .type_params(["T"])
            .scoped()
            .implements("IRepository<T>")]);
        let contracts: Vec<String> = report.index().iter().map(|(c, _)| c.to_string()).collect();
        assert!(contracts.contains(&"IRepository<T>".to_string()));
        assert!(contracts.contains(&"Repository<T>".to_string()));
    }
}
