//! The verification pipeline.
//!
//! collect → registry → graph → rules, then cycle detection and lifetime
//! validation side by side, then emission. Every call builds its own
//! [`VerificationContext`]; nothing is cached between snapshots.

use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::arena::TypeArena;
use crate::collector::{arena_from_declarations, collect};
use crate::config::VerifierOptions;
use crate::cycles::check_cycles;
use crate::declaration::{DeclarationFragment, ServiceDeclaration};
use crate::diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticEmitter, DiagnosticKind, Severity};
use crate::graph::DependencyGraph;
use crate::lifetimes::LifetimeValidator;
use crate::observer::{Observers, Stage, VerifyObserver};
use crate::registry::{FallbackResolver, ImplementationIndex, Registry};
use crate::rules::{check_declarations, check_resolution};

/// Verifies snapshots of service declarations.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::{DeclarationFragment, DiagnosticKind, Verifier};
///
/// let report = Verifier::default().verify(&[
///     DeclarationFragment::class("ReportCache").singleton().depends_on("IUserContext"),
///     DeclarationFragment::class("UserContext").scoped().implements("IUserContext"),
/// ]);
///
/// assert_eq!(report.diagnostics().len(), 1);
/// assert_eq!(report.diagnostics()[0].kind, DiagnosticKind::SingletonDependsOnScoped);
/// assert!(report.has_errors());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    options: VerifierOptions,
    observers: Observers,
    fallback: Option<Arc<dyn FallbackResolver>>,
}

impl Verifier {
    pub fn new(options: VerifierOptions) -> Self {
        Verifier {
            options,
            observers: Observers::default(),
            fallback: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn VerifyObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Replaces the built-in name/arity heuristic.
    ///
    /// Ignored when `heuristic_fallback` is disabled in the options.
    pub fn with_fallback_resolver(mut self, resolver: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = Some(resolver);
        self
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Collects `fragments` and verifies the resulting snapshot.
    pub fn verify(&self, fragments: &[DeclarationFragment]) -> VerificationReport {
        let context = VerificationContext::new(self);
        let (collected, collect_buffer) = context.stage(Stage::Collect, |buffer| {
            let mut collected = collect(fragments);
            buffer.extend(std::mem::take(&mut collected.diagnostics).into_vec());
            collected
        });
        context.run(collected.declarations, collected.arena, collect_buffer)
    }

    /// Verifies declarations that were already collected by the caller.
    ///
    /// Without fragments there are no plain types, so every unresolved
    /// dependency is reported as `no-implementation`.
    pub fn verify_declarations(&self, declarations: Vec<ServiceDeclaration>) -> VerificationReport {
        let context = VerificationContext::new(self);
        let (arena, collect_buffer) = context.stage(Stage::Collect, |_| arena_from_declarations(&declarations));
        context.run(declarations, arena, collect_buffer)
    }
}

/// Per-call state of one verification.
struct VerificationContext<'a> {
    options: &'a VerifierOptions,
    observers: &'a Observers,
    fallback: Option<&'a Arc<dyn FallbackResolver>>,
}

impl<'a> VerificationContext<'a> {
    fn new(verifier: &'a Verifier) -> Self {
        VerificationContext {
            options: &verifier.options,
            observers: &verifier.observers,
            fallback: verifier.fallback.as_ref(),
        }
    }

    /// Runs one stage into a fresh buffer, notifying observers around it.
    fn stage<T>(&self, stage: Stage, run: impl FnOnce(&mut DiagnosticBuffer) -> T) -> (T, DiagnosticBuffer) {
        self.observers.stage_started(stage);
        let started = Instant::now();
        let mut buffer = DiagnosticBuffer::new();
        let value = run(&mut buffer);
        let elapsed = started.elapsed();

        if self.observers.has_observers() {
            for fault in buffer.iter().filter(|d| d.kind == DiagnosticKind::InternalError) {
                self.observers.internal_fault(stage, &fault.subject, &fault.message);
            }
        }
        self.observers.stage_finished(stage, elapsed, buffer.len());
        tracing::trace!(%stage, ?elapsed, findings = buffer.len(), "stage done");
        (value, buffer)
    }

    fn run(
        &self,
        declarations: Vec<ServiceDeclaration>,
        arena: TypeArena,
        collect_buffer: DiagnosticBuffer,
    ) -> VerificationReport {
        let options = self.options;
        let (registry, _) = self.stage(Stage::Registry, |_| match self.fallback {
            Some(resolver) if options.heuristic_fallback => {
                Registry::with_fallback(&declarations, &arena, Arc::clone(resolver))
            }
            _ => Registry::build(&declarations, &arena, options.heuristic_fallback),
        });
        let (graph, graph_buffer) = self.stage(Stage::Graph, |buffer| {
            DependencyGraph::build(&declarations, &registry, options, buffer)
        });
        let ((), rules_buffer) = self.stage(Stage::Rules, |buffer| {
            check_resolution(&graph, &registry, buffer);
            check_declarations(&declarations, buffer);
        });

        let validator = LifetimeValidator::new(&declarations, &arena, &registry, &graph, options);
        let run_cycles = || self.stage(Stage::Cycles, |buffer| check_cycles(&graph, buffer)).1;
        let run_lifetimes = || self.stage(Stage::Lifetimes, |buffer| validator.validate(buffer)).1;

        let (cycles_buffer, lifetimes_buffer) = if options.parallel {
            thread::scope(|scope| {
                let cycles = scope.spawn(run_cycles);
                let lifetimes = run_lifetimes();
                (join_stage(cycles), lifetimes)
            })
        } else {
            (run_cycles(), run_lifetimes())
        };

        let (diagnostics, _) = self.stage(Stage::Emit, |_| {
            DiagnosticEmitter::new(options, declarations.iter().map(|d| &d.identity)).emit([
                collect_buffer,
                graph_buffer,
                rules_buffer,
                cycles_buffer,
                lifetimes_buffer,
            ])
        });

        tracing::debug!(
            declarations = declarations.len(),
            diagnostics = diagnostics.len(),
            parallel = options.parallel,
            "verification finished"
        );

        VerificationReport {
            declarations,
            arena,
            registry,
            graph,
            diagnostics,
        }
    }
}

/// Joins a stage thread. A panic on it propagates exactly as it would on the
/// sequential path; per-declaration faults are already caught inside the stage.
fn join_stage<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle.join().unwrap_or_else(|payload| {
        tracing::error!("stage thread panicked");
        panic::resume_unwind(payload)
    })
}

/// Everything one verification produced.
#[derive(Debug)]
pub struct VerificationReport {
    declarations: Vec<ServiceDeclaration>,
    arena: TypeArena,
    registry: Registry,
    graph: DependencyGraph,
    diagnostics: Vec<Diagnostic>,
}

impl VerificationReport {
    /// Finalized diagnostics, deduplicated and sorted.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn declarations(&self) -> &[ServiceDeclaration] {
        &self.declarations
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The contract → implementations index for code generation.
    pub fn index(&self) -> &ImplementationIndex {
        self.registry.index()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
