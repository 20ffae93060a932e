//! Behavioural guarantees of the full pipeline.

use ferrous_di_verify::{
    ContractSignature, DeclarationFragment, DiagnosticKind, Identity, Related, Verifier, Wrapping,
};

fn id(name: &str) -> Identity {
    Identity::new(name, 0)
}

fn kinds(report: &ferrous_di_verify::VerificationReport) -> Vec<DiagnosticKind> {
    report.diagnostics().iter().map(|d| d.kind).collect()
}

// ===== Lifetime violations =====

#[test]
fn scoped_capture_is_reported_once_across_every_path() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("Base").depends_on("IB"),
        DeclarationFragment::class("A")
            .singleton()
            .extends("Base")
            .depends_on("IB")
            .inject_wrapped("lazy", "Lazy<IB>", Wrapping::Deferred)
            .inject_wrapped("factory", "IB", Wrapping::Deferred),
        DeclarationFragment::class("B").scoped().implements("IB"),
    ]);

    let captures: Vec<_> = report.of_kind(DiagnosticKind::SingletonDependsOnScoped).collect();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].subject, id("A"));
    assert_eq!(captures[0].related, Related::Identity(id("B")));
}

#[test]
fn inherited_capture_alone_is_reported_on_the_derived_type() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("Base").implements("IWorker"),
        DeclarationFragment::class("Base").inject_field("context", "IUserContext"),
        DeclarationFragment::class("Worker").singleton().extends("Base"),
        DeclarationFragment::class("UserContext").scoped().implements("IUserContext"),
    ]);

    let captures: Vec<_> = report.of_kind(DiagnosticKind::SingletonDependsOnScoped).collect();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].subject, id("Worker"));
    assert_eq!(captures[0].related, Related::Identity(id("UserContext")));
    assert_eq!(report.of_kind(DiagnosticKind::InheritanceChainLifetimeViolation).count(), 1);
}

// ===== Cycles =====

#[test]
fn one_cycle_is_one_diagnostic_whatever_the_declaration_order() {
    let a = DeclarationFragment::class("A").scoped().depends_on("B");
    let b = DeclarationFragment::class("B").scoped().depends_on("C");
    let c = DeclarationFragment::class("C").scoped().depends_on("A");

    let first = Verifier::default().verify(&[a.clone(), b.clone(), c.clone()]);
    let second = Verifier::default().verify(&[c, a, b]);

    for report in [&first, &second] {
        let cycles: Vec<_> = report.of_kind(DiagnosticKind::CircularDependency).collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].related, Related::Cycle(vec![id("A"), id("B"), id("C")]));
    }
}

#[test]
fn external_declaration_breaks_the_cycle() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("A").scoped().depends_on("B"),
        DeclarationFragment::class("B").scoped().external().depends_on("A"),
    ]);
    assert_eq!(report.of_kind(DiagnosticKind::CircularDependency).count(), 0);
    assert!(report.diagnostics().is_empty(), "{:?}", report.diagnostics());
}

#[test]
fn deferred_edges_still_close_cycles() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("A").scoped().depends_on("Func<B>"),
        DeclarationFragment::class("B").scoped().depends_on("A"),
    ]);
    assert_eq!(report.of_kind(DiagnosticKind::CircularDependency).count(), 1);
}

#[test]
fn long_dependency_chain_verifies_on_the_parallel_path() {
    let length = 50_000;
    let fragments: Vec<_> = (0..length)
        .map(|i| {
            let fragment = DeclarationFragment::class(format!("S{}", i)).scoped();
            if i + 1 < length {
                fragment.depends_on(format!("S{}", i + 1))
            } else {
                fragment
            }
        })
        .collect();

    let report = Verifier::default().verify(&fragments);
    assert!(report.diagnostics().is_empty(), "{:?}", report.diagnostics().first());
    assert_eq!(report.graph().edge_count(), length - 1);
}

// ===== Generic resolution =====

#[test]
fn open_registration_satisfies_constructed_dependency() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("Repo").type_params(["T"]).scoped().implements("IRepo<T>"),
        DeclarationFragment::class("UserService").scoped().depends_on("IRepo<User>"),
    ]);
    assert!(report.diagnostics().is_empty(), "{:?}", report.diagnostics());
    assert_eq!(report.graph().edges_from(&id("UserService"))[0].to, Identity::new("Repo", 1));
}

#[test]
fn closed_registration_does_not_satisfy_open_dependency() {
    let report = Verifier::default().verify(&[
        DeclarationFragment::class("UserRepo").scoped().implements("IRepo<User>"),
        DeclarationFragment::class("Service")
            .type_params(["T"])
            .scoped()
            .depends_on("IRepo<T>"),
    ]);
    let missing: Vec<_> = report.of_kind(DiagnosticKind::NoImplementation).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(
        missing[0].related,
        Related::Contract(ContractSignature::parse("IRepo<T>", &["T".to_string()]).unwrap())
    );
}

// ===== Determinism =====

#[test]
fn repeated_runs_are_identical() {
    let fragments = vec![
        DeclarationFragment::class("A").singleton().depends_on_all(["IB", "IC", "IMissing"]),
        DeclarationFragment::class("B").scoped().implements("IB").depends_on("A"),
        DeclarationFragment::class("C").transient().implements("IC"),
        DeclarationFragment::class("Worker").background(),
    ];
    let verifier = Verifier::default();
    let first = verifier.verify(&fragments).into_diagnostics();
    let second = verifier.verify(&fragments).into_diagnostics();
    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
}

// ===== End to end =====

#[test]
fn missing_then_unregistered_then_captive() {
    let verifier = Verifier::default();
    let x = DeclarationFragment::class("X").singleton().depends_on("IY");

    let report = verifier.verify(&[x.clone()]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::NoImplementation]);
    assert_eq!(report.diagnostics()[0].subject, id("X"));
    assert_eq!(report.diagnostics()[0].related.to_string(), "IY");

    let report = verifier.verify(&[x.clone(), DeclarationFragment::class("Y").implements("IY")]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::ImplementationUnregistered]);
    assert!(report.diagnostics()[0].message.contains("'Y'"));

    let report = verifier.verify(&[x, DeclarationFragment::class("Y").scoped().implements("IY")]);
    assert_eq!(kinds(&report), vec![DiagnosticKind::SingletonDependsOnScoped]);
    assert_eq!(report.diagnostics()[0].subject, id("X"));
    assert_eq!(report.diagnostics()[0].related, Related::Identity(id("Y")));
}
