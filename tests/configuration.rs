use ferrous_di_verify::{
    DeclarationFragment, DiagnosticKind, PropertiesConfigSource, Severity, Verifier, VerifierOptions,
};
use serial_test::serial;

fn captive_snapshot() -> Vec<DeclarationFragment> {
    vec![
        DeclarationFragment::class("A").singleton().depends_on_all(["IB", "IC", "IMissing"]),
        DeclarationFragment::class("B").scoped().implements("IB"),
        DeclarationFragment::class("C").transient().implements("IC"),
    ]
}

#[test]
fn severities_follow_options() {
    let options = VerifierOptions::builder()
        .no_implementation_severity(Severity::Error)
        .lifetime_validation_severity(Severity::Info)
        .build();
    let report = Verifier::new(options).verify(&captive_snapshot());

    let severity_of = |kind| {
        report
            .of_kind(kind)
            .map(|d| d.severity)
            .next()
            .unwrap_or_else(|| panic!("no {:?} diagnostic", kind))
    };
    assert_eq!(severity_of(DiagnosticKind::NoImplementation), Severity::Error);
    assert_eq!(severity_of(DiagnosticKind::SingletonDependsOnScoped), Severity::Info);
    assert_eq!(severity_of(DiagnosticKind::SingletonDependsOnTransient), Severity::Info);
}

#[test]
fn malformed_severity_strings_become_warnings() {
    let options = VerifierOptions::from_properties([("LifetimeValidationSeverity", "catastrophic")]);
    let report = Verifier::new(options).verify(&captive_snapshot());
    let scoped = report
        .of_kind(DiagnosticKind::SingletonDependsOnScoped)
        .next()
        .expect("scoped capture reported");
    assert_eq!(scoped.severity, Severity::Warning);
    // No diagnostic about the misconfiguration itself.
    assert_eq!(report.diagnostics().len(), 3);
}

#[test]
fn disabled_kinds_never_appear() {
    let options = VerifierOptions::builder()
        .disable(DiagnosticKind::NoImplementation)
        .disable(DiagnosticKind::SingletonDependsOnTransient)
        .build();
    let report = Verifier::new(options).verify(&captive_snapshot());
    let kinds: Vec<_> = report.diagnostics().iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::SingletonDependsOnScoped]);
}

#[test]
fn disabling_lifetime_validation_keeps_other_rules() {
    let options = VerifierOptions::from_properties([("DisableLifetimeValidation", "true")]);
    let report = Verifier::new(options).verify(&captive_snapshot());
    let kinds: Vec<_> = report.diagnostics().iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::NoImplementation]);
}

#[test]
fn disabling_diagnostics_silences_everything() {
    let source = PropertiesConfigSource::new().with("DiagnosticsEnabled", "false");
    let report = Verifier::new(VerifierOptions::from_source(&source)).verify(&captive_snapshot());
    assert!(report.diagnostics().is_empty());
    // The index is still built for code generation.
    assert!(!report.index().is_empty());
}

#[test]
fn custom_framework_types_and_wrappers() {
    let options = VerifierOptions::builder()
        .framework_type("IClock")
        .deferred_wrapper("Provider")
        .build();
    let report = Verifier::new(options).verify(&[
        DeclarationFragment::class("A").singleton().depends_on_all(["IClock", "Provider<IB>"]),
        DeclarationFragment::class("B").scoped().implements("IB"),
    ]);
    let kinds: Vec<_> = report.diagnostics().iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::SingletonDependsOnScoped]);
}

#[test]
#[serial]
fn options_from_environment() {
    std::env::set_var("FDV_TEST_NO_IMPLEMENTATION_SEVERITY", "error");
    std::env::set_var("FDV_TEST_PARALLEL", "false");
    std::env::set_var("FDV_TEST_DISABLED_KINDS", "FDV009");

    let options = VerifierOptions::from_env("fdv_test");

    std::env::remove_var("FDV_TEST_NO_IMPLEMENTATION_SEVERITY");
    std::env::remove_var("FDV_TEST_PARALLEL");
    std::env::remove_var("FDV_TEST_DISABLED_KINDS");

    assert_eq!(options.no_implementation_severity, Severity::Error);
    assert!(!options.parallel);
    assert!(options.is_disabled(DiagnosticKind::SingletonDependsOnTransient));
}

#[test]
#[serial]
fn environment_without_prefixed_keys_yields_defaults() {
    std::env::remove_var("FDV_EMPTY_PARALLEL");
    assert_eq!(VerifierOptions::from_env("fdv_empty"), VerifierOptions::default());
}

#[cfg(feature = "config")]
mod json {
    use super::*;

    #[test]
    fn options_from_json() {
        let options = VerifierOptions::from_json(
            r#"{
                "LifetimeValidationSeverity": "warning",
                "HeuristicFallback": false,
                "SeverityOverrides": { "CircularDependency": "info" },
                "DisabledKinds": ["UnnecessaryExclusion"]
            }"#,
        )
        .unwrap();
        assert_eq!(options.lifetime_validation_severity, Severity::Warning);
        assert!(!options.heuristic_fallback);
        assert_eq!(options.severity_for(DiagnosticKind::CircularDependency), Severity::Info);
        assert!(options.is_disabled(DiagnosticKind::UnnecessaryExclusion));
        // Unset fields keep their defaults.
        assert!(options.diagnostics_enabled);
    }

    #[test]
    fn json_accepts_codes_and_names_like_properties() {
        let options = VerifierOptions::from_json(
            r#"{
                "DisabledKinds": ["FDV003", "unnecessary-exclusion-marker"],
                "SeverityOverrides": { "circular-dependency": "info", "FDV008": "warning" }
            }"#,
        )
        .unwrap();
        assert!(options.is_disabled(DiagnosticKind::DuplicateDependency));
        assert!(options.is_disabled(DiagnosticKind::UnnecessaryExclusion));
        assert_eq!(options.severity_for(DiagnosticKind::CircularDependency), Severity::Info);
        assert_eq!(options.severity_for(DiagnosticKind::SingletonDependsOnScoped), Severity::Warning);

        let from_properties = VerifierOptions::from_properties([("DisabledKinds", "FDV003, unnecessary-exclusion-marker")]);
        assert_eq!(options.disabled_kinds, from_properties.disabled_kinds);
    }

    #[test]
    fn unknown_kind_in_json_is_a_config_error() {
        let error = VerifierOptions::from_json(r#"{ "DisabledKinds": ["FDV777"] }"#).unwrap_err();
        assert!(matches!(error, ferrous_di_verify::VerifyError::Config(_)));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let error = VerifierOptions::from_json("{ not json").unwrap_err();
        assert!(matches!(error, ferrous_di_verify::VerifyError::Config(_)));
    }
}
