#![no_main]

use ferrous_di_verify::{DeclarationFragment, DiagnosticKind, Lifetime, Verifier, VerifierOptions};
use libfuzzer_sys::fuzz_target;

const CONTRACTS: &[&str] = &[
    "IA",
    "IB",
    "IRepo<User>",
    "IRepo<T>",
    "Lazy<IA>",
    "IEnumerable<IB>",
    "Func<IRepo<Order>>",
    "ILogger<A>",
];

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // Three bytes per type: lifetime/markers, implemented contract, dependency.
    let mut fragments = Vec::new();
    for (i, chunk) in data.chunks(3).take(32).enumerate() {
        let name = format!("S{}", i % 8);
        let mut fragment = DeclarationFragment::class(name);
        if chunk[0] & 0b11 != 0 && chunk[0] & 0b100 != 0 {
            fragment = fragment.type_params(["T"]);
        }
        fragment = match chunk[0] & 0b11 {
            0 => fragment,
            1 => fragment.lifetime(Lifetime::Singleton),
            2 => fragment.lifetime(Lifetime::Scoped),
            _ => fragment.lifetime(Lifetime::Transient),
        };
        if chunk[0] & 0b1000 != 0 {
            fragment = fragment.external();
        }
        if chunk[0] & 0b1_0000 != 0 {
            fragment = fragment.extends(format!("S{}", chunk[0] >> 5));
        }
        if let Some(&byte) = chunk.get(1) {
            fragment = fragment.implements(CONTRACTS[byte as usize % CONTRACTS.len()]);
        }
        if let Some(&byte) = chunk.get(2) {
            fragment = fragment.depends_on(CONTRACTS[byte as usize % CONTRACTS.len()]);
        }
        fragments.push(fragment);
    }

    let parallel = Verifier::default().verify(&fragments).into_diagnostics();
    let sequential = Verifier::new(VerifierOptions::builder().parallel(false).build())
        .verify(&fragments)
        .into_diagnostics();
    assert_eq!(parallel, sequential);
    assert!(parallel.iter().all(|d| d.kind != DiagnosticKind::InternalError));
});
