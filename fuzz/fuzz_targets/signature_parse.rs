#![no_main]

use ferrous_di_verify::TypeExpr;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let params = vec!["T".to_string(), "U".to_string()];

    if let Ok(expr) = TypeExpr::parse(input, &params) {
        // A parsed signature renders to something that parses back to itself.
        let rendered = expr.to_string();
        let reparsed = TypeExpr::parse(&rendered, &params).expect("rendered signature must parse");
        assert_eq!(reparsed, expr);

        let flat = expr.flat_normalized();
        assert_eq!(flat.arity(), expr.arity());
        assert_eq!(flat.base_name(), expr.base_name());
    }
});
