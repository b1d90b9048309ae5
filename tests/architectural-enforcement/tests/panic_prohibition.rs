//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors or handles them. Stale
//! surfaces, refused focus, and unlisted channels are normal events, not
//! reasons to crash the overlay.

use architectural_enforcement::scan_production;

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = scan_production(
        |code| code.contains(".unwrap()") || code.contains(".expect("),
        |_| false,
    );

    if !violations.is_empty() {
        eprintln!("\nPanicking unwraps found in production code:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        panic!("\nFound {} violation(s).", violations.len());
    }
}

#[test]
fn test_no_panic_macros_in_production_code() {
    let violations = scan_production(
        |code| code.contains("panic!(") || code.contains("todo!(") || code.contains("unimplemented!("),
        |_| false,
    );

    assert!(
        violations.is_empty(),
        "panic macros in production code: {violations:#?}"
    );
}
