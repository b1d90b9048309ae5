//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Waiting on a timer is allowed in exactly one place, the fade
//! sequencer, where the wait *is* the behavior (settle delay, animation
//! duration). Drag sampling uses `tokio::time::interval`; everything else
//! waits on I/O or channels.
//!
//! Blocking `std::thread::sleep` is never allowed in production code.

use std::path::Path;

use architectural_enforcement::{scan_production, Violation};

fn is_fade_sequencer(path: &Path) -> bool {
    path.ends_with("floatball/core/src/fade.rs")
}

fn report(kind: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{kind} found in production code:");
    for violation in violations {
        eprintln!("  {violation}");
    }
    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

#[test]
fn test_timer_waits_only_in_fade_sequencer() {
    let violations = scan_production(
        |code| code.contains("::sleep(") || code.contains(".sleep("),
        is_fade_sequencer,
    );

    report("Timer sleeps outside fade.rs", &violations);
}

#[test]
fn test_no_blocking_sleep() {
    let violations = scan_production(
        |code| code.contains("thread::sleep"),
        |_| false,
    );

    report("Blocking thread sleeps", &violations);
}

#[test]
fn test_fade_sequencer_is_scanned() {
    // Guard against the exemption silently matching nothing
    let sleeps_in_fade = scan_production(
        |code| code.contains("tokio::time::sleep("),
        |path| !is_fade_sequencer(path),
    );

    assert!(
        !sleeps_in_fade.is_empty(),
        "expected fade.rs to contain its timed waits"
    );
}
