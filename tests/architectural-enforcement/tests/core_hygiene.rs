//! Integration Test: Core Hygiene
//!
//! **Policy**: the core library performs only async network I/O, reports
//! through `tracing` rather than stdout, and propagates errors instead of
//! panicking.

use architectural_enforcement::{assert_clean, core_src, find_violations};

#[test]
fn test_no_blocking_network_io() {
    let violations = find_violations(
        &core_src(),
        &["reqwest::blocking", "std::net::", "use std::net"],
        "Blocking network I/O",
    );
    assert_clean(&violations, "Use reqwest's async client and tokio::net");
}

#[test]
fn test_no_printing_from_library() {
    let violations = find_violations(
        &core_src(),
        &["println!", "eprintln!", "print!(", "dbg!("],
        "Direct output",
    );
    assert_clean(&violations, "Log with tracing::{debug, info, warn}");
}

#[test]
fn test_no_unwrap_outside_tests() {
    let violations = find_violations(&core_src(), &[".unwrap()", ".expect("], "Panicking call");
    assert_clean(&violations, "Propagate with `?` or map into a typed error");
}
