//! Integration Test: Sleep Prohibition
//!
//! **Policy**: the streaming core never sleeps. Frames are applied as soon as
//! the read that carried them completes; waiting is done on I/O or on the
//! cancellation token only.

use architectural_enforcement::{assert_clean, core_src, find_violations};

#[test]
fn test_no_sleep_in_core() {
    let violations = find_violations(
        &core_src(),
        &["thread::sleep", "time::sleep", "sleep_until"],
        "Sleep call",
    );
    assert_clean(
        &violations,
        "Wait on the body read or on CancellationToken::cancelled() instead",
    );
}

#[test]
fn test_scanner_sees_core_sources() {
    let lines = architectural_enforcement::production_lines(&core_src());
    assert!(
        lines.iter().any(|(path, _, _)| path.ends_with("conductor.rs")),
        "core sources not found under {}",
        core_src().display()
    );
}
