//! Architectural Enforcement Integration Tests
//!
//! This package contains source scanners that enforce the engine's rules:
//! - No sleeping in the streaming core (the only suspension is the next read)
//! - No blocking network or HTTP I/O in the core
//! - No printing from the library; it logs through `tracing`
//! - No `unwrap()`/`expect()` outside test code
//!
//! The helpers below are shared by the tests in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directory of the core library
#[must_use]
pub fn core_src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("chorus")
        .join("core")
        .join("src")
}

/// One offending line
#[derive(Debug)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// The line, trimmed
    pub line: String,
    /// What rule it breaks
    pub rule: &'static str,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line_number,
            self.rule,
            self.line
        )
    }
}

/// Production lines of every `.rs` file under `dir`
///
/// Everything from the first `#[cfg(test)]` on is test code and skipped, as
/// are comment lines and the part of a line after `//`.
#[must_use]
pub fn production_lines(dir: &Path) -> Vec<(PathBuf, usize, String)> {
    let mut out = Vec::new();
    if !dir.exists() {
        return out;
    }

    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("#[cfg(test)]") {
                break;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            let code_part = line.split("//").next().unwrap_or(line);
            out.push((entry.path().to_path_buf(), idx + 1, code_part.to_string()));
        }
    }
    out
}

/// Scan `dir` for lines containing any of `patterns`
#[must_use]
pub fn find_violations(dir: &Path, patterns: &[&str], rule: &'static str) -> Vec<Violation> {
    production_lines(dir)
        .into_iter()
        .filter(|(_, _, code)| patterns.iter().any(|p| code.contains(p)))
        .map(|(path, line_number, code)| Violation {
            path,
            line_number,
            line: code.trim().to_string(),
            rule,
        })
        .collect()
}

/// Panic with every violation listed
pub fn assert_clean(violations: &[Violation], advice: &str) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!("\n✅ {advice}");
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}
