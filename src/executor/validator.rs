//! Textual denylist applied to script text before anything is spawned.
//!
//! This is a soft guard against accidental misuse, not isolation: any obfuscation
//! of the listed substrings gets past it.

const BLOCKED_PATTERNS: &[&str] = &[
    "os.system(",
    "os.popen(",
    "subprocess.",
    "__import__(",
    "shutil.rmtree",
    "os.remove(",
    "os.unlink(",
    "import socket",
    "import http",
    "import urllib",
    "eval(",
    "exec(",
    "compile(",
    "os.exec",
    "os.spawn",
    "importlib",
    "import requests",
    "import httpx",
];

/// Patterns scanned for, in scan order.
pub fn blocked_patterns() -> &'static [&'static str] {
    BLOCKED_PATTERNS
}

/// Returns a violation message for the first denylisted pattern found, matching case-insensitively.
pub fn validate(code: &str) -> Option<String> {
    let lower = code.to_lowercase();
    BLOCKED_PATTERNS
        .iter()
        .find(|pattern| lower.contains(*pattern))
        .map(|pattern| {
            format!(
                "Blocked: script contains \"{}\" which is not allowed for safety",
                pattern
            )
        })
}
