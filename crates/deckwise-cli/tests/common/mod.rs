//! Common utilities for CLI E2E tests.
//!
//! Every [`Sandbox`] points the binary at its own temp data directory, so
//! tests never touch the real collection or each other.

#![allow(dead_code)]

use std::process::Command;

use tempfile::TempDir;

pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Invoke a CLI command and return `(stdout, stderr, code)`.
    pub fn run(&self, args: &[&str]) -> (String, String, i32) {
        let output = Command::new(env!("CARGO_BIN_EXE_deckwise"))
            .args(args)
            .env("DECKWISE_DATA_DIR", self.dir.path())
            .env_remove("DECKWISE_LOG")
            .output()
            .expect("Failed to execute CLI command");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        (stdout, stderr, code)
    }

    /// Invoke a CLI command and expect success.
    pub fn success(&self, args: &[&str]) -> String {
        let (stdout, stderr, code) = self.run(args);
        if code != 0 && !stderr.is_empty() {
            eprintln!("CLI error output: {}", stderr);
        }
        assert_eq!(code, 0, "CLI command failed with code {}: {:?}", code, args);
        stdout
    }

    /// Invoke a CLI command and expect failure, returning stderr.
    pub fn failure(&self, args: &[&str]) -> String {
        let (_, stderr, code) = self.run(args);
        assert!(code != 0, "CLI command unexpectedly succeeded: {:?}", args);
        stderr
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Parse JSON output from CLI.
pub fn parse_json<T: for<'de> serde::Deserialize<'de>>(json: &str) -> T {
    serde_json::from_str(json).expect("Failed to parse JSON output")
}

/// Check if string contains substring
pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected '{}' to contain '{}'",
        haystack,
        needle
    );
}

/// Check if JSON has a specific field
pub fn assert_json_field(json: &serde_json::Value, field: &str) {
    if let Some(obj) = json.as_object() {
        assert!(
            obj.contains_key(field),
            "Expected JSON to contain field '{}', got keys: {:?}",
            field,
            obj.keys().collect::<Vec<_>>()
        );
    } else {
        panic!("Expected JSON object, got: {:?}", json);
    }
}
