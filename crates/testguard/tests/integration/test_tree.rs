//! Test tree helper for BDD integration tests.
//!
//! Provides a `TestTree` that lays out files in a temporary directory and runs
//! the testguard binary against it.

#![allow(dead_code)]
#![allow(deprecated)]

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary source tree to check.
pub struct TestTree {
    pub dir: TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Create a tree with the given files already written.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let tree = Self::new();
        for (path, content) in files {
            tree.write_file(path, content);
        }
        tree
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, relative_path: &str, content: &str) {
        let full_path = self.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&full_path, content).expect("write file");
    }

    /// Write `testguard.toml` at the root, where it is discovered.
    pub fn write_config(&self, content: &str) {
        self.write_file("testguard.toml", content);
    }

    /// Run testguard on the tree root, collecting findings through `--out`.
    pub fn run(&self, extra_args: &[&str]) -> TestguardResult {
        self.run_with_env(extra_args, &[])
    }

    pub fn run_with_env(&self, extra_args: &[&str], env: &[(&str, &str)]) -> TestguardResult {
        let out_path = self.path().join("artifacts/testguard/findings.json");

        let mut cmd = Command::cargo_bin("testguard").expect("testguard binary");
        cmd.arg(self.path()).arg("--out").arg(&out_path);
        for arg in extra_args {
            cmd.arg(arg);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = cmd.output().expect("run testguard");

        let findings = if out_path.exists() {
            Some(std::fs::read_to_string(&out_path).expect("read findings"))
        } else {
            None
        };

        TestguardResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            findings,
            output_path: out_path,
        }
    }
}

/// The result of running the testguard binary.
#[derive(Debug)]
pub struct TestguardResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The JSON written to `--out`, when the run got that far.
    pub findings: Option<String>,
    pub output_path: PathBuf,
}

impl TestguardResult {
    pub fn assert_exit_code(&self, expected: i32) -> &Self {
        assert_eq!(
            self.exit_code, expected,
            "Expected exit code {} but got {}.\nstderr: {}\nstdout: {}",
            expected, self.exit_code, self.stderr, self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stderr.contains(needle),
            "Expected stderr to contain '{}'.\nstderr: {}",
            needle,
            self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stdout.contains(needle),
            "Expected stdout to contain '{}'.\nstdout: {}",
            needle,
            self.stdout
        );
        self
    }

    pub fn parse_findings(&self) -> Findings {
        let text = self.findings.as_ref().expect("findings should be written");
        let value: Value = serde_json::from_str(text).expect("findings are valid JSON");
        let items = value.as_array().expect("findings are a JSON array").clone();
        Findings { items }
    }
}

/// Parsed findings array with counting helpers.
pub struct Findings {
    pub items: Vec<Value>,
}

impl Findings {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn count(&self, rule: &str, severity: &str) -> usize {
        self.items
            .iter()
            .filter(|f| f["rule"] == rule && f["severity"] == severity)
            .count()
    }

    pub fn violations(&self) -> usize {
        self.items
            .iter()
            .filter(|f| f["severity"] == "violation")
            .count()
    }

    pub fn rules(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|f| f["rule"].as_str().map(str::to_string))
            .collect()
    }

    pub fn files(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|f| f["file"].as_str().map(str::to_string))
            .collect()
    }
}
