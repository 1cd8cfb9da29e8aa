//! Data types (config + findings) for testguard.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Config file looked up in the scanned root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "testguard.toml";

pub const DEFAULT_FILE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4 * 1024 * 1024;

// ── Frozen Vocabulary ──────────────────────────────────────────

/// Rule identifiers carried by every [`Finding`].
///
/// Variants are declared in lexical order of their wire names, so the derived
/// `Ord` matches ordering by identifier string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    AssertionStyle,
    IoError,
    NamingStyle,
    ParseDegraded,
    RunnerInvocation,
    SymlinkCycle,
}

impl RuleId {
    pub const ALL: [RuleId; 6] = [
        RuleId::AssertionStyle,
        RuleId::IoError,
        RuleId::NamingStyle,
        RuleId::ParseDegraded,
        RuleId::RunnerInvocation,
        RuleId::SymlinkCycle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::AssertionStyle => "assertion-style",
            RuleId::IoError => "io-error",
            RuleId::NamingStyle => "naming-style",
            RuleId::ParseDegraded => "parse-degraded",
            RuleId::RunnerInvocation => "runner-invocation",
            RuleId::SymlinkCycle => "symlink-cycle",
        }
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A compliant site, reported only for coverage.
    Ok,
    /// Something was skipped but checking is otherwise unaffected.
    Warning,
    /// The file could not be checked.
    Error,
    /// A policy breach.
    Violation,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Violation => "violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailOn {
    Violation,
    Never,
}

impl FailOn {
    pub fn as_str(self) -> &'static str {
        match self {
            FailOn::Violation => "violation",
            FailOn::Never => "never",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

/// Which assertion call sites the assertion-style rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssertionScope {
    /// Test bodies, `#[cfg(test)]` modules and files under test paths.
    #[default]
    Tests,
    Everywhere,
}

/// A single result record.
///
/// Field order is the JSON wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub rule: RuleId,
    pub severity: Severity,
    /// Root-relative path with forward slashes.
    pub file: String,
    /// 1-based; 0 for file-level findings.
    pub line: u32,
    /// 1-based; 0 for file-level findings.
    pub column: u32,
    pub message: String,
    /// The offending token, verbatim from the source. Empty for file-level findings.
    pub token: String,
}

impl Finding {
    /// A finding that concerns a whole file rather than a position in it.
    pub fn file_level(
        rule: RuleId,
        severity: Severity,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            severity,
            file: file.into(),
            line: 0,
            column: 0,
            message: message.into(),
            token: String::new(),
        }
    }

    pub fn is_violation(&self) -> bool {
        self.severity == Severity::Violation
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// The on-disk configuration file (`testguard.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConfigFile {
    /// Include other config files. Paths are relative to this config file's directory.
    /// Later files override earlier ones section by section.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub tests: TestsConfig,

    #[serde(default)]
    pub assertions: AssertionsConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

impl ConfigFile {
    pub fn built_in() -> Self {
        Self::default()
    }
}

/// Run-level defaults. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on: Option<FailOn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// Emit `ok` findings for compliant assertion and runner sites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_ok: Option<bool>,

    /// Worker threads for extraction. 0 means available parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_bytes: Option<u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            fail_on: Some(FailOn::Violation),
            format: Some(OutputFormat::Text),
            report_ok: Some(false),
            jobs: Some(0),
            file_timeout_ms: Some(DEFAULT_FILE_TIMEOUT_MS),
            max_file_bytes: Some(DEFAULT_MAX_FILE_BYTES),
        }
    }
}

/// Which files are scanned and how they are classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScanConfig {
    /// Globs for source files searched for tests and assertions.
    pub sources: Vec<String>,

    /// Globs for build/CI scripts searched for runner invocations.
    pub scripts: Vec<String>,

    /// Globs matched against every entry; a matching directory prunes its subtree.
    pub ignore: Vec<String>,

    /// Globs for files whose every assertion counts as test code.
    pub test_paths: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sources: strings(&["**/*.rs"]),
            scripts: strings(&[
                "**/*.sh",
                "**/*.bash",
                "**/Makefile",
                "**/*.mk",
                "**/justfile",
                "**/Justfile",
                "**/.justfile",
                "**/Makefile.toml",
                ".github/workflows/*.yml",
                ".github/workflows/*.yaml",
                "**/.gitlab-ci.yml",
            ]),
            ignore: strings(&["**/target", "**/.git", "**/vendor", "**/node_modules"]),
            test_paths: strings(&[
                "**/tests/**",
                "**/tests.rs",
                "**/*_test.rs",
                "**/*_tests.rs",
            ]),
        }
    }
}

/// How test declarations are recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TestsConfig {
    /// Attribute paths that mark the following `fn` as a test (e.g. `tokio::test`).
    pub attributes: Vec<String>,

    /// Registration calls whose first argument names a test (e.g. `it`, `test`).
    pub calls: Vec<String>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            attributes: strings(&["test", "googletest::test", "gtest", "tokio::test", "rstest"]),
            calls: vec![],
        }
    }
}

/// Assertion-style policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AssertionsConfig {
    /// Raw assertions. A trailing `!` is accepted and ignored when matching.
    pub deny: Vec<String>,

    /// Matcher-style assertions.
    pub allow: Vec<String>,

    pub scope: AssertionScope,
}

impl Default for AssertionsConfig {
    fn default() -> Self {
        Self {
            deny: strings(&[
                "assert!",
                "assert_eq!",
                "assert_ne!",
                "debug_assert!",
                "debug_assert_eq!",
                "debug_assert_ne!",
            ]),
            allow: strings(&[
                "assert_that!",
                "expect_that!",
                "verify_that!",
                "assert_pred!",
                "expect_pred!",
                "expect_float_eq!",
                "expect_near!",
                "assert_near!",
                "expect_true!",
                "expect_false!",
            ]),
            scope: AssertionScope::Tests,
        }
    }
}

/// Naming-style policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NamingConfig {
    /// Names starting with this prefix are rejected. Empty disables the check.
    pub banned_prefix: String,

    /// Optional regex every name must match. Empty disables the check.
    pub pattern: String,

    /// Words (split on `_`) that make a name generic, e.g. `foo`, `works`.
    pub placeholder_words: Vec<String>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            banned_prefix: "test_".to_string(),
            pattern: String::new(),
            placeholder_words: vec![],
        }
    }
}

/// Runner-invocation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RunnerConfig {
    /// The designated task-runner command.
    pub wrapper: String,

    /// Commands that run the test framework directly.
    pub native: Vec<String>,

    /// Files that define the wrapper and may call the native runner.
    pub wrapper_files: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            wrapper: "just test".to_string(),
            native: strings(&["cargo test"]),
            wrapper_files: strings(&["**/justfile", "**/Justfile", "**/.justfile"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
