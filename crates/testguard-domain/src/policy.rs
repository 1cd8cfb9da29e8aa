use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::debug;

use testguard_types::{
    AssertionScope, ConfigFile, DEFAULT_FILE_TIMEOUT_MS, DEFAULT_MAX_FILE_BYTES,
};

#[derive(Debug, thiserror::Error)]
pub enum PolicyCompileError {
    #[error("[{section}] {key} has invalid glob '{glob}': {source}")]
    InvalidGlob {
        section: &'static str,
        key: &'static str,
        glob: String,
        source: globset::Error,
    },

    #[error("[naming] pattern '{pattern}' is not a valid regex: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("[runner] wrapper command is empty")]
    EmptyWrapper,

    #[error("[runner] native command at index {index} is empty")]
    EmptyNative { index: usize },

    #[error("[tests] {key} contains an empty name")]
    EmptyTestMarker { key: &'static str },

    #[error("[assertions] {key} contains an empty identifier")]
    EmptyAssertion { key: &'static str },

    #[error("'{name}' is listed in both [assertions] allow and deny")]
    ConflictingAssertion { name: String },
}

/// Role a scanned file plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Searched for test declarations and assertion calls.
    Source,
    /// Searched for runner invocations.
    Script,
}

/// Path filters used by the scanner.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pub sources: GlobSet,
    pub scripts: GlobSet,
    pub ignore: GlobSet,
    pub test_paths: GlobSet,
}

impl ScanPolicy {
    /// A file matching both source and script globs is a source.
    pub fn classify(&self, rel_path: &Path) -> Option<FileRole> {
        if self.sources.is_match(rel_path) {
            Some(FileRole::Source)
        } else if self.scripts.is_match(rel_path) {
            Some(FileRole::Script)
        } else {
            None
        }
    }

    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        self.ignore.is_match(rel_path)
    }

    pub fn is_test_path(&self, rel_path: &Path) -> bool {
        self.test_paths.is_match(rel_path)
    }
}

#[derive(Debug, Clone)]
pub struct TestMarkers {
    /// Attribute paths, e.g. `test`, `tokio::test`.
    pub attributes: BTreeSet<String>,
    /// Registration call names, e.g. `it`.
    pub calls: BTreeSet<String>,
}

/// How an assertion callee is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeKind {
    Denied,
    Allowed,
}

#[derive(Debug, Clone)]
pub struct AssertionPolicy {
    /// Identifiers without the trailing `!`.
    pub deny: BTreeSet<String>,
    /// Identifiers without the trailing `!`.
    pub allow: BTreeSet<String>,
    pub scope: AssertionScope,
}

impl AssertionPolicy {
    pub fn classify(&self, callee: &str) -> Option<CalleeKind> {
        if self.deny.contains(callee) {
            Some(CalleeKind::Denied)
        } else if self.allow.contains(callee) {
            Some(CalleeKind::Allowed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamingPolicy {
    /// Empty disables the prefix check.
    pub banned_prefix: String,
    pub pattern: Option<Regex>,
    /// Lowercased.
    pub placeholder_words: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct RunnerPolicy {
    pub wrapper: Vec<String>,
    pub native: Vec<Vec<String>>,
    pub wrapper_files: GlobSet,
}

impl RunnerPolicy {
    pub fn is_wrapper_file(&self, rel_path: &Path) -> bool {
        self.wrapper_files.is_match(rel_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_file_bytes: u64,
    pub file_timeout: Duration,
}

/// Everything a run needs, compiled once and shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub scan: ScanPolicy,
    pub tests: TestMarkers,
    pub assertions: AssertionPolicy,
    pub naming: NamingPolicy,
    pub runner: RunnerPolicy,
    pub report_ok: bool,
    pub limits: Limits,
}

pub fn compile_policy(cfg: &ConfigFile) -> Result<CompiledPolicy, PolicyCompileError> {
    let scan = ScanPolicy {
        sources: compile_globs(&cfg.scan.sources, "scan", "sources")?,
        scripts: compile_globs(&cfg.scan.scripts, "scan", "scripts")?,
        ignore: compile_globs(&cfg.scan.ignore, "scan", "ignore")?,
        test_paths: compile_globs(&cfg.scan.test_paths, "scan", "test_paths")?,
    };

    let tests = TestMarkers {
        attributes: compile_markers(&cfg.tests.attributes, "attributes")?,
        calls: compile_markers(&cfg.tests.calls, "calls")?,
    };

    let deny = compile_assertion_names(&cfg.assertions.deny, "deny")?;
    let allow = compile_assertion_names(&cfg.assertions.allow, "allow")?;
    if let Some(name) = deny.intersection(&allow).next() {
        return Err(PolicyCompileError::ConflictingAssertion {
            name: name.clone(),
        });
    }

    let pattern = if cfg.naming.pattern.is_empty() {
        None
    } else {
        let re = Regex::new(&cfg.naming.pattern).map_err(|e| {
            PolicyCompileError::InvalidPattern {
                pattern: cfg.naming.pattern.clone(),
                source: e,
            }
        })?;
        Some(re)
    };

    let naming = NamingPolicy {
        banned_prefix: cfg.naming.banned_prefix.clone(),
        pattern,
        placeholder_words: cfg
            .naming
            .placeholder_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect(),
    };

    let wrapper = split_command(&cfg.runner.wrapper);
    if wrapper.is_empty() {
        return Err(PolicyCompileError::EmptyWrapper);
    }

    let mut native = Vec::with_capacity(cfg.runner.native.len());
    for (index, command) in cfg.runner.native.iter().enumerate() {
        let words = split_command(command);
        if words.is_empty() {
            return Err(PolicyCompileError::EmptyNative { index });
        }
        native.push(words);
    }

    let runner = RunnerPolicy {
        wrapper,
        native,
        wrapper_files: compile_globs(&cfg.runner.wrapper_files, "runner", "wrapper_files")?,
    };

    let limits = Limits {
        max_file_bytes: cfg
            .defaults
            .max_file_bytes
            .unwrap_or(DEFAULT_MAX_FILE_BYTES),
        file_timeout: Duration::from_millis(
            cfg.defaults
                .file_timeout_ms
                .unwrap_or(DEFAULT_FILE_TIMEOUT_MS),
        ),
    };

    debug!(
        attributes = tests.attributes.len(),
        calls = tests.calls.len(),
        deny = deny.len(),
        allow = allow.len(),
        native = runner.native.len(),
        naming_pattern = naming.pattern.is_some(),
        file_timeout_ms = cfg.defaults.file_timeout_ms.unwrap_or(DEFAULT_FILE_TIMEOUT_MS),
        "compiled policy"
    );

    Ok(CompiledPolicy {
        scan,
        tests,
        assertions: AssertionPolicy {
            deny,
            allow,
            scope: cfg.assertions.scope,
        },
        naming,
        runner,
        report_ok: cfg.defaults.report_ok.unwrap_or(false),
        limits,
    })
}

fn compile_globs(
    globs: &[String],
    section: &'static str,
    key: &'static str,
) -> Result<GlobSet, PolicyCompileError> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        let glob = Glob::new(g).map_err(|e| PolicyCompileError::InvalidGlob {
            section,
            key,
            glob: g.clone(),
            source: e,
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| PolicyCompileError::InvalidGlob {
        section,
        key,
        glob: globs.join(", "),
        source: e,
    })
}

fn compile_markers(
    names: &[String],
    key: &'static str,
) -> Result<BTreeSet<String>, PolicyCompileError> {
    let mut out = BTreeSet::new();
    for name in names {
        let name = name.trim().trim_start_matches("::");
        if name.is_empty() {
            return Err(PolicyCompileError::EmptyTestMarker { key });
        }
        out.insert(name.to_string());
    }
    Ok(out)
}

fn compile_assertion_names(
    names: &[String],
    key: &'static str,
) -> Result<BTreeSet<String>, PolicyCompileError> {
    let mut out = BTreeSet::new();
    for name in names {
        let name = normalize_callee(name);
        if name.is_empty() {
            return Err(PolicyCompileError::EmptyAssertion { key });
        }
        out.insert(name.to_string());
    }
    Ok(out)
}

/// `assert_eq!` and `assert_eq` name the same callee.
pub fn normalize_callee(name: &str) -> &str {
    let name = name.trim();
    name.strip_suffix('!').unwrap_or(name).trim_end()
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
