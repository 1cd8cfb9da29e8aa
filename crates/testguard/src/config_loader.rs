//! Configuration loading with include resolution.
//!
//! A config file may list `includes`, resolved relative to its own directory.
//! Included files are merged in order and the including file is merged last,
//! so later definitions win section by section.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use testguard_types::{
    AssertionsConfig, ConfigFile, Defaults, NamingConfig, RunnerConfig, ScanConfig, TestsConfig,
};

/// Maximum depth for include resolution.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Load a configuration file and everything it includes.
///
/// `expand_env` runs over the raw text of every file before it is parsed.
pub fn load_config_with_includes<F>(path: &Path, expand_env: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Result<String> + Copy,
{
    let mut chain = Vec::new();
    load_config_recursive(path, expand_env, &mut chain, 0)
}

fn load_config_recursive<F>(
    path: &Path,
    expand_env: F,
    chain: &mut Vec<PathBuf>,
    depth: usize,
) -> Result<ConfigFile>
where
    F: Fn(&str) -> Result<String> + Copy,
{
    if depth > MAX_INCLUDE_DEPTH {
        bail!(
            "include depth exceeded maximum of {} levels at '{}'",
            MAX_INCLUDE_DEPTH,
            path.display()
        );
    }

    let canonical = path
        .canonicalize()
        .with_context(|| format!("canonicalize path '{}'", path.display()))?;

    // Only the current include chain counts; the same file may be reached twice
    // through different branches.
    if chain.contains(&canonical) {
        bail!("circular include detected: '{}'", path.display());
    }

    debug!(path = %path.display(), depth, "loading config");

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config '{}'", path.display()))?;
    let expanded = expand_env(&text)
        .with_context(|| format!("expand environment in '{}'", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&expanded).with_context(|| format!("parse config '{}'", path.display()))?;

    if config.includes.is_empty() {
        return Ok(config);
    }

    let base_dir = path.parent().unwrap_or(Path::new("."));
    chain.push(canonical);

    let mut merged = ConfigFile::built_in();
    for include_path in &config.includes {
        let full_path = base_dir.join(include_path);
        debug!(include = %include_path, base = %base_dir.display(), "resolving include");

        if !full_path.exists() {
            bail!(
                "included config file not found: '{}' (resolved from '{}')",
                full_path.display(),
                include_path
            );
        }

        let included = load_config_recursive(&full_path, expand_env, chain, depth + 1)?;
        merged = merge_configs(merged, included);
    }

    chain.pop();
    Ok(merge_configs(merged, config))
}

/// Merge `other` on top of `base`.
///
/// `[defaults]` merges key by key. Every other section replaces the base
/// section whole, unless it is identical to the built-in section.
fn merge_configs(base: ConfigFile, other: ConfigFile) -> ConfigFile {
    ConfigFile {
        includes: vec![],
        defaults: merge_defaults(base.defaults, other.defaults),
        scan: pick(base.scan, other.scan, ScanConfig::default()),
        tests: pick(base.tests, other.tests, TestsConfig::default()),
        assertions: pick(base.assertions, other.assertions, AssertionsConfig::default()),
        naming: pick(base.naming, other.naming, NamingConfig::default()),
        runner: pick(base.runner, other.runner, RunnerConfig::default()),
    }
}

fn merge_defaults(base: Defaults, other: Defaults) -> Defaults {
    if other == Defaults::default() {
        return base;
    }
    Defaults {
        fail_on: other.fail_on.or(base.fail_on),
        format: other.format.or(base.format),
        report_ok: other.report_ok.or(base.report_ok),
        jobs: other.jobs.or(base.jobs),
        file_timeout_ms: other.file_timeout_ms.or(base.file_timeout_ms),
        max_file_bytes: other.max_file_bytes.or(base.max_file_bytes),
    }
}

fn pick<T: PartialEq>(base: T, other: T, built_in: T) -> T {
    if other == built_in { base } else { other }
}
