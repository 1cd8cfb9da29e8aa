use std::path::Path;

use testguard_types::{AssertionScope, Finding, RuleId, Severity};

use crate::extract::{ExtractError, FileModel, InvocationKind};
use crate::policy::{CalleeKind, CompiledPolicy, NamingPolicy};

/// Apply all three policies to one file's model.
pub fn check_file(model: &FileModel, policy: &CompiledPolicy) -> Vec<Finding> {
    let mut out = Vec::new();
    check_assertions(model, policy, &mut out);
    check_naming(model, policy, &mut out);
    check_runner(model, policy, &mut out);
    out
}

pub fn check_assertions(model: &FileModel, policy: &CompiledPolicy, out: &mut Vec<Finding>) {
    for site in &model.assertions {
        let checked = match policy.assertions.scope {
            AssertionScope::Tests => site.in_test_context,
            AssertionScope::Everywhere => true,
        };
        if !checked {
            continue;
        }

        let token = site.token();
        let (severity, message) = match site.kind {
            CalleeKind::Denied => (
                Severity::Violation,
                format!("raw assertion `{token}`; use a matcher-style assertion instead"),
            ),
            CalleeKind::Allowed if policy.report_ok => {
                (Severity::Ok, format!("matcher-style assertion `{token}`"))
            }
            CalleeKind::Allowed => continue,
        };

        out.push(Finding {
            rule: RuleId::AssertionStyle,
            severity,
            file: model.path.clone(),
            line: site.line,
            column: site.column,
            message,
            token,
        });
    }
}

pub fn check_naming(model: &FileModel, policy: &CompiledPolicy, out: &mut Vec<Finding>) {
    let stem = Path::new(&model.path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    for test in &model.tests {
        let Some(message) = naming_failure(&test.name, stem, &policy.naming) else {
            continue;
        };
        out.push(Finding {
            rule: RuleId::NamingStyle,
            severity: Severity::Violation,
            file: model.path.clone(),
            line: test.line,
            column: test.column,
            message,
            token: test.name.clone(),
        });
    }
}

/// The first naming check `name` fails, as a message.
///
/// A raw identifier is checked without its `r#` marker.
pub fn naming_failure(name: &str, file_stem: &str, naming: &NamingPolicy) -> Option<String> {
    let bare = name.strip_prefix("r#").unwrap_or(name);
    if bare.trim().is_empty() {
        return Some("test name is empty".to_string());
    }

    if !naming.banned_prefix.is_empty() && bare.starts_with(&naming.banned_prefix) {
        return Some(format!(
            "test name `{name}` starts with `{}`; describe the behavior instead",
            naming.banned_prefix
        ));
    }

    if bare == file_stem {
        return Some(format!("test name `{name}` only repeats the file name"));
    }

    if let Some(pattern) = &naming.pattern {
        if !pattern.is_match(bare) {
            return Some(format!(
                "test name `{name}` does not match `{}`",
                pattern.as_str()
            ));
        }
    }

    bare.split(|c: char| c == '_' || c.is_whitespace())
        .map(str::to_lowercase)
        .find(|word| naming.placeholder_words.contains(word))
        .map(|word| format!("test name `{name}` contains placeholder word `{word}`"))
}

pub fn check_runner(model: &FileModel, policy: &CompiledPolicy, out: &mut Vec<Finding>) {
    if model.invocations.is_empty() {
        return;
    }
    let in_wrapper_file = policy.runner.is_wrapper_file(Path::new(&model.path));
    let wrapper = policy.runner.wrapper.join(" ");

    for inv in &model.invocations {
        let (severity, message) = match inv.kind {
            InvocationKind::Native if in_wrapper_file => continue,
            InvocationKind::Native => (
                Severity::Violation,
                format!("native runner `{}` invoked directly; use `{wrapper}`", inv.text),
            ),
            InvocationKind::Wrapper if policy.report_ok => {
                (Severity::Ok, format!("tests run through `{wrapper}`"))
            }
            InvocationKind::Wrapper => continue,
        };

        out.push(Finding {
            rule: RuleId::RunnerInvocation,
            severity,
            file: model.path.clone(),
            line: inv.line,
            column: inv.column,
            message,
            token: inv.text.clone(),
        });
    }
}

/// The file-level finding for a file that could not be extracted.
pub fn degraded_finding(path: &str, err: &ExtractError) -> Finding {
    Finding::file_level(
        RuleId::ParseDegraded,
        Severity::Error,
        path,
        err.to_string(),
    )
}

/// Total order: location, then rule id, severity, message and token.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.line.cmp(&b.line))
            .then(a.column.cmp(&b.column))
            .then(a.rule.as_str().cmp(b.rule.as_str()))
            .then(a.severity.cmp(&b.severity))
            .then_with(|| a.message.cmp(&b.message))
            .then_with(|| a.token.cmp(&b.token))
    });
}
