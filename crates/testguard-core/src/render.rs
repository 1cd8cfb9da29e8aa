use testguard_types::{Finding, RuleId};

use crate::check::Summary;

/// Pretty-printed JSON array of findings, newline-terminated.
pub fn render_json(findings: &[Finding]) -> Result<String, serde_json::Error> {
    let mut out = serde_json::to_string_pretty(findings)?;
    out.push('\n');
    Ok(out)
}

pub fn render_text(root: &str, summary: &Summary, findings: &[Finding]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "testguard: {} file(s) checked under {root}\n",
        summary.files_checked
    ));
    out.push_str(&format!(
        "violations: {}, errors: {}, warnings: {}\n",
        summary.violations, summary.errors, summary.warnings
    ));
    if summary.ok > 0 {
        out.push_str(&format!("compliant sites: {}\n", summary.ok));
    }
    out.push('\n');

    if findings.is_empty() {
        out.push_str("No findings.\n");
        return out;
    }

    for rule in RuleId::ALL {
        if let Some(n) = summary.by_rule.get(&rule) {
            out.push_str(&format!("  {rule:<18} {n}\n"));
        }
    }
    out.push('\n');

    for f in findings {
        out.push_str(&render_finding_line(f));
    }
    out
}

fn render_finding_line(f: &Finding) -> String {
    let message = single_line(&f.message);
    if f.token.is_empty() {
        format!(
            "{}:{}:{}: {}[{}] {message}\n",
            f.file,
            f.line,
            f.column,
            f.severity.as_str(),
            f.rule.as_str()
        )
    } else {
        format!(
            "{}:{}:{}: {}[{}] {message} (`{}`)\n",
            f.file,
            f.line,
            f.column,
            f.severity.as_str(),
            f.rule.as_str(),
            single_line(&f.token)
        )
    }
}

/// Keeps one finding per line.
fn single_line(s: &str) -> String {
    s.replace('\r', "\\r").replace('\n', "\\n")
}
