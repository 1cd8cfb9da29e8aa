//! BDD tests for the three conventions checked on a whole tree.

use super::test_tree::TestTree;

const RAW_TEST: &str = r#"pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_numbers() {
        assert_eq!(add(2, 2), 4);
    }
}
"#;

const MATCHER_TEST: &str = r#"use googletest::prelude::*;

#[googletest::test]
fn two_plus_two_equals_four() {
    expect_that!(2 + 2, eq(4));
}
"#;

/// Scenario: every convention broken once.
///
/// Given: A prefixed test name, a raw `assert_eq!` and a CI script calling `cargo test`
/// When: Running testguard on the tree
/// Then: Three violations are reported, one per rule, and the exit code is 1
#[test]
fn given_all_three_conventions_broken_when_checked_then_three_violations_and_exit_1() {
    let tree = TestTree::with_files(&[
        ("src/lib.rs", RAW_TEST),
        ("ci/test.sh", "#!/bin/sh\nset -e\ncargo test --workspace\n"),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(1);

    let findings = result.parse_findings();
    assert_eq!(findings.violations(), 3, "findings: {:?}", findings.items);
    assert_eq!(findings.count("naming-style", "violation"), 1);
    assert_eq!(findings.count("assertion-style", "violation"), 1);
    assert_eq!(findings.count("runner-invocation", "violation"), 1);

    assert_eq!(
        findings.rules(),
        vec!["runner-invocation", "naming-style", "assertion-style"],
        "sorted by file, then line"
    );
}

/// Scenario: a compliant tree.
///
/// Given: A descriptively named test using `expect_that!`, run only through `just test`
/// When: Running testguard on the tree
/// Then: No findings are reported and the exit code is 0
#[test]
fn given_compliant_tree_when_checked_then_no_findings_and_exit_0() {
    let tree = TestTree::with_files(&[
        ("tests/arithmetic.rs", MATCHER_TEST),
        ("justfile", "test:\n    cargo test --workspace\n"),
        (".github/workflows/ci.yml", "jobs:\n  test:\n    steps:\n      - run: just test\n"),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);

    let findings = result.parse_findings();
    assert_eq!(findings.len(), 0, "findings: {:?}", findings.items);
    result.assert_stdout_contains("No findings.");
}

/// Scenario: an unreadable file does not stop the run.
///
/// Given: A compliant tree plus a test file nobody may read
/// When: Running testguard on the tree
/// Then: One io-error finding is reported and the exit code stays 0
#[cfg(unix)]
#[test]
fn given_unreadable_file_when_checked_then_io_error_and_exit_0() {
    use std::os::unix::fs::PermissionsExt;

    let tree = TestTree::with_files(&[
        ("tests/arithmetic.rs", MATCHER_TEST),
        ("tests/locked.rs", MATCHER_TEST),
    ]);
    let locked = tree.path().join("tests/locked.rs");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000))
        .expect("chmod 000");

    // Privileged users read through permission bits.
    if std::fs::read(&locked).is_ok() {
        return;
    }

    let result = tree.run(&[]);
    result.assert_exit_code(0);

    let findings = result.parse_findings();
    assert_eq!(findings.len(), 1, "findings: {:?}", findings.items);
    assert_eq!(findings.count("io-error", "error"), 1);
    assert_eq!(findings.files(), vec!["tests/locked.rs"]);

    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644))
        .expect("restore permissions");
}

/// Scenario: raw assertions outside test code.
///
/// Given: A library function guarding an invariant with `assert!`
/// When: Running with the default `tests` scope
/// Then: The assertion is not reported
#[test]
fn given_assert_in_production_code_when_scope_is_tests_then_not_reported() {
    let tree = TestTree::with_files(&[(
        "src/lib.rs",
        "pub fn halve(n: u32) -> u32 {\n    assert!(n % 2 == 0);\n    n / 2\n}\n",
    )]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().len(), 0);
}

/// Scenario: the same assertion when every call site counts.
///
/// Given: A library function guarding an invariant with `assert!`
/// When: The config sets `scope = "everywhere"`
/// Then: One assertion-style violation is reported
#[test]
fn given_assert_in_production_code_when_scope_is_everywhere_then_reported() {
    let tree = TestTree::with_files(&[(
        "src/lib.rs",
        "pub fn halve(n: u32) -> u32 {\n    assert!(n % 2 == 0);\n    n / 2\n}\n",
    )]);
    tree.write_config("[assertions]\nscope = \"everywhere\"\n");

    let result = tree.run(&[]);
    result.assert_exit_code(1);
    assert_eq!(
        result.parse_findings().count("assertion-style", "violation"),
        1
    );
}

/// Scenario: commented-out and quoted mentions are not code.
///
/// Given: `cargo test` only inside shell comments and `assert!` only inside comments and strings
/// When: Running testguard
/// Then: Nothing is reported
#[test]
fn given_mentions_in_comments_and_strings_when_checked_then_ignored() {
    let tree = TestTree::with_files(&[
        (
            "tests/docs.rs",
            "#[test]\nfn explains_usage() {\n    // assert_eq!(1, 1);\n    let _ = \"assert!(x)\";\n    expect_that!(1, eq(1));\n}\n",
        ),
        ("ci/run.sh", "# cargo test is forbidden here\njust test  # not cargo test\n"),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().len(), 0);
}

/// Scenario: a file whose lexing cannot finish.
///
/// Given: A test file ending inside an unterminated block comment
/// When: Running testguard
/// Then: A parse-degraded error is reported and the run still succeeds
#[test]
fn given_unterminated_comment_when_checked_then_parse_degraded_error() {
    let tree = TestTree::with_files(&[
        ("tests/arithmetic.rs", MATCHER_TEST),
        ("tests/broken.rs", "#[test]\nfn test_broken() {\n/* never closed\n"),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);

    let findings = result.parse_findings();
    assert_eq!(findings.count("parse-degraded", "error"), 1);
    assert_eq!(findings.violations(), 0);
}

/// Scenario: symlink cycles are reported once and skipped.
///
/// Given: A directory containing a link back to itself
/// When: Running testguard
/// Then: A symlink-cycle warning is reported and the exit code is 0
#[cfg(unix)]
#[test]
fn given_symlink_cycle_when_checked_then_warning_and_run_completes() {
    let tree = TestTree::with_files(&[("tests/arithmetic.rs", MATCHER_TEST)]);
    std::os::unix::fs::symlink(tree.path().join("tests"), tree.path().join("tests/loop"))
        .expect("symlink");

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(
        result.parse_findings().count("symlink-cycle", "warning"),
        1
    );
}
