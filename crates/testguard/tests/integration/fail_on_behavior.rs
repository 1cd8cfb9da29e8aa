//! BDD tests for --fail-on behavior.
//!
//! Verifies that only violations fail a run, and that `never` turns them off.

use super::test_tree::TestTree;

const PREFIXED_TEST: &str = "#[test]\nfn test_parses_header() {\n    expect_that!(1, eq(1));\n}\n";

/// Scenario: violations fail by default.
///
/// Given: A test named with the banned prefix
/// When: Running without --fail-on
/// Then: Exit code is 1
#[test]
fn given_violation_when_default_fail_on_then_exit_1() {
    let tree = TestTree::with_files(&[("tests/header.rs", PREFIXED_TEST)]);

    let result = tree.run(&[]);
    result.assert_exit_code(1);
    assert_eq!(result.parse_findings().count("naming-style", "violation"), 1);
}

/// Scenario: violations do not fail when --fail-on never is set.
///
/// Given: A test named with the banned prefix
/// When: Running with --fail-on never
/// Then: Exit code is 0 and the violation is still reported
#[test]
fn given_violation_when_fail_on_never_then_exit_0() {
    let tree = TestTree::with_files(&[("tests/header.rs", PREFIXED_TEST)]);

    let result = tree.run(&["--fail-on", "never"]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().violations(), 1);
}

/// Scenario: fail_on from the config file.
///
/// Given: A config with `fail_on = "never"` and a violating test
/// When: Running without --fail-on
/// Then: Exit code is 0
#[test]
fn given_config_fail_on_never_when_checked_then_exit_0() {
    let tree = TestTree::with_files(&[("tests/header.rs", PREFIXED_TEST)]);
    tree.write_config("[defaults]\nfail_on = \"never\"\n");

    tree.run(&[]).assert_exit_code(0);
}

/// Scenario: the flag beats the config file.
///
/// Given: A config with `fail_on = "never"` and a violating test
/// When: Running with --fail-on violation
/// Then: Exit code is 1
#[test]
fn given_config_fail_on_never_when_flag_says_violation_then_exit_1() {
    let tree = TestTree::with_files(&[("tests/header.rs", PREFIXED_TEST)]);
    tree.write_config("[defaults]\nfail_on = \"never\"\n");

    tree.run(&["--fail-on", "violation"]).assert_exit_code(1);
}

/// Scenario: errors and warnings alone never fail a run.
///
/// Given: Only a degraded file in an otherwise empty tree
/// When: Running with the default policy
/// Then: Exit code is 0
#[test]
fn given_only_error_findings_when_checked_then_exit_0() {
    let tree = TestTree::with_files(&[("src/lib.rs", "const S: &str = \"never closed;\n")]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().count("parse-degraded", "error"), 1);
}

/// Scenario: an unknown --fail-on value is a usage error.
///
/// Given: Any tree
/// When: Running with --fail-on sometimes
/// Then: Exit code is 2
#[test]
fn given_unknown_fail_on_value_when_run_then_exit_2() {
    let tree = TestTree::new();
    tree.run(&["--fail-on", "sometimes"]).assert_exit_code(2);
}
