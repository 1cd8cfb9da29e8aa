//! BDD tests for non-Rust sources and scripts.

use super::test_tree::TestTree;

/// Scenario: JavaScript tests registered through calls.
///
/// Given: Sources widened to `*.test.js`, `it`/`test` as registration calls
/// When: Checking a spec with a prefixed name and a bare `assert(..)`
/// Then: One naming-style and one assertion-style violation are reported
#[test]
fn given_js_call_style_tests_when_checked_then_naming_and_assertions_apply() {
    let tree = TestTree::with_files(&[(
        "web/sum.test.js",
        r#"const { sum } = require('./sum');

test('test_sum works', () => {
  assert(sum(1, 2) === 3);
});

it('adds negative numbers', () => {
  expectThat(sum(-1, -2), equals(-3));
});
"#,
    )]);
    tree.write_config(
        r#"
[scan]
sources = ["**/*.rs", "**/*.test.js"]

[tests]
calls = ["it", "test"]

[assertions]
allow = ["expectThat"]
"#,
    );

    let result = tree.run(&[]);
    result.assert_exit_code(1);

    let findings = result.parse_findings();
    assert_eq!(findings.count("naming-style", "violation"), 1);
    assert_eq!(findings.count("assertion-style", "violation"), 1);
    assert_eq!(findings.items[0]["token"], "test_sum works");
    assert_eq!(findings.items[1]["token"], "assert");
}

/// Scenario: Makefiles and workflow files are scripts too.
///
/// Given: A Makefile recipe and a workflow step both running `cargo test`
/// When: Checking the tree
/// Then: Each invocation is a runner-invocation violation
#[test]
fn given_native_runner_in_makefile_and_workflow_when_checked_then_both_reported() {
    let tree = TestTree::with_files(&[
        ("Makefile", "check:\n\tcargo test --all\n"),
        (
            ".github/workflows/ci.yml",
            "jobs:\n  test:\n    steps:\n      - run: cargo test --locked\n",
        ),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(1);

    let findings = result.parse_findings();
    assert_eq!(findings.count("runner-invocation", "violation"), 2);
    assert_eq!(findings.files(), vec![".github/workflows/ci.yml", "Makefile"]);
}

/// Scenario: the wrapper itself may call the native runner.
///
/// Given: A justfile whose `test` recipe runs `cargo test`
/// When: Checking the tree
/// Then: Nothing is reported
#[test]
fn given_native_runner_inside_wrapper_file_when_checked_then_allowed() {
    let tree = TestTree::with_files(&[("justfile", "test:\n    cargo test --workspace\n")]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().len(), 0);
}

/// Scenario: ignored directories are never read.
///
/// Given: Violations only under `target/` and `vendor/`
/// When: Checking the tree
/// Then: Nothing is reported
#[test]
fn given_violations_in_ignored_directories_when_checked_then_skipped() {
    let tree = TestTree::with_files(&[
        ("target/debug/build/gen.rs", "#[test]\nfn test_generated() {}\n"),
        ("vendor/dep/run.sh", "cargo test\n"),
        ("src/lib.rs", "pub fn f() {}\n"),
    ]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.parse_findings().len(), 0);
}
