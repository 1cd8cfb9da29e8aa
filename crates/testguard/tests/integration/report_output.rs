//! BDD tests for the console report, the --out file and run-to-run stability.

use super::test_tree::TestTree;

fn mixed_tree() -> TestTree {
    TestTree::with_files(&[
        (
            "src/lib.rs",
            "#[cfg(test)]\nmod tests {\n    #[test]\n    fn test_one() {\n        assert_eq!(1, 1);\n        expect_that!(1, eq(1));\n    }\n}\n",
        ),
        ("ci/a.sh", "cargo test\njust test\n"),
        ("ci/b.sh", "cargo +nightly test -p core\n"),
        ("tests/words.rs", "#[test]\nfn splits_on_spaces() {\n    assert_ne!(1, 2);\n}\n"),
    ])
}

/// Scenario: JSON on stdout matches the --out file.
///
/// Given: A tree with violations
/// When: Running with --format json
/// Then: stdout is exactly the JSON array written to --out
#[test]
fn given_violations_when_format_json_then_stdout_equals_out_file() {
    let tree = mixed_tree();

    let result = tree.run(&["--format", "json"]);
    result.assert_exit_code(1);

    let out = result.findings.as_ref().expect("out file written");
    assert_eq!(&result.stdout, out);
    assert!(result.stdout.ends_with("]\n"));
}

/// Scenario: two runs over an unchanged tree.
///
/// Given: A tree with findings in several files
/// When: Running twice with --format json
/// Then: Both outputs are byte-identical
#[test]
fn given_unchanged_tree_when_run_twice_then_json_is_identical() {
    let tree = mixed_tree();

    let first = tree.run(&["--format", "json"]);
    let second = tree.run(&["--format", "json"]);
    assert_eq!(first.stdout, second.stdout);
}

/// Scenario: worker count does not leak into results.
///
/// Given: A tree with findings in several files
/// When: Running with one worker and with four
/// Then: The JSON output is identical
#[test]
fn given_tree_when_jobs_vary_then_findings_do_not_change() {
    let tree = mixed_tree();

    let serial = tree.run(&["--format", "json", "--jobs", "1"]);
    let parallel = tree.run(&["--format", "json", "--jobs", "4"]);
    serial.assert_exit_code(1);
    assert_eq!(serial.stdout, parallel.stdout);
}

/// Scenario: findings are sorted by location.
///
/// Given: Findings across scripts and sources
/// When: Running testguard
/// Then: Findings come out ordered by file, then line
#[test]
fn given_findings_in_many_files_when_checked_then_sorted_by_location() {
    let tree = mixed_tree();

    let findings = tree.run(&[]).parse_findings();
    assert_eq!(
        findings.files(),
        vec!["ci/a.sh", "ci/b.sh", "src/lib.rs", "src/lib.rs", "tests/words.rs"]
    );
    assert_eq!(findings.items[1]["token"], "cargo +nightly test");
    assert_eq!(findings.items[2]["line"], 4);
    assert_eq!(findings.items[3]["line"], 5);
}

/// Scenario: the text report.
///
/// Given: A tree with violations
/// When: Running with the default text format
/// Then: stdout carries the summary, per-rule counts and one line per finding
#[test]
fn given_violations_when_format_text_then_summary_and_lines_are_printed() {
    let tree = mixed_tree();

    let result = tree.run(&[]);
    result
        .assert_exit_code(1)
        .assert_stdout_contains("file(s) checked under")
        .assert_stdout_contains("violations: 5, errors: 0, warnings: 0")
        .assert_stdout_contains("  assertion-style    2\n")
        .assert_stdout_contains(
            "src/lib.rs:4:8: violation[naming-style] test name `test_one` starts with `test_`; describe the behavior instead (`test_one`)",
        )
        .assert_stdout_contains("ci/a.sh:1:1: violation[runner-invocation]");
}

/// Scenario: compliant sites on request.
///
/// Given: A tree with one matcher assertion and one wrapper invocation
/// When: Running with --report-ok
/// Then: Both sites are reported as ok and the exit code stays 0
#[test]
fn given_compliant_sites_when_report_ok_then_ok_findings_are_listed() {
    let tree = TestTree::with_files(&[
        ("tests/math.rs", "#[test]\nfn adds() {\n    expect_that!(1 + 1, eq(2));\n}\n"),
        ("ci/run.sh", "just test\n"),
    ]);

    let result = tree.run(&["--report-ok"]);
    result
        .assert_exit_code(0)
        .assert_stdout_contains("compliant sites: 2");

    let findings = result.parse_findings();
    assert_eq!(findings.count("assertion-style", "ok"), 1);
    assert_eq!(findings.count("runner-invocation", "ok"), 1);
}

/// Scenario: --out creates missing directories.
///
/// Given: A compliant tree
/// When: Running with --out pointing into directories that do not exist
/// Then: The file is written and holds an empty array
#[test]
fn given_out_path_in_missing_directory_when_run_then_it_is_created() {
    let tree = TestTree::with_files(&[("tests/math.rs", "#[test]\nfn adds() {}\n")]);

    let result = tree.run(&[]);
    result.assert_exit_code(0);
    assert_eq!(result.findings.as_deref(), Some("[]\n"));
}

/// Scenario: the root does not exist.
///
/// Given: A path that is not there
/// When: Running testguard on it
/// Then: Exit code is 2 with the reason on stderr
#[test]
fn given_missing_root_when_run_then_exit_2() {
    let tree = TestTree::new();
    let missing = tree.path().join("missing");

    let output = assert_cmd::Command::cargo_bin("testguard")
        .expect("testguard binary")
        .arg(&missing)
        .output()
        .expect("run testguard");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}
