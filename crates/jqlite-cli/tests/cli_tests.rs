//! Integration tests for the `jqlite` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to run the actual binary over
//! stdin and fixture files, checking output encoding, input modes, variable
//! binding and exit statuses.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn jqlite() -> Command {
    let mut cmd = Command::cargo_bin("jqlite").unwrap();
    cmd.env_remove("JQLITE_LOG");
    cmd
}

/// Helper: path to the inventory.json fixture.
fn inventory_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/inventory.json")
}

/// Helper: path to the stream.json fixture (three documents).
fn stream_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/stream.json")
}

// ─────────────────────────────────────────────────────────────────────────────
// Output encoding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pretty_prints_by_default() {
    jqlite()
        .arg(".")
        .write_stdin(r#"{"a":[1,2]}"#)
        .assert()
        .success()
        .stdout("{\n  \"a\": [\n    1,\n    2\n  ]\n}\n");
}

#[test]
fn compact_output() {
    jqlite()
        .args(["-c", "."])
        .write_stdin(r#"{"a": [1, 2], "b": null}"#)
        .assert()
        .success()
        .stdout("{\"a\":[1,2],\"b\":null}\n");
}

#[test]
fn tab_indentation() {
    jqlite()
        .args(["--tab", "."])
        .write_stdin("[1]")
        .assert()
        .success()
        .stdout("[\n\t1\n]\n");
}

#[test]
fn custom_indent_width() {
    jqlite()
        .args(["--indent", "4", "."])
        .write_stdin("[1]")
        .assert()
        .success()
        .stdout("[\n    1\n]\n");

    jqlite()
        .args(["--indent", "0", "."])
        .write_stdin("[1, 2]")
        .assert()
        .success()
        .stdout("[1,2]\n");
}

#[test]
fn indent_out_of_range_is_a_usage_error() {
    jqlite()
        .args(["--indent", "9", "."])
        .write_stdin("1")
        .assert()
        .code(2);
}

#[test]
fn raw_output_unquotes_strings_only() {
    jqlite()
        .args(["-r", ".[]"])
        .write_stdin(r#"["a\tb", 1, {"k":"v"}]"#)
        .assert()
        .success()
        .stdout("a\tb\n1\n{\n  \"k\": \"v\"\n}\n");
}

#[test]
fn join_output_drops_newlines() {
    jqlite()
        .args(["-j", ".[]"])
        .write_stdin(r#"["a", 1, "b"]"#)
        .assert()
        .success()
        .stdout("a1b");
}

#[test]
fn non_finite_numbers_are_clamped() {
    jqlite()
        .args(["-c", "[infinite, -infinite, nan]"])
        .write_stdin("null")
        .assert()
        .success()
        .stdout("[1.7976931348623157e308,-1.7976931348623157e308,null]\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Input modes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reads_a_file_argument() {
    jqlite()
        .args(["-r", ".items[] | select(.price > 1) | .name", inventory_path()])
        .assert()
        .success()
        .stdout("gear\nbelt\n");
}

#[test]
fn runs_once_per_document() {
    jqlite()
        .args(["-c", ".id * 10", stream_path()])
        .assert()
        .success()
        .stdout("10\n20\n30\n");
}

#[test]
fn multiple_files_are_concatenated() {
    jqlite()
        .args(["-c", ".store // .id", inventory_path(), stream_path()])
        .assert()
        .success()
        .stdout("\"north\"\n1\n2\n3\n");
}

#[test]
fn slurp_collects_every_document() {
    jqlite()
        .args(["-c", "-s", "map(.id) | add", stream_path()])
        .assert()
        .success()
        .stdout("6\n");
}

#[test]
fn null_input_ignores_stdin() {
    jqlite()
        .args(["-n", "-c", "[1, 2] | length"])
        .write_stdin("this is not json")
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn raw_input_reads_lines() {
    jqlite()
        .args(["-R", "-c", "length"])
        .write_stdin("ab\ncde\n")
        .assert()
        .success()
        .stdout("2\n3\n");
}

#[test]
fn raw_input_with_slurp_reads_everything() {
    jqlite()
        .args(["-R", "-s", "-c", "split(\"\\n\")"])
        .write_stdin("a\nb\n")
        .assert()
        .success()
        .stdout("[\"a\",\"b\",\"\"]\n");
}

#[test]
fn deeply_nested_input_is_accepted() {
    let doc = format!("{}{}", "[".repeat(400), "]".repeat(400));
    jqlite()
        .args(["-c", "[paths] | length"])
        .write_stdin(doc)
        .assert()
        .success()
        .stdout("399\n");
}

#[test]
fn input_past_the_depth_limit_exits_4() {
    let doc = format!("1 {}{}", "[".repeat(10_001), "]".repeat(10_001));
    jqlite()
        .args(["-c", "length"])
        .write_stdin(doc)
        .assert()
        .code(4)
        .stdout("1\n")
        .stderr(predicate::str::contains(
            "cannot parse input: Exceeds depth limit for parsing",
        ));
}

#[test]
fn long_running_loops_finish() {
    jqlite()
        .args(["-n", "0 | until(. >= 100000; . + 1)"])
        .assert()
        .success()
        .stdout("100000\n");
}

#[test]
fn empty_stdin_produces_nothing() {
    jqlite().arg(".").write_stdin("").assert().success().stdout("");
}

// ─────────────────────────────────────────────────────────────────────────────
// Variables
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn arg_binds_a_string() {
    jqlite()
        .args(["-n", "-r", "--arg", "who", "world", "\"hello \\($who)\""])
        .assert()
        .success()
        .stdout("hello world\n");
}

#[test]
fn argjson_binds_parsed_json() {
    jqlite()
        .args(["-n", "-c", "--argjson", "n", "{\"x\": 3}", "$n.x * 2"])
        .assert()
        .success()
        .stdout("6\n");
}

#[test]
fn arg_and_argjson_together() {
    jqlite()
        .args([
            "-n", "-c", "--arg", "a", "1", "--argjson", "b", "1", "[$a, $b]",
        ])
        .assert()
        .success()
        .stdout("[\"1\",1]\n");
}

#[test]
fn invalid_argjson_is_a_usage_error() {
    jqlite()
        .args(["-n", "--argjson", "x", "{oops", "$x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid JSON text passed to --argjson x"));
}

#[test]
fn env_is_visible() {
    jqlite()
        .args(["-n", "-r", "$ENV.JQLITE_TEST_VALUE, env.JQLITE_TEST_VALUE"])
        .env("JQLITE_TEST_VALUE", "present")
        .assert()
        .success()
        .stdout("present\npresent\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Exit statuses and diagnostics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn compile_error_exits_2() {
    jqlite()
        .arg(".a |")
        .write_stdin("{}")
        .assert()
        .code(2)
        .stdout("")
        .stderr(predicate::str::contains("jqlite: error: parse error at line 1, column 5"));
}

#[test]
fn undefined_function_exits_2() {
    jqlite()
        .arg("frobnicate")
        .write_stdin("{}")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("frobnicate/0 is not defined"));
}

#[test]
fn missing_filter_is_a_usage_error() {
    jqlite().assert().code(2);
}

#[test]
fn runtime_error_exits_3_and_keeps_going() {
    jqlite()
        .args(["-c", ".a"])
        .write_stdin("{\"a\":1} [2] {\"a\":3}")
        .assert()
        .code(3)
        .stdout("1\n3\n")
        .stderr(predicate::str::contains(
            "jqlite: error (at <input #2>): Cannot index array with \"a\"",
        ));
}

#[test]
fn outputs_before_an_error_are_kept() {
    jqlite()
        .args(["-c", ".[] | 10 / ."])
        .write_stdin("[1, 0, 2]")
        .assert()
        .code(3)
        .stdout("10\n")
        .stderr(predicate::str::contains("cannot be divided because the divisor is zero"));
}

#[test]
fn error_values_are_reported() {
    jqlite()
        .args(["-n", "error({code: 7})"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("{\"code\":7} (not a string)"));
}

#[test]
fn malformed_input_exits_4() {
    jqlite()
        .args(["-c", "."])
        .write_stdin("1 {\"a\": ")
        .assert()
        .code(4)
        .stdout("1\n")
        .stderr(predicate::str::contains("jqlite: error: cannot parse input"));
}

#[test]
fn missing_file_exits_4() {
    jqlite()
        .args([".", "/nonexistent/jqlite/input.json"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("could not open /nonexistent/jqlite/input.json"));
}

#[test]
fn exit_status_flag_follows_last_output() {
    jqlite().args(["-e", "."]).write_stdin("true").assert().code(0);
    jqlite().args(["-e", "."]).write_stdin("1 null").assert().code(1);
    jqlite().args(["-e", "."]).write_stdin("false").assert().code(1);
    jqlite().args(["-e", "empty"]).write_stdin("1").assert().code(1);
    jqlite().args(["-e", ".[]"]).write_stdin("[false, 0]").assert().code(0);
}

#[test]
fn without_exit_status_flag_falsy_output_succeeds() {
    jqlite().arg(".").write_stdin("null").assert().success().stdout("null\n");
}

#[test]
fn runtime_error_outranks_falsy_status() {
    jqlite()
        .args(["-e", ".a"])
        .write_stdin("[1]")
        .assert()
        .code(3);
}

#[test]
fn version_and_help() {
    jqlite()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("jqlite "));
    jqlite()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--raw-output"))
        .stdout(predicate::str::contains("--argjson"));
}
