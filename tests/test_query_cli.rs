//! End-to-end tests driving the `htq` binary over small HTML fixtures
//! (spec.md §8).

use std::io::Write;
use std::process::Command;

fn htq() -> Command {
    Command::new(env!("CARGO_BIN_EXE_htq"))
}

fn write_fixture(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("htq_test_{name}.html"));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

const FIXTURE: &str = r#"<html>
<body>
<div class="post" id="p1">
<h1>First title</h1>
<p>First body</p>
</div>
<div class="post" id="p2">
<h1>Second title</h1>
<p>Second body</p>
</div>
</body>
</html>
"#;

#[test]
fn raw_match_prints_all_span_with_trailing_newline() {
    let path = write_fixture("raw", FIXTURE);
    let out = htq().args(["h1", path.to_str().unwrap()]).output().unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, "<h1>First title</h1>\n<h1>Second title</h1>\n");
}

#[test]
fn node_formatter_overrides_default_rendering() {
    let path = write_fixture("formatter", FIXTURE);
    let out = htq()
        .args([r#"h1 | "%i\n""#, path.to_str().unwrap()])
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, "First title\nSecond title\n");
}

#[test]
fn class_predicate_filters_matches() {
    let path = write_fixture("class", FIXTURE);
    let out = htq()
        .args([r#"div .post | "%v(id)\n""#, path.to_str().unwrap()])
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, "p1\np2\n");
}

#[test]
fn chain_threads_anchors_through_links() {
    let path = write_fixture("chain", FIXTURE);
    let out = htq()
        .args([r#"div [0]; h1 | "%i\n""#, path.to_str().unwrap()])
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, "First title\n");
}

#[test]
fn structured_object_emits_json() {
    let path = write_fixture("object", FIXTURE);
    let out = htq()
        .args([
            r#"{ .name.s div .post [0] ; h1 | "%i", .text.s div .post [0] ; p | "%i" }"#,
            path.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, r#"{"name":"First title","text":"First body"}"#);
}

#[test]
fn array_field_collects_every_match() {
    let path = write_fixture("array", FIXTURE);
    let out = htq()
        .args([
            r#"{ .titles[ h1 | "%i" ] }"#,
            path.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, r#"{"titles":["First title","Second title"]}"#);
}

#[test]
fn list_flag_prints_canned_query() {
    let path = write_fixture("list", "<a>x</a>");
    let out = htq().args(["-l", path.to_str().unwrap()]).output().unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains(" a\n"), "stdout was: {stdout:?}");
}

#[test]
fn output_flag_writes_to_file() {
    let path = write_fixture("output_src", FIXTURE);
    let out_path = std::env::temp_dir().join("htq_test_output_dst.txt");
    let status = htq()
        .args([
            "h1",
            path.to_str().unwrap(),
            "-o",
            out_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(status.success());
    let written = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(written, "<h1>First title</h1>\n<h1>Second title</h1>\n");
}

#[test]
fn missing_file_reports_system_error() {
    let status = htq()
        .args(["h1", "/nonexistent/path/htq-missing.html"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(5));
}

#[test]
fn malformed_query_reports_script_error() {
    let path = write_fixture("bad_query", FIXTURE);
    let status = htq().args(["{ a", path.to_str().unwrap()]).status().unwrap();
    assert_eq!(status.code(), Some(15));
}
