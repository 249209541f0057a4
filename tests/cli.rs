use std::{
    fs,
    path::PathBuf,
    process::{Command, Output},
};

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_ember")
}

fn program(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("programs");
    path.push(name);
    path
}

fn ember(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env("EMBER_PLAIN_DIAGNOSTICS", "1")
        .env_remove("EMBER_LOG")
        .output()
        .expect("failed to run ember binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn runs_nested_call_program() {
    let path = program("calls.ember");
    let output = ember(&["run", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "x1=116");
}

#[test]
fn runs_namespaces_and_loops() {
    let path = program("namespaces.ember");
    let output = ember(&["run", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "hello, inner\ntriple: 42\ncount: 3\nfib sum: 143\nmixed: 3 3.5\n"
    );
}

#[test]
fn runtime_errors_render_a_caret_under_the_call_site() {
    let path = program("undefined.ember");
    let output = ember(&["run", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stderr(&output),
        "Undefined function `missing`:\n    x = missing(x);\n        ^^^^^^^\n"
    );
}

#[test]
fn graphical_report_names_the_error_code() {
    let path = program("undefined.ember");
    let output = Command::new(bin_path())
        .args(["run", path.to_str().unwrap()])
        .env_remove("EMBER_PLAIN_DIAGNOSTICS")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run ember binary");
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("ember::runtime::undefined_function"), "{err}");
    assert!(err.contains("Undefined function `missing`"), "{err}");
}

#[test]
fn missing_main_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.ember");
    fs::write(&path, "func helper() { return 1; }\n").unwrap();
    let output = ember(&["run", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output), "Undefined function `main`\n");
}

#[test]
fn output_before_a_failure_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.ember");
    fs::write(
        &path,
        "func main() {\n    println(\"before\");\n    var z = 1 / 0;\n}\n",
    )
    .unwrap();
    let output = ember(&["run", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "before\n");
    assert!(stderr(&output).starts_with("Division by zero:\n"));
}

#[test]
fn syntax_errors_fail_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ember");
    fs::write(&path, "func main() {\n    print(\"hi\")\n}\n").unwrap();
    let output = ember(&["run", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("Expected `;`"), "{}", stderr(&output));
}

#[test]
fn check_reports_registered_symbols() {
    let path = program("namespaces.ember");
    let output = ember(&["check", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).ends_with(": ok (3 namespaces/classes, 2 top-level functions)\n"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.ember");
    fs::write(&path, "func f() { }\nfunc f() { }\n").unwrap();
    let output = ember(&["check", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Duplicate declaration of function `f`:\n"));
}

#[test]
fn tokens_dumps_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.ember");
    fs::write(&path, "var x = 1;").unwrap();
    let output = ember(&["tokens", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("0..3"));
    assert!(lines[5].contains("end of input"), "{}", lines[5]);
}

#[test]
fn rejects_other_extensions_and_commands() {
    let output = ember(&["run", "program.txt"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Only .ember files are allowed"));

    let output = ember(&["build", "program.ember"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Usage: ember"));

    let output = ember(&["run"]);
    assert_eq!(output.status.code(), Some(1));
}
