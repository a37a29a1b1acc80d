//! Integration tests for the `ember` binary.
//!
//! Runs the built executable against the demo programs and small
//! temporary sources, checking stdout, stderr, and exit status.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

fn ember(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ember"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn ember")
}

fn source_file(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".easm").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_run_rectangle() {
    let path = demos_dir().join("rectangle.easm");
    let output = ember(&["run", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "10\n");
}

#[test]
fn test_run_with_stats_and_overrides() {
    let file = source_file(
        r#"
        .class Node
            int value;
            class Node next;
        .class

        .func main regs=4
            movi x0, 0
            movi x1, 2000
            movi x2, 1
        loop:
            newobj x3, Node
            add x0, x0, x2
            lt x3, x0, x1
            jmp_if x3, loop
            print x0
            ret
        .end
        "#,
    );
    let output = ember(&[
        "run",
        file.path().to_str().unwrap(),
        "--heap-size",
        "8K",
        "--strategy",
        "sweep",
        "--stats",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "2000\n");

    let report = stderr(&output);
    assert!(report.contains("collections:"), "{}", report);
    assert!(report.contains("sweep"), "{}", report);
    assert!(report.contains("8192"), "{}", report);
}

#[test]
fn test_run_with_config_file() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "[gc]\nheap_size = 4096").unwrap();

    // Needs roughly 8000 bytes of live nodes
    let file = source_file(
        r#"
        .class Node
            class Node next;
        .class

        .func main regs=5
            null x0
            movi x1, 0
            movi x2, 500
            movi x3, 1
        loop:
            newobj x4, Node
            stfield x4, Node@next, x0
            mov x0, x4
            add x1, x1, x3
            lt x4, x1, x2
            jmp_if x4, loop
            ret
        .end
        "#,
    );
    let path = file.path().to_str().unwrap();

    let output = ember(&["run", path, "--config", config.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Out of memory"), "{}", stderr(&output));

    // The flag wins over the file
    let output = ember(&[
        "run",
        path,
        "--config",
        config.path().to_str().unwrap(),
        "--heap-size",
        "64K",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn test_runtime_error_reports_location() {
    let file = source_file(
        r#"
        .class Foo
            int x;
        .class

        .func main regs=2
            null x0
            ldfield x1, Foo@x, x0
            ret
        .end
        "#,
    );
    let output = ember(&["run", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.starts_with("error:"), "{}", err);
    assert!(err.contains("'main' at 1"), "{}", err);
}

#[test]
fn test_check_benchmark() {
    let path = demos_dir().join("benchmark.easm");
    let output = ember(&["check", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("3 functions"), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_check_reports_assembly_errors() {
    let file = source_file(".func helper\n    ret\n.end\n");
    let output = ember(&["check", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("main"), "{}", stderr(&output));
}

#[test]
fn test_disasm() {
    let path = demos_dir().join("rectangle.easm");
    let output = ember(&["disasm", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let listing = stdout(&output);
    assert!(listing.contains(".func main"), "{}", listing);
    assert!(listing.contains("(entry)"), "{}", listing);
}

#[test]
fn test_missing_file() {
    let output = ember(&["run", "/nonexistent/program.easm"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read"), "{}", stderr(&output));
}
