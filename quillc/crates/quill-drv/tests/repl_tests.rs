//! End-to-end tests driving the `quill` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn quill() -> Command {
    let mut cmd = Command::cargo_bin("quill").expect("quill binary builds");
    cmd.arg("--banner=false").arg("--terminal=dumb");
    cmd
}

#[test]
fn test_factorial_scenario() {
    quill()
        .write_stdin("fun fact n = if n < 1 then 1 else n * fact (n - 1);\nfact 5;\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("val fact = fn : int -> int")
                .and(predicate::str::contains("val it = 120 : int")),
        );
}

#[test]
fn test_let_polymorphism_scenario() {
    quill()
        .write_stdin("val id = fn x => x;\n(id 1, id \"a\");\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("val it = (1, \"a\") : int * string"));
}

#[test]
fn test_nonexhaustive_match_scenario() {
    quill()
        .write_stdin("fun f 1 = 0;\nf 1;\nf 2;\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Warning: match nonexhaustive")
                .and(predicate::str::contains("val it = 0 : int"))
                .and(predicate::str::contains("uncaught exception Bind")),
        );
}

#[test]
fn test_relational_pipeline_scenario() {
    quill()
        .arg("--foreign=scott")
        .write_stdin("from e in emps where #dept e = \"A\" yield #id e;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("val it = [100,102] : int list"));
}

#[test]
fn test_datalog_transitive_closure_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let program = "edge(x: int, y: int).\n\
                   path(x: int, y: int).\n\
                   edge(1, 2).\n\
                   edge(2, 3).\n\
                   path(X, Y) :- edge(X, Y).\n\
                   path(X, Z) :- path(X, Y), edge(Y, Z).\n\
                   .output path.\n";
    let file = dir.path().join("closure.dl");
    std::fs::write(&file, program).unwrap();
    quill()
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("{x=1,y=2}")
                .and(predicate::str::contains("{x=2,y=3}"))
                .and(predicate::str::contains("{x=1,y=3}")),
        );
}

#[test]
fn test_datalog_non_stratified_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let program = "p(x: int).\nq(x: int).\nn(x: int).\n\
                   p(X) :- n(X), !q(X).\n\
                   q(X) :- n(X), !p(X).\n";
    let file = dir.path().join("bad.dl");
    std::fs::write(&file, program).unwrap();
    quill()
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Program is not stratified"));
}

#[test]
fn test_error_recovery_in_repl() {
    quill()
        .write_stdin("val x = nosuch;\nval y = 2;\ny;\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Error: unbound variable or constructor: nosuch")
                .and(predicate::str::contains("val it = 2 : int")),
        );
}

#[test]
fn test_runtime_error_trace() {
    quill()
        .write_stdin("1 div 0;\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("uncaught exception Div")
                .and(predicate::str::contains("raised at: stdIn:")),
        );
}

#[test]
fn test_echo_flag() {
    quill()
        .arg("--echo")
        .write_stdin("1+2;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 + 2;").and(predicate::str::contains("val it = 3")));
}

#[test]
fn test_use_directive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.ql"), "fun double x = x * 2;\n").unwrap();
    quill()
        .arg("--directory")
        .arg(dir.path())
        .write_stdin("use \"lib.ql\";\ndouble 21;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("val it = 42 : int"));
}

#[test]
fn test_max_use_depth_flag() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("loop.ql"), "use \"loop.ql\";\n").unwrap();
    quill()
        .arg("--directory")
        .arg(dir.path())
        .arg("--maxUseDepth")
        .arg("2")
        .write_stdin("use \"loop.ql\";\n1;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Too many open files"));
}

#[test]
fn test_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("script.ql");
    std::fs::write(&file, "val a = 1;\nval b = a + 1;\nb;\n").unwrap();
    quill()
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("val it = 2 : int"));
}

#[test]
fn test_datatype_session() {
    quill()
        .write_stdin(
            "datatype color = BLUE | GREEN | RED;\n\
             fun name c = case c of RED => \"red\" | GREEN => \"green\" | BLUE => \"blue\";\n\
             name GREEN;\n",
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("val it = \"green\" : string"));
}

#[test]
fn test_banner_suppressed() {
    quill()
        .write_stdin("quit;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("quill version").not());
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("quill")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--banner")
                .and(predicate::str::contains("--maxUseDepth"))
                .and(predicate::str::contains("--foreign")),
        );
}
