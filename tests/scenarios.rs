//! Black-box integration tests exercising the driver end-to-end, one file per
//! concrete scenario from the project's testable-properties list.

use std::path::PathBuf;

use adanc::{compile, CompileOptions};

fn write_fixture(name: &str, source: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("adanc_scenario_{name}_{}.adn", std::process::id()));
    std::fs::write(&path, source).expect("write fixture");
    path
}

fn options(input: PathBuf) -> CompileOptions {
    CompileOptions {
        input,
        output: PathBuf::from("a.out"),
        include: vec![PathBuf::from(env!("CARGO_MANIFEST_DIR"))],
        warnings_as_errors: false,
        suppress_warnings: false,
        verbose: false,
        emit_stage: None,
    }
}

#[test]
fn smallest_valid_program_emits_one_function() {
    let path = write_fixture("smallest", "fun main(): i64 { return 0; }");
    let outcome = compile(&options(path));

    assert!(!outcome.diagnostics.has_errors());
    let ir = outcome.llvm_ir.expect("llvm ir emitted");
    assert!(ir.contains("define i64 @main() {"));
    assert!(ir.contains("ret i64 0"));
}

#[test]
fn variable_and_arithmetic_lowers_to_alloca_store_load_add() {
    let path = write_fixture(
        "arith",
        "fun main(): i64 { set x: i64 = 2; set y: i64 = 3; return x + y; }",
    );
    let outcome = compile(&options(path));

    assert!(!outcome.diagnostics.has_errors());
    let ir = outcome.llvm_ir.expect("llvm ir emitted");
    assert_eq!(ir.matches("alloca i64").count(), 2);
    assert_eq!(ir.matches("store i64").count(), 2);
    assert!(ir.contains("= add i64"));
}

#[test]
fn void_function_and_call_declares_println_and_emits_string_global() {
    let path = write_fixture(
        "voidcall",
        "import \"adan/io\"; fun greet(): void { println(\"hi\"); } fun main(): i64 { greet(); return 0; }",
    );
    let outcome = compile(&options(path));

    assert!(!outcome.diagnostics.has_errors());
    let ir = outcome.llvm_ir.expect("llvm ir emitted");
    assert!(ir.contains("private constant"));
    assert!(ir.contains("declare void @println(i8*)"));
    assert!(ir.contains("define void @greet()"));
    assert!(ir.contains("call void @println"));
    assert!(ir.contains("call void @greet"));
}

#[test]
fn type_mismatch_in_initializer_is_a_semantic_error_with_no_ir() {
    let path = write_fixture("mismatch", "fun main(): i64 { set x: i64 = \"oops\"; return 0; }");
    let outcome = compile(&options(path));

    assert!(outcome.diagnostics.has_errors());
    assert!(outcome.llvm_ir.is_none());
    let rendered = outcome.diagnostics.render(false);
    assert!(rendered.contains("type mismatch"));
}

#[test]
fn missing_return_on_a_path_is_a_semantic_error() {
    let path = write_fixture("missingreturn", "fun f(c: bool): i64 { if (c) { return 1; } }");
    let outcome = compile(&options(path));

    assert!(outcome.diagnostics.has_errors());
    assert!(outcome.llvm_ir.is_none());
}

#[test]
fn unused_variable_is_a_warning_and_ir_still_emits() {
    let path = write_fixture("unused", "fun main(): i64 { set unused: i64 = 7; return 0; }");
    let outcome = compile(&options(path));

    assert!(!outcome.diagnostics.has_errors());
    assert_eq!(outcome.diagnostics.warning_count(), 1);
    assert!(outcome.llvm_ir.is_some());
}

#[test]
fn unused_variable_becomes_an_error_with_warnings_as_errors() {
    let path = write_fixture("unused_werr", "fun main(): i64 { set unused: i64 = 7; return 0; }");
    let mut opts = options(path);
    opts.warnings_as_errors = true;
    let outcome = compile(&opts);

    assert!(outcome.diagnostics.has_errors());
    assert_eq!(outcome.diagnostics.warning_count(), 0);
}
