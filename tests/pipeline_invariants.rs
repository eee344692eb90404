//! Integration tests for cross-stage invariants that don't belong to any single
//! scenario: emitter determinism, import idempotence, and the `-s/-a/-e` emit-stage
//! flags short-circuiting the pipeline.

use std::path::PathBuf;

use adanc::{compile, CompileOptions, EmitStage};

fn write_fixture(name: &str, source: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("adanc_invariant_{name}_{}.adn", std::process::id()));
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
fn emitting_the_same_program_twice_yields_identical_ir() {
    let source = "fun main(): i64 { set a: i64 = 1; set b: i64 = 2; return a + b; }";
    let path_a = write_fixture("determinism_a", source);
    let path_b = write_fixture("determinism_b", source);

    let ir_a = compile(&options(path_a)).llvm_ir.expect("ir a");
    let ir_b = compile(&options(path_b)).llvm_ir.expect("ir b");

    assert_eq!(ir_a, ir_b);
}

#[test]
fn double_import_of_the_same_stdlib_module_is_idempotent() {
    let path = write_fixture(
        "double_import",
        "import \"adan/io\"; import \"adan/io\"; fun main(): i64 { println(\"hi\"); return 0; }",
    );
    let outcome = compile(&options(path));

    assert!(!outcome.diagnostics.has_errors());
    let ir = outcome.llvm_ir.expect("ir emitted");
    // a single declaration, not one per import statement.
    assert_eq!(ir.matches("declare void @println").count(), 1);
}

#[test]
fn emit_ast_stage_stops_before_lowering_and_returns_no_ir() {
    let path = write_fixture("emit_ast", "fun main(): i64 { return 0; }");
    let mut opts = options(path);
    opts.emit_stage = Some(EmitStage::Ast);
    let outcome = compile(&opts);

    assert!(outcome.llvm_ir.is_none());
    let ast_text = outcome.emitted.expect("ast text");
    assert!(ast_text.contains("main"));
}

#[test]
fn emit_tokens_stage_reports_the_raw_lexeme_stream() {
    let path = write_fixture("emit_tokens", "fun main(): i64 { return 0; }");
    let mut opts = options(path);
    opts.emit_stage = Some(EmitStage::Tokens);
    let outcome = compile(&opts);

    assert!(outcome.llvm_ir.is_none());
    let tokens_text = outcome.emitted.expect("token text");
    assert!(tokens_text.contains("\"fun\""));
    assert!(tokens_text.contains("\"main\""));
}

#[test]
fn unresolvable_import_is_a_semantic_error_naming_the_search_path() {
    let path = write_fixture("bad_import", "import \"adan/does_not_exist\"; fun main(): i64 { return 0; }");
    let outcome = compile(&options(path));

    assert!(outcome.diagnostics.has_errors());
    assert!(outcome.llvm_ir.is_none());
}

#[test]
fn unreadable_input_file_is_a_critical_diagnostic_not_a_panic() {
    let missing = PathBuf::from("/nonexistent/path/to/nowhere.adn");
    let outcome = compile(&options(missing));

    assert!(outcome.diagnostics.has_critical());
    assert!(outcome.llvm_ir.is_none());
}
