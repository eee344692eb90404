//! adanc: an ahead-of-time compiler for the adan language, emitting textual LLVM IR.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod loader;
pub mod lowerer;
pub mod parser;
pub mod symtable;
pub mod typechecker;

use std::path::{Path, PathBuf};

use diagnostics::DiagnosticSink;

/// Which intermediate artifact a `-s`/`-a`/`-e` run stops after and prints instead of
/// producing an object file (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStage {
    Tokens,
    Ast,
    LlvmIr,
}

/// Everything the driver needs to run one compilation, independent of how the flags
/// were parsed (keeps [`crate::main`]'s clap wiring separate from the actual pipeline).
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub include: Vec<PathBuf>,
    pub warnings_as_errors: bool,
    pub suppress_warnings: bool,
    pub verbose: bool,
    pub emit_stage: Option<EmitStage>,
}

pub struct CompileOutcome {
    pub diagnostics: DiagnosticSink,
    pub llvm_ir: Option<String>,
    pub emitted: Option<String>,
}

/// Run the full pipeline: lex (implicitly, via the parser) -> parse -> analyze -> lower
/// -> emit. Every stage reports through the same [`DiagnosticSink`]; the driver decides
/// whether to continue past a gated stage by checking `has_errors()` after it runs
/// (spec §4.9, "no stage aborts the process directly").
pub fn compile(options: &CompileOptions) -> CompileOutcome {
    let mut diags = DiagnosticSink::with_flags(options.warnings_as_errors, options.suppress_warnings, options.verbose);

    let file_display = options.input.display().to_string();
    let source = match std::fs::read_to_string(&options.input) {
        Ok(s) => s,
        Err(e) => {
            diags.critical(file_display.as_str(), 0, 0, format!("cannot read input file: {e}"), diagnostics::Category::Generic);
            return CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: None };
        }
    };

    diags.info(file_display.as_str(), 0, 0, format!("compiling {}", options.input.display()), diagnostics::Category::Generic);

    if matches!(options.emit_stage, Some(EmitStage::Tokens)) {
        let rendered = dump_tokens(&source, &mut diags, &file_display);
        return CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: Some(rendered) };
    }

    let program = {
        let parser = parser::Parser::new(&source, file_display.clone(), &mut diags);
        parser.parse_program()
    };

    if matches!(options.emit_stage, Some(EmitStage::Ast)) {
        let rendered = program.pretty_print();
        return CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: Some(rendered) };
    }

    if diags.has_errors() {
        return CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: None };
    }

    let compilation_root = compilation_root_of(&options.input);
    let resolver = typechecker::resolver_for(compilation_root, options.include.clone());

    {
        let mut analyzer = typechecker::SemanticAnalyzer::new(file_display.clone(), &mut diags, resolver);
        analyzer.analyze(&program);
    }

    if diags.has_errors() {
        return CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: None };
    }

    let module = lowerer::Lowerer::new().lower_program(&program);

    match codegen::emit_module(&module) {
        Ok(ir_text) => {
            let emitted = if matches!(options.emit_stage, Some(EmitStage::LlvmIr)) { Some(ir_text.clone()) } else { None };
            CompileOutcome { diagnostics: diags, llvm_ir: Some(ir_text), emitted }
        }
        Err(errors) => {
            for error in errors {
                diags.critical(file_display.as_str(), 0, 0, error.to_string(), diagnostics::Category::Codegen);
            }
            CompileOutcome { diagnostics: diags, llvm_ir: None, emitted: None }
        }
    }
}

fn compilation_root_of(input: &Path) -> PathBuf {
    input.parent().map(Path::to_path_buf).filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| PathBuf::from("."))
}

/// Runs the lexer to completion on its own, for `-s/--emit-tokens`, rather than driving
/// it through the parser's lookahead window.
fn dump_tokens(source: &str, diags: &mut DiagnosticSink, file: &str) -> String {
    let mut lexer = lexer::Lexer::new(source);
    let mut out = String::new();
    loop {
        let token = lexer.next_token(diags, file);
        let is_eof = token.is_eof();
        out.push_str(&format!("{:?} {:?} @{}:{}\n", token.kind, token.lexeme, token.position.line, token.position.column));
        if is_eof {
            break;
        }
    }
    out
}
