//! This module contains everything needed for parsing the CLI arguments for adanc.

use std::path::PathBuf;

use clap::Parser;

/// Struct containing the CLI configuration for adanc.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the adan source file to compile.
    #[arg(index = 1, default_value = "main.adn")]
    pub input: PathBuf,

    /// Path to write the emitted LLVM IR / object to.
    #[arg(short, long, default_value = "a.out")]
    pub output: PathBuf,

    /// Additional directories to search when resolving `adan/...` imports, consulted in
    /// the order given after `ADAN_PACKAGE_PATH`.
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Disable optimization (default).
    #[arg(long = "O0", group = "opt")]
    pub o0: bool,
    /// Request optimization level 1 (accepted, currently behaves like level 0).
    #[arg(long = "O1", group = "opt")]
    pub o1: bool,
    /// Request optimization level 2 (accepted, currently behaves like level 0).
    #[arg(long = "O2", group = "opt")]
    pub o2: bool,
    /// Request optimization level 3 (accepted, currently behaves like level 0).
    #[arg(long = "O3", group = "opt")]
    pub o3: bool,

    /// Stop after lexing and print the token stream.
    #[arg(short = 's', long = "emit-tokens", group = "emit")]
    pub emit_tokens: bool,
    /// Stop after parsing and print the AST.
    #[arg(short = 'a', long = "emit-ast", group = "emit")]
    pub emit_ast: bool,
    /// Stop after lowering and print the emitted LLVM IR without writing the output file.
    #[arg(short = 'e', long = "emit-ir", group = "emit")]
    pub emit_ir: bool,

    /// Treat warnings as errors.
    #[arg(short = 'w', long = "warnings-as-errors")]
    pub warnings_as_errors: bool,
    /// Suppress warnings entirely.
    #[arg(short = 'S', long = "suppress-warnings")]
    pub suppress_warnings: bool,

    /// Run the internal test fixtures through the full pipeline and report pass/fail.
    #[arg(short = 't', long = "tests")]
    pub run_tests: bool,

    /// Print informational diagnostics in addition to warnings and errors.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }

    pub fn optimization_level(&self) -> u8 {
        if self.o3 {
            3
        } else if self.o2 {
            2
        } else if self.o1 {
            1
        } else {
            0
        }
    }

    pub fn emit_stage(&self) -> Option<adanc::EmitStage> {
        if self.emit_tokens {
            Some(adanc::EmitStage::Tokens)
        } else if self.emit_ast {
            Some(adanc::EmitStage::Ast)
        } else if self.emit_ir {
            Some(adanc::EmitStage::LlvmIr)
        } else {
            None
        }
    }
}
