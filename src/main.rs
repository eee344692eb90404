//! adanc: the ahead-of-time compiler binary for the adan programming language.
//!
//! Combines the lexer, parser, semantic analyzer, lowerer and LLVM text emitter into a
//! single driver, wired the way `why`'s `src/bin/why/main.rs` wires the Y compiler.

mod cli;

use std::error::Error;
use std::fmt;
use std::fs;

use cli::Cli;
use log::{error, info, warn};

use adanc::{compile, CompileOptions};

#[derive(Debug)]
enum DriverError {
    Write { path: std::path::PathBuf, message: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Write { path, message } => {
                write!(f, "failed to write \"{}\": {message}", path.display())
            }
        }
    }
}

impl Error for DriverError {}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();

    let log_level = if args.verbose { log::Level::Debug } else { log::Level::Warn };
    simple_logger::init_with_level(log_level).ok();

    if args.run_tests {
        return run_self_tests(&args);
    }

    if args.optimization_level() > 0 {
        warn!("optimization level {} requested, but only trivial constant folding is implemented; behaving like -O0", args.optimization_level());
    }

    info!("compiling {}", args.input.display());

    let options = CompileOptions {
        input: args.input.clone(),
        output: args.output.clone(),
        include: args.include.clone(),
        warnings_as_errors: args.warnings_as_errors,
        suppress_warnings: args.suppress_warnings,
        verbose: args.verbose,
        emit_stage: args.emit_stage(),
    };

    let outcome = compile(&options);
    outcome.diagnostics.flush_to_stderr();

    if let Some(emitted) = &outcome.emitted {
        println!("{emitted}");
        if outcome.diagnostics.has_errors() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if outcome.diagnostics.has_errors() {
        error!("compilation of {} failed", args.input.display());
        std::process::exit(1);
    }

    let ir_text = outcome.llvm_ir.expect("no errors implies emitted LLVM IR");
    fs::write(&args.output, ir_text).map_err(|e| DriverError::Write { path: args.output.clone(), message: e.to_string() })?;

    info!("wrote {}", args.output.display());
    Ok(())
}

/// `-t/--tests`: run every fixture under `tests/fixtures/` through the full pipeline and
/// report which compiled cleanly, mirroring the original driver's self-test mode.
fn run_self_tests(args: &Cli) -> Result<(), Box<dyn Error>> {
    let fixtures_dir = std::path::Path::new("tests/fixtures");
    let mut total = 0;
    let mut passed = 0;

    if fixtures_dir.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(fixtures_dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("adn") {
                continue;
            }
            total += 1;

            let mut include = args.include.clone();
            include.push(std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")));

            let options = CompileOptions {
                input: path.clone(),
                output: std::path::PathBuf::from("a.out"),
                include,
                warnings_as_errors: false,
                suppress_warnings: false,
                verbose: args.verbose,
                emit_stage: Some(adanc::EmitStage::LlvmIr),
            };
            let outcome = compile(&options);
            if outcome.diagnostics.has_errors() {
                error!("FAIL {}", path.display());
                outcome.diagnostics.flush_to_stderr();
            } else {
                info!("PASS {}", path.display());
                passed += 1;
            }
        }
    }

    println!("{passed}/{total} fixtures compiled cleanly");
    if passed != total {
        std::process::exit(1);
    }
    Ok(())
}
