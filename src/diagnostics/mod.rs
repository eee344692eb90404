//! Diagnostics sink for adanc.
//!
//! Every other component of the compiler reports source-level problems through this
//! sink rather than failing outright, so that a single invocation can surface many
//! errors at once (spec: "one file, many errors"). The sink never aborts the build
//! itself; the driver inspects [`DiagnosticSink::error_count`] after each gated stage
//! to decide whether to continue.

use std::fmt::{self, Display};
use std::io::IsTerminal;

use colored::Colorize;

/// Severity of a single diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Which pipeline stage raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Lexer,
    Parser,
    Semantic,
    Codegen,
    Generic,
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Lexer => "lexer",
            Category::Parser => "parser",
            Category::Semantic => "semantic",
            Category::Codegen => "codegen",
            Category::Generic => "generic",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
    pub category: Category,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, self.severity, self.message
        )
    }
}

/// Grow-only append structure for diagnostics, plus the behaviour flags that decide
/// how a diagnostic is recorded.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    records: Vec<Diagnostic>,
    warnings_as_errors: bool,
    suppress_warnings: bool,
    verbose: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            warnings_as_errors: false,
            suppress_warnings: false,
            verbose: false,
        }
    }

    pub fn with_flags(warnings_as_errors: bool, suppress_warnings: bool, verbose: bool) -> Self {
        Self {
            records: Vec::new(),
            warnings_as_errors,
            suppress_warnings,
            verbose,
        }
    }

    pub fn set_warnings_as_errors(&mut self, value: bool) {
        self.warnings_as_errors = value;
    }

    pub fn set_suppress_warnings(&mut self, value: bool) {
        self.suppress_warnings = value;
    }

    pub fn set_verbose(&mut self, value: bool) {
        self.verbose = value;
    }

    pub fn push(
        &mut self,
        file: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
        severity: Severity,
        category: Category,
    ) {
        let mut severity = severity;

        if severity == Severity::Info && !self.verbose {
            return;
        }

        if severity == Severity::Warning {
            if self.warnings_as_errors {
                severity = Severity::Error;
            } else if self.suppress_warnings {
                return;
            }
        }

        self.records.push(Diagnostic {
            file: file.into(),
            line,
            column,
            message: message.into(),
            severity,
            category,
        });
    }

    pub fn info(&mut self, file: impl Into<String>, line: usize, column: usize, message: impl Into<String>, category: Category) {
        self.push(file, line, column, message, Severity::Info, category);
    }

    pub fn warning(&mut self, file: impl Into<String>, line: usize, column: usize, message: impl Into<String>, category: Category) {
        self.push(file, line, column, message, Severity::Warning, category);
    }

    pub fn error(&mut self, file: impl Into<String>, line: usize, column: usize, message: impl Into<String>, category: Category) {
        self.push(file, line, column, message, Severity::Error, category);
    }

    pub fn critical(&mut self, file: impl Into<String>, line: usize, column: usize, message: impl Into<String>, category: Category) {
        self.push(file, line, column, message, Severity::Critical, category);
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.records
            .iter()
            .filter(|d| matches!(d.severity, Severity::Error | Severity::Critical))
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.records
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_critical(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Critical)
    }

    /// Render every accumulated diagnostic to a single string, one per line, colorized
    /// when the given writer target is a TTY.
    pub fn render(&self, use_color: bool) -> String {
        let mut out = String::new();
        for record in &self.records {
            if use_color {
                let severity = match record.severity {
                    Severity::Info => record.severity.to_string().cyan(),
                    Severity::Warning => record.severity.to_string().yellow(),
                    Severity::Error => record.severity.to_string().red(),
                    Severity::Critical => record.severity.to_string().red().bold(),
                };
                out.push_str(&format!(
                    "{}:{}:{}: {}: {}\n",
                    record.file, record.line, record.column, severity, record.message
                ));
            } else {
                out.push_str(&record.to_string());
                out.push('\n');
            }
        }
        out
    }

    /// Print every diagnostic to stderr, colorizing if stderr is a terminal, then print
    /// the `errors=<n> warnings=<m>` summary line when verbose.
    pub fn flush_to_stderr(&self) {
        let use_color = std::io::stderr().is_terminal();
        eprint!("{}", self.render(use_color));
        if self.verbose {
            eprintln!("errors={} warnings={}", self.error_count(), self.warning_count());
        }
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_as_errors_promotes_severity() {
        let mut sink = DiagnosticSink::with_flags(true, false, false);
        sink.warning("main.adn", 1, 1, "unused variable 'x'", Category::Semantic);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 0);
    }

    #[test]
    fn suppress_warnings_drops_them() {
        let mut sink = DiagnosticSink::with_flags(false, true, false);
        sink.warning("main.adn", 1, 1, "unused variable 'x'", Category::Semantic);
        assert!(sink.is_empty());
    }

    #[test]
    fn info_requires_verbose() {
        let mut sink = DiagnosticSink::new();
        sink.info("main.adn", 1, 1, "compiling main.adn", Category::Generic);
        assert!(sink.is_empty());

        let mut sink = DiagnosticSink::with_flags(false, false, true);
        sink.info("main.adn", 1, 1, "compiling main.adn", Category::Generic);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn render_matches_path_line_column_format() {
        let mut sink = DiagnosticSink::new();
        sink.error("main.adn", 4, 9, "type mismatch", Category::Semantic);
        let rendered = sink.render(false);
        assert_eq!(rendered, "main.adn:4:9: error: type mismatch\n");
    }
}
