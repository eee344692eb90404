//! Semantic analysis: name resolution, type checking, and the diagnostics they produce
//! (spec §4.6).
//!
//! Runs as a second, independent pass over the already-built [`crate::ast::Program`].
//! The parser keeps its own symbol table purely to support within-grammar decisions
//! (e.g. distinguishing a call from a bare identifier); this module builds a fresh one
//! so that forward references between top-level declarations are fully resolved before
//! any body is checked.

pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::ast::*;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::lexer::Position;
use crate::loader::ImportResolver;
use crate::symtable::SymbolTableStack;
use types::Type;

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub position: Position,
}

/// Functions the runtime provides without an explicit `import`, matching the handful of
/// libc-backed calls the original backend wires directly into every translation unit.
/// Built once per process: every [`SemanticAnalyzer`] and every lowerer clones this
/// table rather than re-populating it from scratch.
static BUILTIN_SIGNATURES: Lazy<HashMap<String, FunctionSignature>> = Lazy::new(|| {
    let origin = Position::start();
    let mut out = HashMap::new();
    let mut add = |name: &str, params: Vec<Type>, return_type: Type| {
        out.insert(
            name.to_string(),
            FunctionSignature { name: name.to_string(), params, return_type, position: origin },
        );
    };
    add("println", vec![Type::String], Type::Void);
    add("print", vec![Type::String], Type::Void);
    add("read_line", vec![], Type::String);
    out
});

pub(crate) fn builtin_signatures() -> HashMap<String, FunctionSignature> {
    BUILTIN_SIGNATURES.clone()
}

/// `to_string` is intrinsic-polymorphic: it accepts exactly one argument of any type and
/// always returns `string`. Modelled outside the signature table since [`FunctionSignature`]
/// has no notion of generics.
const POLYMORPHIC_TO_STRING: &str = "to_string";

pub struct SemanticAnalyzer<'a> {
    diags: &'a mut DiagnosticSink,
    file: String,
    functions: HashMap<String, FunctionSignature>,
    structs: HashMap<String, StructDecl>,
    symtab: SymbolTableStack,
    resolver: ImportResolver,
    imported: Vec<String>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(file: impl Into<String>, diags: &'a mut DiagnosticSink, resolver: ImportResolver) -> Self {
        Self {
            diags,
            file: file.into(),
            functions: builtin_signatures(),
            structs: HashMap::new(),
            symtab: SymbolTableStack::new(),
            resolver,
            imported: Vec::new(),
        }
    }

    /// Run the full analysis, mutating diagnostics as it finds problems. Returns nothing:
    /// callers consult `diags.has_errors()` afterwards, same as every other stage.
    pub fn analyze(&mut self, program: &Program) {
        for decl in &program.declarations {
            if let TopLevel::Import(import) = decl {
                self.load_import(import);
            }
        }

        self.collect_signatures(program);

        for decl in &program.declarations {
            match decl {
                TopLevel::Function(f) => self.check_function(f),
                TopLevel::Variable(v) => {
                    let _ = self.check_variable_decl(v);
                }
                TopLevel::Import(_) | TopLevel::Struct(_) => {}
            }
        }
    }

    fn load_import(&mut self, import: &ImportDecl) {
        let normalized = ImportResolver::normalize(&import.path);
        if self.imported.contains(&normalized) {
            return; // import idempotence (spec §8)
        }

        match self.resolver.resolve(&import.path) {
            Ok(resolved) => {
                if self.resolver.already_resolved(&resolved) && self.imported.contains(&normalized) {
                    return;
                }
                match std::fs::read_to_string(&resolved) {
                    Ok(source) => {
                        let mut sub_diags = DiagnosticSink::new();
                        let display_name = resolved.display().to_string();
                        let mut parser = crate::parser::Parser::new(&source, display_name, &mut sub_diags);
                        parser.allow_undefined_symbols = true;
                        let sub_program = parser.parse_program();
                        self.collect_signatures(&sub_program);
                        self.imported.push(normalized);
                    }
                    Err(e) => {
                        self.diags.error(
                            self.file.as_str(),
                            import.position.line,
                            import.position.column,
                            format!("failed to read import \"{}\": {e}", import.path),
                            Category::Semantic,
                        );
                    }
                }
            }
            Err(e) => {
                self.diags.error(
                    self.file.as_str(),
                    import.position.line,
                    import.position.column,
                    e.to_string(),
                    Category::Semantic,
                );
            }
        }
    }

    fn collect_signatures(&mut self, program: &Program) {
        for decl in &program.declarations {
            match decl {
                TopLevel::Function(f) => {
                    let params = f.params.iter().map(|p| self.resolve_type_node(&p.type_node)).collect();
                    let return_type = self.resolve_type_node(&f.return_type);
                    self.functions.insert(
                        f.name.clone(),
                        FunctionSignature { name: f.name.clone(), params, return_type, position: f.position },
                    );
                }
                TopLevel::Struct(s) => {
                    self.structs.insert(s.name.clone(), s.clone());
                }
                TopLevel::Variable(v) => {
                    let ty = self.resolve_type_node(&v.type_node);
                    let _ = self.symtab.declare(&v.name, ty, v.position);
                }
                TopLevel::Import(_) => {}
            }
        }
    }

    fn resolve_type_node(&mut self, node: &TypeNode) -> Type {
        match node {
            TypeNode::Named(name, position) => match Type::from_name(name) {
                Some(ty) => ty,
                None => {
                    if self.structs.contains_key(name) {
                        // struct values are handled as opaque pointers at this layer
                        Type::Pointer(Box::new(Type::Unknown))
                    } else {
                        self.diags.error(
                            self.file.as_str(),
                            position.line,
                            position.column,
                            format!("unknown type '{name}'"),
                            Category::Semantic,
                        );
                        Type::Unknown
                    }
                }
            },
            TypeNode::Array(inner, _) => Type::Array(Box::new(self.resolve_type_node(inner))),
        }
    }

    fn check_function(&mut self, f: &FunctionDecl) {
        let params: Vec<Type> = f.params.iter().map(|p| self.resolve_type_node(&p.type_node)).collect();
        let return_type = self.resolve_type_node(&f.return_type);

        self.symtab.push_scope();
        self.symtab.set_expected_return_type(Some(return_type.clone()));
        for (param, ty) in f.params.iter().zip(&params) {
            let _ = self.symtab.declare(&param.name, ty.clone(), param.position);
        }

        self.check_block(&f.body);

        if return_type != Type::Void && !all_paths_return(&f.body) {
            self.diags.error(
                self.file.as_str(),
                f.position.line,
                f.position.column,
                format!("function '{}' does not return a value on all paths", f.name),
                Category::Semantic,
            );
        }

        // Not `warn_unused_locals()` here: this scope holds the function's parameters,
        // and unused-parameter is not a diagnosed case (spec §4.6.6, "declared locals"
        // only). `check_block` already warned on the body's own locals.
        self.symtab.pop_scope();
    }

    fn warn_unused_locals(&mut self) {
        let unused: Vec<(String, Position)> = self
            .symtab
            .local_entries()
            .filter(|e| e.usage_count == 0)
            .map(|e| (e.name.clone(), e.declared_at))
            .collect();
        for (name, position) in unused {
            self.diags.warning(
                self.file.as_str(),
                position.line,
                position.column,
                format!("unused variable '{name}'"),
                Category::Semantic,
            );
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.symtab.push_scope();
        for stmt in &block.statements {
            self.check_statement(stmt);
        }
        self.warn_unused_locals();
        self.symtab.pop_scope();
    }

    fn check_variable_decl(&mut self, v: &VariableDecl) -> Type {
        let declared = self.resolve_type_node(&v.type_node);
        if let Some(init) = &v.initializer {
            let actual = self.check_expr(init);
            if actual != Type::Unknown && declared != Type::Unknown && !actual.compatible_with(&declared) {
                self.diags.error(
                    self.file.as_str(),
                    init.position.line,
                    init.position.column,
                    format!("type mismatch: cannot initialize '{}' of type {declared} with value of type {actual}", v.name),
                    Category::Semantic,
                );
            }
        }
        if self.symtab.declare(&v.name, declared.clone(), v.position).is_err() {
            self.diags.error(
                self.file.as_str(),
                v.position.line,
                v.position.column,
                format!("'{}' is already declared in this scope", v.name),
                Category::Semantic,
            );
        }
        declared
    }

    fn check_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VariableDecl(v) => {
                let _ = self.check_variable_decl(v);
            }
            Statement::Return { value, position } => {
                let expected = self.symtab.current_expected_return_type().unwrap_or(Type::Void);
                match value {
                    Some(expr) => {
                        let actual = self.check_expr(expr);
                        if expected == Type::Void {
                            self.diags.error(
                                self.file.as_str(),
                                position.line,
                                position.column,
                                "cannot return a value from a void function",
                                Category::Semantic,
                            );
                        } else if actual != Type::Unknown && !actual.compatible_with(&expected) {
                            self.diags.error(
                                self.file.as_str(),
                                position.line,
                                position.column,
                                format!("type mismatch: expected return type {expected}, found {actual}"),
                                Category::Semantic,
                            );
                        }
                    }
                    None => {
                        if expected != Type::Void {
                            self.diags.error(
                                self.file.as_str(),
                                position.line,
                                position.column,
                                format!("expected a return value of type {expected}"),
                                Category::Semantic,
                            );
                        }
                    }
                }
            }
            Statement::If { condition, then_branch, else_branch, .. } => {
                self.expect_bool(condition);
                self.check_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }
            Statement::While { condition, body, .. } => {
                self.expect_bool(condition);
                self.symtab.enter_loop();
                self.check_block(body);
                self.symtab.exit_loop();
            }
            Statement::For { init, condition, step, body, .. } => {
                self.symtab.push_scope();
                if let Some(init) = init {
                    self.check_statement(init);
                }
                if let Some(condition) = condition {
                    self.expect_bool(condition);
                }
                if let Some(step) = step {
                    self.check_statement(step);
                }
                self.symtab.enter_loop();
                self.check_block(body);
                self.symtab.exit_loop();
                self.symtab.pop_scope();
            }
            Statement::Break(position) | Statement::Continue(position) => {
                if self.symtab.loop_depth() == 0 {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        "'break'/'continue' used outside of a loop",
                        Category::Semantic,
                    );
                }
            }
            Statement::Assignment { target, value, position } => {
                let target_ty = self.check_expr(target);
                let value_ty = self.check_expr(value);
                if !matches!(target.kind, ExprKind::Identifier(_) | ExprKind::ArrayAccess { .. }) {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        "left-hand side of assignment must be a variable or array element",
                        Category::Semantic,
                    );
                } else if target_ty != Type::Unknown && value_ty != Type::Unknown && !value_ty.compatible_with(&target_ty) {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        format!("type mismatch: cannot assign value of type {value_ty} to target of type {target_ty}"),
                        Category::Semantic,
                    );
                }
            }
            Statement::Expression(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn expect_bool(&mut self, expr: &Expr) {
        let ty = self.check_expr(expr);
        if ty != Type::Unknown && ty != Type::Bool {
            self.diags.error(
                self.file.as_str(),
                expr.position.line,
                expr.position.column,
                format!("expected a bool condition, found {ty}"),
                Category::Semantic,
            );
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLiteral(_) => Type::Int,
            ExprKind::FloatLiteral(_) => Type::Float,
            ExprKind::StringLiteral(_) => Type::String,
            ExprKind::BoolLiteral(_) => Type::Bool,
            ExprKind::NullLiteral => Type::Null,
            ExprKind::Grouping(inner) => self.check_expr(inner),
            ExprKind::Identifier(name) => self.check_identifier(name, expr.position),
            ExprKind::ArrayLiteral(elements) => self.check_array_literal(elements, expr.position),
            ExprKind::ArrayAccess { array, index } => self.check_array_access(array, index, expr.position),
            ExprKind::Call { callee, args } => self.check_call(callee, args, expr.position),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, expr.position),
            ExprKind::Comparison { lhs, rhs, .. } => self.check_comparison(lhs, rhs, expr.position),
            ExprKind::Logical { lhs, rhs, .. } => {
                self.expect_bool(lhs);
                self.expect_bool(rhs);
                Type::Bool
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expr.position),
            ExprKind::IncDec { target, .. } => {
                let ty = self.check_expr(target);
                if ty != Type::Unknown && !ty.is_numeric() {
                    self.diags.error(
                        self.file.as_str(),
                        expr.position.line,
                        expr.position.column,
                        format!("'++'/'--' requires a numeric operand, found {ty}"),
                        Category::Semantic,
                    );
                }
                ty
            }
            ExprKind::Cast { target_type, operand } => {
                self.check_expr(operand);
                self.resolve_type_node(target_type)
            }
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                self.expect_bool(condition);
                let then_ty = self.check_expr(then_expr);
                let else_ty = self.check_expr(else_expr);
                if then_ty != Type::Unknown && else_ty != Type::Unknown && then_ty != else_ty {
                    self.diags.error(
                        self.file.as_str(),
                        expr.position.line,
                        expr.position.column,
                        format!("ternary branches have mismatched types {then_ty} and {else_ty}"),
                        Category::Semantic,
                    );
                }
                then_ty
            }
        }
    }

    fn check_identifier(&mut self, name: &str, position: Position) -> Type {
        self.symtab.mark_used(name);
        match self.symtab.lookup(name) {
            Some(entry) => entry.ty.clone(),
            None => {
                self.diags.error(
                    self.file.as_str(),
                    position.line,
                    position.column,
                    format!("use of undeclared identifier '{name}'"),
                    Category::Semantic,
                );
                Type::Unknown
            }
        }
    }

    fn check_array_literal(&mut self, elements: &[Expr], position: Position) -> Type {
        if elements.is_empty() {
            return Type::Array(Box::new(Type::Unknown));
        }
        let first = self.check_expr(&elements[0]);
        for elem in &elements[1..] {
            let ty = self.check_expr(elem);
            if ty != Type::Unknown && first != Type::Unknown && ty != first {
                self.diags.error(
                    self.file.as_str(),
                    position.line,
                    position.column,
                    format!("array literal mixes element types {first} and {ty}"),
                    Category::Semantic,
                );
            }
        }
        Type::Array(Box::new(first))
    }

    fn check_array_access(&mut self, array: &Expr, index: &Expr, position: Position) -> Type {
        let array_ty = self.check_expr(array);
        let index_ty = self.check_expr(index);
        if index_ty != Type::Unknown && index_ty != Type::Int {
            self.diags.error(
                self.file.as_str(),
                position.line,
                position.column,
                format!("array index must be int, found {index_ty}"),
                Category::Semantic,
            );
        }
        match array_ty {
            Type::Array(elem) => *elem,
            Type::Unknown => Type::Unknown,
            other => {
                self.diags.error(
                    self.file.as_str(),
                    position.line,
                    position.column,
                    format!("cannot index into a value of type {other}"),
                    Category::Semantic,
                );
                Type::Unknown
            }
        }
    }

    fn check_call(&mut self, callee: &str, args: &[Expr], position: Position) -> Type {
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();

        if callee == POLYMORPHIC_TO_STRING {
            if arg_types.len() != 1 {
                self.diags.error(
                    self.file.as_str(),
                    position.line,
                    position.column,
                    format!("'to_string' expects 1 argument, found {}", arg_types.len()),
                    Category::Semantic,
                );
            }
            return Type::String;
        }

        let signature = match self.functions.get(callee) {
            Some(sig) => sig.clone(),
            None => {
                self.diags.error(
                    self.file.as_str(),
                    position.line,
                    position.column,
                    format!("call to undeclared function '{callee}'"),
                    Category::Semantic,
                );
                return Type::Unknown;
            }
        };

        if arg_types.len() != signature.params.len() {
            self.diags.error(
                self.file.as_str(),
                position.line,
                position.column,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    callee,
                    signature.params.len(),
                    arg_types.len()
                ),
                Category::Semantic,
            );
        } else {
            for (i, (actual, expected)) in arg_types.iter().zip(&signature.params).enumerate() {
                if *actual != Type::Unknown && !actual.compatible_with(expected) {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        format!("type mismatch: argument {} to '{}' expected {}, found {}", i + 1, callee, expected, actual),
                        Category::Semantic,
                    );
                }
            }
        }

        signature.return_type
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, position: Position) -> Type {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);

        if op == BinaryOp::Add && lhs_ty == Type::String && rhs_ty == Type::String {
            return Type::String;
        }

        if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
            return if lhs_ty == Type::Float || rhs_ty == Type::Float { Type::Float } else { Type::Int };
        }

        if lhs_ty == Type::Unknown || rhs_ty == Type::Unknown {
            return Type::Unknown;
        }

        self.diags.error(
            self.file.as_str(),
            position.line,
            position.column,
            format!("operator requires numeric operands, found {lhs_ty} and {rhs_ty}"),
            Category::Semantic,
        );
        Type::Unknown
    }

    fn check_comparison(&mut self, lhs: &Expr, rhs: &Expr, position: Position) -> Type {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);
        if lhs_ty != Type::Unknown && rhs_ty != Type::Unknown && lhs_ty != rhs_ty {
            self.diags.error(
                self.file.as_str(),
                position.line,
                position.column,
                format!("cannot compare {lhs_ty} with {rhs_ty}"),
                Category::Semantic,
            );
        }
        Type::Bool
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, position: Position) -> Type {
        let ty = self.check_expr(operand);
        match op {
            UnaryOp::Neg => {
                if ty != Type::Unknown && !ty.is_numeric() {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        format!("unary '-' requires a numeric operand, found {ty}"),
                        Category::Semantic,
                    );
                }
                ty
            }
            UnaryOp::Not => {
                if ty != Type::Unknown && ty != Type::Bool {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        format!("unary '!' requires a bool operand, found {ty}"),
                        Category::Semantic,
                    );
                }
                Type::Bool
            }
            UnaryOp::BitNot => {
                if ty != Type::Unknown && ty != Type::Int {
                    self.diags.error(
                        self.file.as_str(),
                        position.line,
                        position.column,
                        format!("unary '~' requires an int operand, found {ty}"),
                        Category::Semantic,
                    );
                }
                Type::Int
            }
        }
    }
}

/// Whether every control-flow path through `block` ends in a `return` (used to detect
/// the "missing return" diagnostic for non-void functions, spec §4.6).
fn all_paths_return(block: &Block) -> bool {
    block.statements.iter().any(statement_always_returns)
}

fn statement_always_returns(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return { .. } => true,
        Statement::If { then_branch, else_branch, .. } => match else_branch {
            Some(else_branch) => all_paths_return(then_branch) && all_paths_return(else_branch),
            None => false,
        },
        Statement::While { .. } | Statement::For { .. } => false,
        _ => false,
    }
}

/// Resolve the default search-path/compilation-root setup for a standalone file being
/// analyzed (used by [`crate::main`] to wire a resolver before constructing the analyzer).
pub fn resolver_for(compilation_root: PathBuf, include: Vec<PathBuf>) -> ImportResolver {
    ImportResolver::new(compilation_root, include)
}

/// A context-free re-derivation of a [`TypeNode`]'s [`Type`], used by [`crate::lowerer`]
/// which walks an already-checked AST and does not need to re-emit diagnostics for
/// unresolvable names (semantic analysis already rejected those before lowering runs).
pub(crate) fn static_type_of(node: &TypeNode) -> Type {
    match node {
        TypeNode::Named(name, _) => Type::from_name(name).unwrap_or(Type::Pointer(Box::new(Type::Unknown))),
        TypeNode::Array(inner, _) => Type::Array(Box::new(static_type_of(inner))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze(src: &str) -> DiagnosticSink {
        let mut diags = DiagnosticSink::new();
        let program = {
            let parser = Parser::new(src, "main.adn", &mut diags);
            parser.parse_program()
        };
        let resolver = ImportResolver::new(PathBuf::from("."), vec![]);
        let mut analyzer = SemanticAnalyzer::new("main.adn", &mut diags, resolver);
        analyzer.analyze(&program);
        diags
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let diags = analyze("fun main(): void { return y; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn missing_return_on_non_void_function_is_an_error() {
        let diags = analyze("fun f(): i64 { set x: i64 = 1; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn well_typed_function_has_no_errors() {
        let diags = analyze("fun f(a: i64, b: i64): i64 { return a + b; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn unused_variable_is_a_warning_not_an_error() {
        let diags = analyze("fun f(): void { set x: i64 = 1; return; }");
        assert!(!diags.has_errors());
        assert_eq!(diags.warning_count(), 1);
    }

    #[test]
    fn null_assignable_to_string_variable() {
        let diags = analyze("fun f(): void { set s: string = null; return; }");
        assert!(!diags.has_errors());
    }
}
