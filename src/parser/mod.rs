//! Recursive-descent parser with two-token lookahead and panic-mode recovery
//! (spec §4.5).

use crate::ast::*;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::lexer::{Keyword, Lexer, Literal, Operator, Position, Punct, PrimitiveType, Token, TokenKind};
use crate::symtable::SymbolTableStack;
use crate::typechecker::types::Type;

/// Tokens that resynchronize the parser after a syntax error (spec §4.5).
fn is_sync_token(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Keyword(Keyword::Fun)
            | TokenKind::Keyword(Keyword::Import)
            | TokenKind::Keyword(Keyword::Set)
            | TokenKind::Keyword(Keyword::Return)
            | TokenKind::Punct(Punct::RBrace)
            | TokenKind::Punct(Punct::Semicolon)
            | TokenKind::Eof
    )
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    diags: &'a mut DiagnosticSink,
    file: String,
    window: [Token; 3],
    panic_mode: bool,
    pub symtab: SymbolTableStack,
    /// Set by the semantic analyzer when re-parsing an imported library's source: its
    /// surface is not fully resolvable in isolation, so references to not-yet-declared
    /// names should not be treated as a parse-time problem.
    pub allow_undefined_symbols: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file: impl Into<String>, diags: &'a mut DiagnosticSink) -> Self {
        let file = file.into();
        let mut lexer = Lexer::new(source);
        let t0 = lexer.next_token(diags, &file);
        let t1 = lexer.next_token(diags, &file);
        let t2 = lexer.next_token(diags, &file);
        Self {
            lexer,
            diags,
            file,
            window: [t0, t1, t2],
            panic_mode: false,
            symtab: SymbolTableStack::new(),
            allow_undefined_symbols: false,
        }
    }

    fn cur(&self) -> &Token {
        &self.window[0]
    }

    fn la1(&self) -> &Token {
        &self.window[1]
    }

    fn la2(&self) -> &Token {
        &self.window[2]
    }

    fn bump(&mut self) -> Token {
        let next = self.lexer.next_token(self.diags, &self.file);
        let la1 = self.window[1].clone();
        let la2 = self.window[2].clone();
        let taken = std::mem::replace(&mut self.window[0], la1);
        self.window[1] = la2;
        self.window[2] = next;
        taken
    }

    fn record_use(&mut self, name: &str) {
        self.symtab.mark_used(name);
    }

    fn error_at(&mut self, position: Position, message: impl Into<String>) {
        let message = message.into();
        if !self.panic_mode {
            self.diags
                .error(self.file.as_str(), position.line, position.column, message, Category::Parser);
        }
        self.panic_mode = true;
    }

    /// Skip tokens until a synchronization point, per spec §4.5.
    fn synchronize(&mut self) {
        while !is_sync_token(&self.cur().kind) {
            self.bump();
        }
        // a trailing `;` or `}` is itself consumed as the resync point
        if matches!(self.cur().kind, TokenKind::Punct(Punct::Semicolon) | TokenKind::Punct(Punct::RBrace)) {
            self.bump();
        }
        self.panic_mode = false;
    }

    fn expect_punct(&mut self, punct: Punct, context: &str) -> bool {
        if self.cur().kind == TokenKind::Punct(punct) {
            self.bump();
            true
        } else {
            let pos = self.cur().position;
            self.error_at(pos, format!("expected '{context}'"));
            false
        }
    }

    // ----- program -----

    pub fn parse_program(mut self) -> Program {
        let mut declarations = Vec::new();
        while self.cur().kind != TokenKind::Eof {
            match self.parse_top_decl() {
                Some(decl) => declarations.push(decl),
                None => {
                    if self.panic_mode {
                        self.synchronize();
                    } else {
                        // unrecognized top-level token: report and skip it
                        let pos = self.cur().position;
                        self.error_at(pos, format!("unexpected token '{}'", self.cur().lexeme));
                        self.synchronize();
                    }
                }
            }
        }
        Program { declarations }
    }

    fn parse_top_decl(&mut self) -> Option<TopLevel> {
        match &self.cur().kind {
            TokenKind::Keyword(Keyword::Fun) | TokenKind::Keyword(Keyword::Program) => {
                self.parse_func_decl().map(TopLevel::Function)
            }
            TokenKind::Keyword(Keyword::Set) | TokenKind::Keyword(Keyword::Const) => {
                self.parse_var_decl().map(TopLevel::Variable)
            }
            TokenKind::Keyword(Keyword::Import) => self.parse_import().map(TopLevel::Import),
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_decl().map(TopLevel::Struct),
            _ => None,
        }
    }

    fn parse_func_decl(&mut self) -> Option<FunctionDecl> {
        let position = self.cur().position;
        self.bump(); // fun/program

        let name = self.expect_identifier("function name")?;
        self.symtab.declare(&name, Type::Unknown, position).ok();

        self.expect_punct(Punct::LParen, "(");
        let mut params = Vec::new();
        if self.cur().kind != TokenKind::Punct(Punct::RParen) {
            loop {
                params.push(self.parse_param()?);
                if self.cur().kind == TokenKind::Punct(Punct::Comma) {
                    self.bump();
                    if self.cur().kind == TokenKind::Punct(Punct::RParen) {
                        let pos = self.cur().position;
                        self.error_at(pos, "trailing comma in parameter list");
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, ")");
        self.expect_punct(Punct::Colon, ":");
        let return_type = self.parse_type()?;

        self.symtab.push_scope();
        self.symtab
            .set_expected_return_type(Some(Type::from_name_or_unknown(&type_name(&return_type))));
        for p in &params {
            self.symtab
                .declare(&p.name, Type::from_name(&type_name(&p.type_node)).unwrap_or(Type::Unknown), p.position)
                .ok();
        }
        let body = self.parse_block()?;
        self.symtab.pop_scope();

        Some(FunctionDecl {
            name,
            params,
            return_type,
            body,
            position,
        })
    }

    fn parse_param(&mut self) -> Option<Param> {
        let position = self.cur().position;
        let name = self.expect_identifier("parameter name")?;
        self.expect_punct(Punct::Colon, ":");
        let type_node = self.parse_type()?;
        Some(Param { name, type_node, position })
    }

    fn parse_var_decl(&mut self) -> Option<VariableDecl> {
        let position = self.cur().position;
        self.bump(); // set/const
        let name = self.expect_identifier("variable name")?;
        self.expect_punct(Punct::Colon, ":");
        let type_node = self.parse_type()?;

        let initializer = if self.cur().kind == TokenKind::Operator(Operator::Assign) {
            self.bump();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect_punct(Punct::Semicolon, ";");

        self.symtab
            .declare(&name, Type::from_name(&type_name(&type_node)).unwrap_or(Type::Unknown), position)
            .ok();

        Some(VariableDecl {
            name,
            type_node,
            initializer,
            position,
        })
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let position = self.cur().position;
        self.bump(); // import
        let path = match &self.cur().kind {
            TokenKind::Literal(Literal::Str(s)) => s.clone(),
            _ => {
                let pos = self.cur().position;
                self.error_at(pos, "expected a string literal import path");
                return None;
            }
        };
        self.bump();
        self.expect_punct(Punct::Semicolon, ";");
        Some(ImportDecl { path, position })
    }

    fn parse_struct_decl(&mut self) -> Option<StructDecl> {
        let position = self.cur().position;
        self.bump(); // struct
        let name = self.expect_identifier("struct name")?;
        self.expect_punct(Punct::LBrace, "{");
        let mut fields = Vec::new();
        while self.cur().kind != TokenKind::Punct(Punct::RBrace) && self.cur().kind != TokenKind::Eof {
            fields.push(self.parse_param()?);
            if self.cur().kind == TokenKind::Punct(Punct::Semicolon) || self.cur().kind == TokenKind::Punct(Punct::Comma) {
                self.bump();
            }
        }
        self.expect_punct(Punct::RBrace, "}");
        Some(StructDecl { name, fields, position })
    }

    // ----- types -----

    fn parse_type(&mut self) -> Option<TypeNode> {
        let position = self.cur().position;
        if self.cur().kind == TokenKind::Punct(Punct::LBracket) {
            self.bump();
            let inner = self.parse_type()?;
            self.expect_punct(Punct::RBracket, "]");
            return Some(TypeNode::Array(Box::new(inner), position));
        }

        match self.cur().kind.clone() {
            TokenKind::Type(ty) => {
                self.bump();
                Some(TypeNode::Named(primitive_name(ty).to_string(), position))
            }
            TokenKind::Identifier(name) => {
                self.bump();
                Some(TypeNode::Named(name, position))
            }
            _ => {
                self.error_at(position, "expected a type");
                None
            }
        }
    }

    // ----- statements -----

    fn parse_block(&mut self) -> Option<Block> {
        let position = self.cur().position;
        self.expect_punct(Punct::LBrace, "{");
        let mut statements = Vec::new();
        while self.cur().kind != TokenKind::Punct(Punct::RBrace) && self.cur().kind != TokenKind::Eof {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => {
                    if self.panic_mode {
                        self.synchronize();
                    } else {
                        self.bump();
                    }
                }
            }
        }
        self.expect_punct(Punct::RBrace, "}");
        Some(Block { statements, position })
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match &self.cur().kind {
            TokenKind::Keyword(Keyword::Set) | TokenKind::Keyword(Keyword::Const) => {
                self.parse_var_decl().map(Statement::VariableDecl)
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return_stmt(),
            TokenKind::Keyword(Keyword::If) => self.parse_if_stmt(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_stmt(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_stmt(),
            TokenKind::Keyword(Keyword::Break) => {
                let position = self.cur().position;
                self.bump();
                self.expect_punct(Punct::Semicolon, ";");
                Some(Statement::Break(position))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let position = self.cur().position;
                self.bump();
                self.expect_punct(Punct::Semicolon, ";");
                Some(Statement::Continue(position))
            }
            _ => self.parse_expr_or_assignment_stmt(),
        }
    }

    fn parse_return_stmt(&mut self) -> Option<Statement> {
        let position = self.cur().position;
        self.bump();
        let value = if self.cur().kind == TokenKind::Punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::Semicolon, ";");
        Some(Statement::Return { value, position })
    }

    fn parse_if_stmt(&mut self) -> Option<Statement> {
        let position = self.cur().position;
        self.bump();
        self.expect_punct(Punct::LParen, "(");
        let condition = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")");
        let then_branch = self.parse_block()?;
        let else_branch = if self.cur().kind == TokenKind::Keyword(Keyword::Else) {
            self.bump();
            if self.cur().kind == TokenKind::Keyword(Keyword::If) {
                // desugar `else if` into a single-statement block
                let nested = self.parse_if_stmt()?;
                Some(Block {
                    statements: vec![nested],
                    position,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Some(Statement::If {
            condition,
            then_branch,
            else_branch,
            position,
        })
    }

    fn parse_while_stmt(&mut self) -> Option<Statement> {
        let position = self.cur().position;
        self.bump();
        self.expect_punct(Punct::LParen, "(");
        let condition = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")");
        self.symtab.enter_loop();
        let body = self.parse_block()?;
        self.symtab.exit_loop();
        Some(Statement::While { condition, body, position })
    }

    fn parse_for_stmt(&mut self) -> Option<Statement> {
        let position = self.cur().position;
        self.bump();
        self.expect_punct(Punct::LParen, "(");

        self.symtab.push_scope();

        let init = if self.cur().kind == TokenKind::Punct(Punct::Semicolon) {
            self.bump();
            None
        } else {
            let stmt = self.parse_init_clause()?;
            Some(Box::new(stmt))
        };

        let condition = if self.cur().kind == TokenKind::Punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::Semicolon, ";");

        let step = if self.cur().kind == TokenKind::Punct(Punct::RParen) {
            None
        } else {
            let stmt = self.parse_bare_statement()?;
            Some(Box::new(stmt))
        };
        self.expect_punct(Punct::RParen, ")");

        self.symtab.enter_loop();
        let body = self.parse_block()?;
        self.symtab.exit_loop();
        self.symtab.pop_scope();

        Some(Statement::For {
            init,
            condition,
            step,
            body,
            position,
        })
    }

    /// A `for`-init clause: either a `set` declaration or a bare assignment/expression,
    /// terminated by `;`.
    fn parse_init_clause(&mut self) -> Option<Statement> {
        let stmt = self.parse_bare_statement()?;
        self.expect_punct(Punct::Semicolon, ";");
        Some(stmt)
    }

    /// A statement without its own terminating `;` consumption, used inside `for(...)`.
    fn parse_bare_statement(&mut self) -> Option<Statement> {
        if matches!(self.cur().kind, TokenKind::Keyword(Keyword::Set) | TokenKind::Keyword(Keyword::Const)) {
            let position = self.cur().position;
            self.bump();
            let name = self.expect_identifier("variable name")?;
            self.expect_punct(Punct::Colon, ":");
            let type_node = self.parse_type()?;
            let initializer = if self.cur().kind == TokenKind::Operator(Operator::Assign) {
                self.bump();
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.symtab
                .declare(&name, Type::from_name(&type_name(&type_node)).unwrap_or(Type::Unknown), position)
                .ok();
            return Some(Statement::VariableDecl(VariableDecl {
                name,
                type_node,
                initializer,
                position,
            }));
        }

        let position = self.cur().position;
        let expr = self.parse_expression()?;
        if let Some(op) = self.peek_assign_op() {
            self.bump();
            let value = self.parse_expression()?;
            let value = desugar_compound_assign(op, expr.clone(), value);
            return Some(Statement::Assignment { target: expr, value, position });
        }
        Some(Statement::Expression(expr))
    }

    fn parse_expr_or_assignment_stmt(&mut self) -> Option<Statement> {
        let position = self.cur().position;
        let expr = self.parse_expression()?;

        if let Some(op) = self.peek_assign_op() {
            self.bump();
            let value = self.parse_expression()?;
            self.expect_punct(Punct::Semicolon, ";");
            let value = desugar_compound_assign(op, expr.clone(), value);
            return Some(Statement::Assignment { target: expr, value, position });
        }

        self.expect_punct(Punct::Semicolon, ";");
        Some(Statement::Expression(expr))
    }

    fn peek_assign_op(&self) -> Option<Option<BinaryOp>> {
        match self.cur().kind {
            TokenKind::Operator(Operator::Assign) => Some(None),
            TokenKind::Operator(Operator::PlusAssign) => Some(Some(BinaryOp::Add)),
            TokenKind::Operator(Operator::MinusAssign) => Some(Some(BinaryOp::Sub)),
            TokenKind::Operator(Operator::StarAssign) => Some(Some(BinaryOp::Mul)),
            TokenKind::Operator(Operator::SlashAssign) => Some(Some(BinaryOp::Div)),
            TokenKind::Operator(Operator::PercentAssign) => Some(Some(BinaryOp::Rem)),
            _ => None,
        }
    }

    // ----- expressions (precedence climbing) -----

    fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Option<Expr> {
        let position = self.cur().position;
        let condition = self.parse_logical_or()?;
        if self.cur_is_question() {
            self.bump();
            let then_expr = self.parse_expression()?;
            self.expect_colon();
            let else_expr = self.parse_expression()?;
            return Some(Expr::new(
                ExprKind::Ternary {
                    condition: Box::new(condition),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                position,
            ));
        }
        Some(condition)
    }

    fn cur_is_question(&self) -> bool {
        self.cur().kind == TokenKind::Punct(Punct::Question)
    }

    fn expect_colon(&mut self) {
        self.expect_punct(Punct::Colon, ":");
    }

    fn parse_logical_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.cur().kind == TokenKind::Operator(Operator::OrOr) {
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::new(
                ExprKind::Logical { op: LogicalOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                position,
            );
        }
        Some(lhs)
    }

    fn parse_logical_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.cur().kind == TokenKind::Operator(Operator::AndAnd) {
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::new(
                ExprKind::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                position,
            );
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Operator(Operator::Eq) => CompareOp::Eq,
                TokenKind::Operator(Operator::NotEq) => CompareOp::NotEq,
                _ => break,
            };
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::new(ExprKind::Comparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, position);
        }
        Some(lhs)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Operator(Operator::Lt) => CompareOp::Lt,
                TokenKind::Operator(Operator::LtEq) => CompareOp::LtEq,
                TokenKind::Operator(Operator::Gt) => CompareOp::Gt,
                TokenKind::Operator(Operator::GtEq) => CompareOp::GtEq,
                _ => break,
            };
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::new(ExprKind::Comparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, position);
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, position);
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Rem,
                _ => break,
            };
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_power()?;
            lhs = Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, position);
        }
        Some(lhs)
    }

    /// `**` is right-associative, unlike every other binary operator (spec §4.5).
    fn parse_power(&mut self) -> Option<Expr> {
        let lhs = self.parse_unary()?;
        if self.cur().kind == TokenKind::Operator(Operator::StarStar) {
            let position = self.cur().position;
            self.bump();
            let rhs = self.parse_power()?;
            return Some(Expr::new(
                ExprKind::Binary { op: BinaryOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                position,
            ));
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let position = self.cur().position;
        let op = match self.cur().kind {
            TokenKind::Operator(Operator::Minus) => Some(UnaryOp::Neg),
            TokenKind::Operator(Operator::Bang) => Some(UnaryOp::Not),
            TokenKind::Operator(Operator::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Some(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, position));
        }

        if matches!(self.cur().kind, TokenKind::Operator(Operator::PlusPlus) | TokenKind::Operator(Operator::MinusMinus)) {
            let op = if self.cur().kind == TokenKind::Operator(Operator::PlusPlus) {
                IncDecOp::Inc
            } else {
                IncDecOp::Dec
            };
            self.bump();
            let target = self.parse_unary()?;
            return Some(Expr::new(
                ExprKind::IncDec { op, prefix: true, target: Box::new(target) },
                position,
            ));
        }

        // C-style cast: `(` primitive-type `)` unary
        if self.cur().kind == TokenKind::Punct(Punct::LParen) {
            if let TokenKind::Type(ty) = &self.la1().kind {
                let ty = *ty;
                if self.la2().kind == TokenKind::Punct(Punct::RParen) {
                    self.bump(); // (
                    self.bump(); // type
                    self.bump(); // )
                    let operand = self.parse_unary()?;
                    return Some(Expr::new(
                        ExprKind::Cast {
                            target_type: TypeNode::Named(primitive_name(ty).to_string(), position),
                            operand: Box::new(operand),
                        },
                        position,
                    ));
                }
            }
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.cur().kind {
                TokenKind::Punct(Punct::LBracket) => {
                    let position = self.cur().position;
                    self.bump();
                    let index = self.parse_expression()?;
                    self.expect_punct(Punct::RBracket, "]");
                    expr = Expr::new(
                        ExprKind::ArrayAccess { array: Box::new(expr), index: Box::new(index) },
                        position,
                    );
                }
                TokenKind::Operator(Operator::PlusPlus) | TokenKind::Operator(Operator::MinusMinus) => {
                    let position = self.cur().position;
                    let op = if self.cur().kind == TokenKind::Operator(Operator::PlusPlus) {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    self.bump();
                    expr = Expr::new(ExprKind::IncDec { op, prefix: false, target: Box::new(expr) }, position);
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let position = self.cur().position;
        match self.cur().kind.clone() {
            TokenKind::Literal(Literal::Int(v)) => {
                self.bump();
                Some(Expr::new(ExprKind::IntLiteral(v), position))
            }
            TokenKind::Literal(Literal::Float(v)) => {
                self.bump();
                Some(Expr::new(ExprKind::FloatLiteral(v), position))
            }
            TokenKind::Literal(Literal::Bool(v)) => {
                self.bump();
                Some(Expr::new(ExprKind::BoolLiteral(v), position))
            }
            TokenKind::Literal(Literal::Null) => {
                self.bump();
                Some(Expr::new(ExprKind::NullLiteral, position))
            }
            TokenKind::Literal(Literal::Str(s)) => {
                self.bump();
                Some(self.desugar_string_literal(&s, position))
            }
            TokenKind::Identifier(name) => {
                self.bump();
                if self.cur().kind == TokenKind::Punct(Punct::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if self.cur().kind != TokenKind::Punct(Punct::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.cur().kind == TokenKind::Punct(Punct::Comma) {
                                self.bump();
                                if self.cur().kind == TokenKind::Punct(Punct::RParen) {
                                    let pos = self.cur().position;
                                    self.error_at(pos, "trailing comma in argument list");
                                    break;
                                }
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect_punct(Punct::RParen, ")");
                    self.record_use(&name);
                    return Some(Expr::new(ExprKind::Call { callee: name, args }, position));
                }
                self.record_use(&name);
                Some(Expr::new(ExprKind::Identifier(name), position))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let inner = self.parse_expression()?;
                self.expect_punct(Punct::RParen, ")");
                Some(Expr::new(ExprKind::Grouping(Box::new(inner)), position))
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.bump();
                let mut elements = Vec::new();
                if self.cur().kind != TokenKind::Punct(Punct::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if self.cur().kind == TokenKind::Punct(Punct::Comma) {
                            self.bump();
                            if self.cur().kind == TokenKind::Punct(Punct::RBracket) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RBracket, "]");
                Some(Expr::new(ExprKind::ArrayLiteral(elements), position))
            }
            _ => {
                let message = format!("unexpected token '{}' in expression", self.cur().lexeme);
                self.error_at(position, message);
                None
            }
        }
    }

    /// Desugar `"a${e}b"` into `"a" + to_string(e) + "b"` (spec §9, Open Question on
    /// interpolation — this repo documents its choice by implementing it here).
    fn desugar_string_literal(&mut self, raw: &str, position: Position) -> Expr {
        if !raw.contains("${") {
            return Expr::new(ExprKind::StringLiteral(raw.to_string()), position);
        }

        let mut parts: Vec<Expr> = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut inner = String::new();
                let mut depth = 1;
                for ic in chars.by_ref() {
                    if ic == '{' {
                        depth += 1;
                    } else if ic == '}' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    inner.push(ic);
                }

                if !literal.is_empty() {
                    parts.push(Expr::new(ExprKind::StringLiteral(std::mem::take(&mut literal)), position));
                }

                let mut sub_diags = DiagnosticSink::new();
                let sub_parser = Parser::new(&inner, self.file.clone(), &mut sub_diags);
                let sub_expr = sub_parser.parse_standalone_expression();
                parts.push(sub_expr.unwrap_or_else(|| Expr::new(ExprKind::StringLiteral(String::new()), position)));
            } else {
                literal.push(c);
            }
        }

        if !literal.is_empty() || parts.is_empty() {
            parts.push(Expr::new(ExprKind::StringLiteral(literal), position));
        }

        parts
            .into_iter()
            .reduce(|lhs, rhs| Expr::new(ExprKind::Binary { op: BinaryOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) }, position))
            .unwrap_or_else(|| Expr::new(ExprKind::StringLiteral(String::new()), position))
    }

    /// Entry point used internally to parse a bare expression (interpolation bodies).
    fn parse_standalone_expression(mut self) -> Option<Expr> {
        self.parse_expression()
    }

    fn expect_identifier(&mut self, context: &str) -> Option<String> {
        match self.cur().kind.clone() {
            TokenKind::Identifier(name) => {
                self.bump();
                Some(name)
            }
            _ => {
                let position = self.cur().position;
                self.error_at(position, format!("expected {context}"));
                None
            }
        }
    }
}

fn primitive_name(ty: PrimitiveType) -> &'static str {
    match ty {
        PrimitiveType::I32 => "i32",
        PrimitiveType::I64 => "i64",
        PrimitiveType::U32 => "u32",
        PrimitiveType::U64 => "u64",
        PrimitiveType::F64 => "f64",
        PrimitiveType::String => "string",
        PrimitiveType::Bool => "bool",
        PrimitiveType::Char => "char",
        PrimitiveType::Void => "void",
    }
}

fn type_name(node: &TypeNode) -> String {
    match node {
        TypeNode::Named(name, _) => name.clone(),
        TypeNode::Array(inner, _) => type_name(inner),
    }
}

fn desugar_compound_assign(op: Option<BinaryOp>, target: Expr, value: Expr) -> Expr {
    match op {
        None => value,
        Some(op) => {
            let position = value.position;
            Expr::new(ExprKind::Binary { op, lhs: Box::new(target), rhs: Box::new(value) }, position)
        }
    }
}

impl Type {
    fn from_name_or_unknown(name: &str) -> Type {
        Type::from_name(name).unwrap_or(Type::Unknown)
    }
}
