//! AST -> IR lowering (spec §4.7).
//!
//! Assumes the program already passed [`crate::typechecker::SemanticAnalyzer::analyze`]
//! without errors: this pass does not re-validate types, it derives them well enough to
//! pick the right IR instruction and trusts semantic analysis caught anything unsound.
//! Every local variable gets one `alloca` emitted into its function's entry block
//! (spec §4.7, "alloca-per-variable"); reads and writes go through `load`/`store`
//! against that slot rather than tracking SSA values directly, which is what lets
//! `if`/`while`/`for` lower to plain branches instead of needing `phi` nodes.

use std::collections::HashMap;

use crate::ast::*;
use crate::ir;
use crate::ir::*;
use crate::typechecker::types::Type;
use crate::typechecker::{self, FunctionSignature};

const RT_CONCAT: &str = "__adan_rt_concat";
const RT_I64_TO_STRING: &str = "__adan_rt_i64_to_string";
const RT_F64_TO_STRING: &str = "__adan_rt_f64_to_string";
const RT_BOOL_TO_STRING: &str = "__adan_rt_bool_to_string";

pub struct Lowerer {
    functions: HashMap<String, FunctionSignature>,
    user_defined: std::collections::HashSet<String>,
    used_externals: HashMap<String, FunctionSignature>,
    globals: Vec<GlobalString>,
    global_dedup: HashMap<String, usize>,
}

impl Lowerer {
    pub fn new() -> Self {
        Self {
            functions: typechecker::builtin_signatures(),
            user_defined: std::collections::HashSet::new(),
            used_externals: HashMap::new(),
            globals: Vec::new(),
            global_dedup: HashMap::new(),
        }
    }

    pub fn lower_program(&mut self, program: &Program) -> Module {
        for decl in &program.declarations {
            if let TopLevel::Function(f) = decl {
                let params = f.params.iter().map(|p| typechecker::static_type_of(&p.type_node)).collect();
                let return_type = typechecker::static_type_of(&f.return_type);
                self.user_defined.insert(f.name.clone());
                self.functions.insert(
                    f.name.clone(),
                    FunctionSignature { name: f.name.clone(), params, return_type, position: f.position },
                );
            }
        }

        let mut functions = Vec::new();
        for decl in &program.declarations {
            if let TopLevel::Function(f) = decl {
                functions.push(self.lower_function(f));
            }
        }

        let mut externals: Vec<(String, FunctionSignature)> = std::mem::take(&mut self.used_externals).into_iter().collect();
        externals.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, sig) in externals {
            functions.push(Function {
                name,
                params: sig
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| ir::Param { name: format!("a{i}"), ty: ty.clone(), value: ValueId(i) })
                    .collect(),
                return_type: sig.return_type,
                blocks: vec![],
                entry: BlockId(0),
                value_types: vec![],
                is_declaration_only: true,
            });
        }

        Module { functions, globals: std::mem::take(&mut self.globals) }
    }

    fn intern_string(&mut self, s: &str) -> usize {
        if let Some(&idx) = self.global_dedup.get(s) {
            return idx;
        }
        let idx = self.globals.len();
        self.globals.push(GlobalString { name: format!(".str.{idx}"), value: s.to_string() });
        self.global_dedup.insert(s.to_string(), idx);
        idx
    }

    fn record_external_call(&mut self, name: &str) {
        if self.user_defined.contains(name) {
            return;
        }
        if let Some(sig) = self.functions.get(name) {
            self.used_externals.entry(name.to_string()).or_insert_with(|| sig.clone());
        }
    }

    fn lower_function(&mut self, f: &FunctionDecl) -> Function {
        let return_type = typechecker::static_type_of(&f.return_type);
        let mut fb = FunctionBuilder::new();
        fb.current_return_type = return_type.clone();

        fb.push_scope();
        let mut params = Vec::new();
        for p in &f.params {
            let ty = typechecker::static_type_of(&p.type_node);
            let incoming = fb.new_value(ty.clone());
            let slot = fb.alloca(ty.clone());
            fb.push(Instruction::Store { ptr: slot, value: incoming });
            fb.declare_var(&p.name, slot, ty.clone());
            params.push(ir::Param { name: p.name.clone(), ty, value: incoming });
        }

        self.lower_block(&mut fb, &f.body);
        fb.pop_scope();

        if !fb.terminated() {
            let term = fb.default_return(&return_type);
            fb.set_terminator(term);
        }

        fb.finish(f.name.clone(), params, return_type)
    }

    fn lower_block(&mut self, fb: &mut FunctionBuilder, block: &Block) {
        fb.push_scope();
        for stmt in &block.statements {
            if fb.terminated() {
                break;
            }
            self.lower_statement(fb, stmt);
        }
        fb.pop_scope();
    }

    fn lower_statement(&mut self, fb: &mut FunctionBuilder, stmt: &Statement) {
        match stmt {
            Statement::VariableDecl(v) => {
                let ty = typechecker::static_type_of(&v.type_node);
                let slot = fb.alloca(ty.clone());
                if let Some(init) = &v.initializer {
                    let value = self.lower_expr_hinted(fb, init, &ty);
                    fb.push(Instruction::Store { ptr: slot, value });
                }
                fb.declare_var(&v.name, slot, ty);
            }
            Statement::Return { value, .. } => {
                let expected = fb.current_return_type.clone();
                let lowered = value.as_ref().map(|e| self.lower_expr_hinted(fb, e, &expected));
                fb.set_terminator(Terminator::Ret(lowered));
            }
            Statement::If { condition, then_branch, else_branch, .. } => {
                let cond = self.lower_expr(fb, condition);
                let then_bb = fb.new_block("if.then");
                let else_bb = fb.new_block("if.else");
                let merge_bb = fb.new_block("if.merge");
                fb.set_terminator(Terminator::CondBr { cond, then_block: then_bb, else_block: else_bb });

                fb.switch_to(then_bb);
                self.lower_block(fb, then_branch);
                fb.set_terminator_if_unset(Terminator::Br(merge_bb));

                fb.switch_to(else_bb);
                if let Some(eb) = else_branch {
                    self.lower_block(fb, eb);
                }
                fb.set_terminator_if_unset(Terminator::Br(merge_bb));

                fb.switch_to(merge_bb);
            }
            Statement::While { condition, body, .. } => {
                let cond_bb = fb.new_block("while.cond");
                let body_bb = fb.new_block("while.body");
                let end_bb = fb.new_block("while.end");

                fb.set_terminator_if_unset(Terminator::Br(cond_bb));
                fb.switch_to(cond_bb);
                let cond = self.lower_expr(fb, condition);
                fb.set_terminator(Terminator::CondBr { cond, then_block: body_bb, else_block: end_bb });

                fb.switch_to(body_bb);
                fb.loop_stack.push((cond_bb, end_bb));
                self.lower_block(fb, body);
                fb.loop_stack.pop();
                fb.set_terminator_if_unset(Terminator::Br(cond_bb));

                fb.switch_to(end_bb);
            }
            Statement::For { init, condition, step, body, .. } => {
                fb.push_scope();
                if let Some(init) = init {
                    self.lower_statement(fb, init);
                }

                let cond_bb = fb.new_block("for.cond");
                let body_bb = fb.new_block("for.body");
                let step_bb = fb.new_block("for.step");
                let end_bb = fb.new_block("for.end");

                fb.set_terminator_if_unset(Terminator::Br(cond_bb));
                fb.switch_to(cond_bb);
                let cond = match condition {
                    Some(c) => self.lower_expr(fb, c),
                    None => fb.const_bool(true),
                };
                fb.set_terminator(Terminator::CondBr { cond, then_block: body_bb, else_block: end_bb });

                fb.switch_to(body_bb);
                fb.loop_stack.push((step_bb, end_bb));
                self.lower_block(fb, body);
                fb.loop_stack.pop();
                fb.set_terminator_if_unset(Terminator::Br(step_bb));

                fb.switch_to(step_bb);
                if let Some(step) = step {
                    self.lower_statement(fb, step);
                }
                fb.set_terminator_if_unset(Terminator::Br(cond_bb));

                fb.switch_to(end_bb);
                fb.pop_scope();
            }
            Statement::Break(_) => {
                let (_, brk) = *fb.loop_stack.last().expect("break outside loop rejected by semantic analysis");
                fb.set_terminator_if_unset(Terminator::Br(brk));
            }
            Statement::Continue(_) => {
                let (cont, _) = *fb.loop_stack.last().expect("continue outside loop rejected by semantic analysis");
                fb.set_terminator_if_unset(Terminator::Br(cont));
            }
            Statement::Assignment { target, value, .. } => match &target.kind {
                ExprKind::Identifier(name) => {
                    let (ptr, ty) = fb.lookup_var(name).expect("undeclared target rejected by semantic analysis");
                    let value = self.lower_expr_hinted(fb, value, &ty);
                    fb.push(Instruction::Store { ptr, value });
                }
                ExprKind::ArrayAccess { array, index } => {
                    let base = self.lower_expr(fb, array);
                    let idx = self.lower_expr(fb, index);
                    let elem_ty = element_type(fb.value_type(base));
                    let slot = fb.gep(base, idx, elem_ty.clone());
                    let value = self.lower_expr_hinted(fb, value, &elem_ty);
                    fb.push(Instruction::Store { ptr: slot, value });
                }
                _ => unreachable!("assignment target shape rejected by semantic analysis"),
            },
            Statement::Expression(expr) => {
                self.lower_expr(fb, expr);
            }
        }
    }

    fn lower_expr(&mut self, fb: &mut FunctionBuilder, expr: &Expr) -> ValueId {
        self.lower_expr_hinted(fb, expr, &Type::Unknown)
    }

    fn lower_expr_hinted(&mut self, fb: &mut FunctionBuilder, expr: &Expr, hint: &Type) -> ValueId {
        match &expr.kind {
            ExprKind::IntLiteral(v) => fb.const_int(*v),
            ExprKind::FloatLiteral(v) => fb.const_float(*v),
            ExprKind::BoolLiteral(v) => fb.const_bool(*v),
            ExprKind::NullLiteral => fb.const_null(hint.clone()),
            ExprKind::StringLiteral(s) => {
                let global = self.intern_string(s);
                fb.global_string_ptr(global)
            }
            ExprKind::Grouping(inner) => self.lower_expr_hinted(fb, inner, hint),
            ExprKind::Identifier(name) => {
                let (ptr, ty) = fb.lookup_var(name).expect("undeclared identifier rejected by semantic analysis");
                fb.load(ptr, ty)
            }
            ExprKind::ArrayAccess { array, index } => {
                let base = self.lower_expr(fb, array);
                let idx = self.lower_expr(fb, index);
                let elem_ty = element_type(fb.value_type(base));
                let slot = fb.gep(base, idx, elem_ty.clone());
                fb.load(slot, elem_ty)
            }
            ExprKind::ArrayLiteral(elements) => {
                let elem_ty = elements.first().map(|e| self.peek_type(fb, e)).unwrap_or(Type::Unknown);
                let buffer = fb.alloca_array(elem_ty.clone(), elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let value = self.lower_expr_hinted(fb, element, &elem_ty);
                    let idx = fb.const_int(i as i64);
                    let target = fb.gep(buffer, idx, elem_ty.clone());
                    fb.push(Instruction::Store { ptr: target, value });
                }
                buffer
            }
            ExprKind::Call { callee, args } => self.lower_call(fb, callee, args),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(fb, *op, lhs, rhs),
            ExprKind::Comparison { op, lhs, rhs } => self.lower_comparison(fb, *op, lhs, rhs),
            ExprKind::Logical { op, lhs, rhs } => self.lower_logical(fb, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.lower_unary(fb, *op, operand),
            ExprKind::IncDec { op, target, .. } => self.lower_incdec(fb, *op, target),
            ExprKind::Cast { target_type, operand } => {
                let target = typechecker::static_type_of(target_type);
                self.lower_expr_hinted(fb, operand, &target)
            }
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                let cond = self.lower_expr(fb, condition);
                let result_ty = self.peek_type(fb, then_expr);
                let slot = fb.alloca(result_ty.clone());

                let then_bb = fb.new_block("ternary.then");
                let else_bb = fb.new_block("ternary.else");
                let merge_bb = fb.new_block("ternary.merge");
                fb.set_terminator(Terminator::CondBr { cond, then_block: then_bb, else_block: else_bb });

                fb.switch_to(then_bb);
                let then_val = self.lower_expr_hinted(fb, then_expr, &result_ty);
                fb.push(Instruction::Store { ptr: slot, value: then_val });
                fb.set_terminator_if_unset(Terminator::Br(merge_bb));

                fb.switch_to(else_bb);
                let else_val = self.lower_expr_hinted(fb, else_expr, &result_ty);
                fb.push(Instruction::Store { ptr: slot, value: else_val });
                fb.set_terminator_if_unset(Terminator::Br(merge_bb));

                fb.switch_to(merge_bb);
                fb.load(slot, result_ty)
            }
        }
    }

    /// Best-effort type of an expression without emitting any instructions, used only to
    /// pick element/result types (array literals, ternary) before lowering either side.
    fn peek_type(&self, fb: &FunctionBuilder, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLiteral(_) => Type::Int,
            ExprKind::FloatLiteral(_) => Type::Float,
            ExprKind::BoolLiteral(_) => Type::Bool,
            ExprKind::StringLiteral(_) => Type::String,
            ExprKind::NullLiteral => Type::Null,
            ExprKind::Grouping(inner) => self.peek_type(fb, inner),
            ExprKind::Identifier(name) => fb.lookup_var(name).map(|(_, ty)| ty).unwrap_or(Type::Unknown),
            ExprKind::Call { callee, .. } => self.functions.get(callee).map(|s| s.return_type.clone()).unwrap_or(Type::Unknown),
            ExprKind::Cast { target_type, .. } => typechecker::static_type_of(target_type),
            _ => Type::Unknown,
        }
    }

    fn lower_call(&mut self, fb: &mut FunctionBuilder, callee: &str, args: &[Expr]) -> ValueId {
        if callee == "to_string" {
            let arg_ty = self.peek_type(fb, &args[0]);
            let arg_val = self.lower_expr_hinted(fb, &args[0], &arg_ty);
            let runtime_name = match arg_ty {
                Type::Float => RT_F64_TO_STRING,
                Type::Bool => RT_BOOL_TO_STRING,
                _ => RT_I64_TO_STRING,
            };
            self.used_externals.entry(runtime_name.to_string()).or_insert_with(|| FunctionSignature {
                name: runtime_name.to_string(),
                params: vec![arg_ty],
                return_type: Type::String,
                position: crate::lexer::Position::start(),
            });
            let result = fb.new_value(Type::String);
            fb.push(Instruction::Call {
                result: Some(result),
                callee: runtime_name.to_string(),
                args: vec![arg_val],
                return_type: Type::String,
            });
            return result;
        }

        let signature = self.functions.get(callee).cloned().expect("call resolved by semantic analysis");
        let mut arg_values = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(&signature.params) {
            arg_values.push(self.lower_expr_hinted(fb, arg, param_ty));
        }
        self.record_external_call(callee);

        let result = if signature.return_type == Type::Void { None } else { Some(fb.new_value(signature.return_type.clone())) };
        fb.push(Instruction::Call {
            result,
            callee: callee.to_string(),
            args: arg_values,
            return_type: signature.return_type.clone(),
        });
        result.unwrap_or(ValueId(usize::MAX))
    }

    fn lower_binary(&mut self, fb: &mut FunctionBuilder, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> ValueId {
        let lhs_ty = self.peek_type(fb, lhs);
        let rhs_ty = self.peek_type(fb, rhs);

        if op == BinaryOp::Add && lhs_ty == Type::String && rhs_ty == Type::String {
            let lhs_val = self.lower_expr(fb, lhs);
            let rhs_val = self.lower_expr(fb, rhs);
            self.used_externals.entry(RT_CONCAT.to_string()).or_insert_with(|| FunctionSignature {
                name: RT_CONCAT.to_string(),
                params: vec![Type::String, Type::String],
                return_type: Type::String,
                position: crate::lexer::Position::start(),
            });
            let result = fb.new_value(Type::String);
            fb.push(Instruction::Call {
                result: Some(result),
                callee: RT_CONCAT.to_string(),
                args: vec![lhs_val, rhs_val],
                return_type: Type::String,
            });
            return result;
        }

        let is_float = lhs_ty == Type::Float || rhs_ty == Type::Float;
        let lhs_val = self.lower_expr(fb, lhs);
        let rhs_val = self.lower_expr(fb, rhs);

        if is_float {
            let fop = match op {
                BinaryOp::Add => FloatBinOp::FAdd,
                BinaryOp::Sub => FloatBinOp::FSub,
                BinaryOp::Mul | BinaryOp::Pow => FloatBinOp::FMul,
                BinaryOp::Div => FloatBinOp::FDiv,
                BinaryOp::Rem => FloatBinOp::FDiv,
            };
            let result = fb.new_value(Type::Float);
            fb.push(Instruction::FloatBinary { result, op: fop, lhs: lhs_val, rhs: rhs_val });
            result
        } else {
            let iop = match op {
                BinaryOp::Add => IntBinOp::Add,
                BinaryOp::Sub => IntBinOp::Sub,
                BinaryOp::Mul | BinaryOp::Pow => IntBinOp::Mul,
                BinaryOp::Div => IntBinOp::SDiv,
                BinaryOp::Rem => IntBinOp::SRem,
            };
            let result = fb.new_value(Type::Int);
            fb.push(Instruction::IntBinary { result, op: iop, lhs: lhs_val, rhs: rhs_val });
            result
        }
    }

    fn lower_comparison(&mut self, fb: &mut FunctionBuilder, op: CompareOp, lhs: &Expr, rhs: &Expr) -> ValueId {
        let lhs_val = self.lower_expr(fb, lhs);
        let rhs_val = self.lower_expr(fb, rhs);
        let pred = match op {
            CompareOp::Eq => CmpPred::Eq,
            CompareOp::NotEq => CmpPred::Ne,
            CompareOp::Lt => CmpPred::Slt,
            CompareOp::LtEq => CmpPred::Sle,
            CompareOp::Gt => CmpPred::Sgt,
            CompareOp::GtEq => CmpPred::Sge,
        };
        let result = fb.new_value(Type::Bool);
        fb.push(Instruction::ICmp { result, pred, lhs: lhs_val, rhs: rhs_val });
        result
    }

    /// `&&`/`||` short-circuit by branching rather than evaluating both sides
    /// unconditionally (SPEC_FULL.md §9(a)).
    fn lower_logical(&mut self, fb: &mut FunctionBuilder, op: LogicalOp, lhs: &Expr, rhs: &Expr) -> ValueId {
        let slot = fb.alloca(Type::Bool);
        let lhs_val = self.lower_expr(fb, lhs);

        let rhs_bb = fb.new_block("logical.rhs");
        let short_bb = fb.new_block("logical.short");
        let merge_bb = fb.new_block("logical.merge");

        match op {
            LogicalOp::And => fb.set_terminator(Terminator::CondBr { cond: lhs_val, then_block: rhs_bb, else_block: short_bb }),
            LogicalOp::Or => fb.set_terminator(Terminator::CondBr { cond: lhs_val, then_block: short_bb, else_block: rhs_bb }),
        }

        fb.switch_to(short_bb);
        let short_circuit_value = fb.const_bool(matches!(op, LogicalOp::Or));
        fb.push(Instruction::Store { ptr: slot, value: short_circuit_value });
        fb.set_terminator_if_unset(Terminator::Br(merge_bb));

        fb.switch_to(rhs_bb);
        let rhs_val = self.lower_expr(fb, rhs);
        fb.push(Instruction::Store { ptr: slot, value: rhs_val });
        fb.set_terminator_if_unset(Terminator::Br(merge_bb));

        fb.switch_to(merge_bb);
        fb.load(slot, Type::Bool)
    }

    fn lower_unary(&mut self, fb: &mut FunctionBuilder, op: UnaryOp, operand: &Expr) -> ValueId {
        let operand_ty = self.peek_type(fb, operand);
        let operand_val = self.lower_expr(fb, operand);
        match op {
            UnaryOp::Neg => {
                if operand_ty == Type::Float {
                    let zero = fb.const_float(0.0);
                    let result = fb.new_value(Type::Float);
                    fb.push(Instruction::FloatBinary { result, op: FloatBinOp::FSub, lhs: zero, rhs: operand_val });
                    result
                } else {
                    let zero = fb.const_int(0);
                    let result = fb.new_value(Type::Int);
                    fb.push(Instruction::IntBinary { result, op: IntBinOp::Sub, lhs: zero, rhs: operand_val });
                    result
                }
            }
            UnaryOp::Not => {
                let truth = fb.const_bool(true);
                let result = fb.new_value(Type::Bool);
                fb.push(Instruction::ICmp { result, pred: CmpPred::Ne, lhs: operand_val, rhs: truth });
                result
            }
            UnaryOp::BitNot => {
                let neg_one = fb.const_int(-1);
                let result = fb.new_value(Type::Int);
                fb.push(Instruction::IntBinary { result, op: IntBinOp::Sub, lhs: neg_one, rhs: operand_val });
                result
            }
        }
    }

    fn lower_incdec(&mut self, fb: &mut FunctionBuilder, op: IncDecOp, target: &Expr) -> ValueId {
        let ExprKind::Identifier(name) = &target.kind else {
            unreachable!("'++'/'--' target shape rejected by semantic analysis");
        };
        let (ptr, ty) = fb.lookup_var(name).expect("undeclared identifier rejected by semantic analysis");
        let current = fb.load(ptr, ty.clone());
        let one = if ty == Type::Float { fb.const_float(1.0) } else { fb.const_int(1) };
        let result = fb.new_value(ty.clone());
        let iop = match op {
            IncDecOp::Inc => IntBinOp::Add,
            IncDecOp::Dec => IntBinOp::Sub,
        };
        if ty == Type::Float {
            let fop = match op {
                IncDecOp::Inc => FloatBinOp::FAdd,
                IncDecOp::Dec => FloatBinOp::FSub,
            };
            fb.push(Instruction::FloatBinary { result, op: fop, lhs: current, rhs: one });
        } else {
            fb.push(Instruction::IntBinary { result, op: iop, lhs: current, rhs: one });
        }
        fb.push(Instruction::Store { ptr, value: result });
        current
    }
}

impl Default for Lowerer {
    fn default() -> Self {
        Self::new()
    }
}

fn element_type(array_ty: &Type) -> Type {
    match array_ty {
        Type::Array(elem) => (**elem).clone(),
        other => other.clone(),
    }
}

/// Tracks the in-progress blocks, value arena, and lexical scopes for a single function
/// currently being lowered.
struct FunctionBuilder {
    blocks: Vec<BasicBlock>,
    current: BlockId,
    value_types: Vec<Type>,
    scopes: Vec<HashMap<String, (ValueId, Type)>>,
    loop_stack: Vec<(BlockId, BlockId)>,
    entry_allocas: Vec<Instruction>,
    current_return_type: Type,
}

impl FunctionBuilder {
    fn new() -> Self {
        let entry = BasicBlock::new(BlockId(0), "entry");
        Self {
            blocks: vec![entry],
            current: BlockId(0),
            value_types: Vec::new(),
            scopes: Vec::new(),
            loop_stack: Vec::new(),
            entry_allocas: Vec::new(),
            current_return_type: Type::Void,
        }
    }

    fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.value_types.len());
        self.value_types.push(ty);
        id
    }

    fn alloca(&mut self, ty: Type) -> ValueId {
        let pointee = ty.clone();
        let result = self.new_value(Type::Pointer(Box::new(pointee)));
        self.entry_allocas.push(Instruction::Alloca { result, ty });
        result
    }

    /// Allocates storage for a fixed-size buffer of `count` elements and returns a
    /// pointer to the first one (the array literal's value, per spec §9(b)).
    fn alloca_array(&mut self, elem_ty: Type, count: usize) -> ValueId {
        let result = self.new_value(Type::Array(Box::new(elem_ty.clone())));
        self.entry_allocas.push(Instruction::AllocaArray { result, elem_ty, count });
        result
    }

    fn value_type(&self, id: ValueId) -> &Type {
        &self.value_types[id.0]
    }

    fn push(&mut self, instr: Instruction) {
        self.blocks[self.current.0].instructions.push(instr);
    }

    fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, format!("{label}.{}", id.0)));
        id
    }

    fn switch_to(&mut self, id: BlockId) {
        self.current = id;
    }

    fn set_terminator(&mut self, term: Terminator) {
        self.blocks[self.current.0].terminator = term;
    }

    fn set_terminator_if_unset(&mut self, term: Terminator) {
        if self.blocks[self.current.0].terminator == Terminator::Unset {
            self.blocks[self.current.0].terminator = term;
        }
    }

    fn terminated(&self) -> bool {
        self.blocks[self.current.0].terminator != Terminator::Unset
    }

    /// The value a function returns when control falls off the end of its body without
    /// an explicit `return`, matching the original backend's per-type defaults exactly
    /// (SPEC_FULL.md §4.8: `ret void` / `ret <T> null` / `ret <T> 0.0` / `ret <T> 0`).
    fn default_return(&mut self, return_type: &Type) -> Terminator {
        match return_type {
            Type::Void => Terminator::Ret(None),
            Type::Float => Terminator::Ret(Some(self.const_float(0.0))),
            Type::Bool => Terminator::Ret(Some(self.const_bool(false))),
            Type::String | Type::Array(_) | Type::Pointer(_) => {
                Terminator::Ret(Some(self.const_null(return_type.clone())))
            }
            Type::Null | Type::Unknown => Terminator::Ret(None),
            Type::Int | Type::Char => Terminator::Ret(Some(self.const_int(0))),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str, ptr: ValueId, ty: Type) {
        self.scopes.last_mut().expect("no active scope").insert(name.to_string(), (ptr, ty));
    }

    fn lookup_var(&self, name: &str) -> Option<(ValueId, Type)> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    fn const_int(&mut self, value: i64) -> ValueId {
        let result = self.new_value(Type::Int);
        self.push(Instruction::ConstInt { result, value });
        result
    }

    fn const_float(&mut self, value: f64) -> ValueId {
        let result = self.new_value(Type::Float);
        self.push(Instruction::ConstFloat { result, value });
        result
    }

    fn const_bool(&mut self, value: bool) -> ValueId {
        let result = self.new_value(Type::Bool);
        self.push(Instruction::ConstBool { result, value });
        result
    }

    fn const_null(&mut self, ty: Type) -> ValueId {
        let result = self.new_value(ty.clone());
        self.push(Instruction::ConstNull { result, ty });
        result
    }

    fn global_string_ptr(&mut self, global: usize) -> ValueId {
        let result = self.new_value(Type::String);
        self.push(Instruction::GlobalStringPtr { result, global });
        result
    }

    fn load(&mut self, ptr: ValueId, pointee_ty: Type) -> ValueId {
        let result = self.new_value(pointee_ty);
        self.push(Instruction::Load { result, ptr });
        result
    }

    fn gep(&mut self, base: ValueId, index: ValueId, elem_ty: Type) -> ValueId {
        let result = self.new_value(Type::Pointer(Box::new(elem_ty.clone())));
        self.push(Instruction::GetElementPtr { result, base, index, elem_ty });
        result
    }

    fn finish(mut self, name: String, params: Vec<ir::Param>, return_type: Type) -> Function {
        let mut entry_instructions = std::mem::take(&mut self.entry_allocas);
        entry_instructions.extend(self.blocks[0].instructions.drain(..));
        self.blocks[0].instructions = entry_instructions;

        Function {
            name,
            params,
            return_type,
            blocks: self.blocks,
            entry: BlockId(0),
            value_types: self.value_types,
            is_declaration_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::parser::Parser;

    fn lower(src: &str) -> Module {
        let mut diags = DiagnosticSink::new();
        let program = {
            let parser = Parser::new(src, "main.adn", &mut diags);
            parser.parse_program()
        };
        let mut lowerer = Lowerer::new();
        lowerer.lower_program(&program)
    }

    #[test]
    fn simple_function_validates() {
        let module = lower("fun add(a: i64, b: i64): i64 { return a + b; }");
        assert!(validate_module(&module).is_ok());
    }

    #[test]
    fn if_else_produces_three_extra_blocks() {
        let module = lower("fun f(a: i64): i64 { if (a > 0) { return 1; } else { return 0; } }");
        let f = &module.functions[0];
        assert!(f.blocks.len() >= 4);
        assert!(validate_module(&module).is_ok());
    }

    #[test]
    fn println_call_becomes_an_external_declaration() {
        let module = lower(r#"fun main(): void { println("hi"); }"#);
        assert!(module.functions.iter().any(|f| f.name == "println" && f.is_declaration_only));
        assert!(validate_module(&module).is_ok());
    }

    #[test]
    fn while_loop_validates() {
        let module = lower("fun f(): void { set i: i64 = 0; while (i < 10) { i = i + 1; } return; }");
        assert!(validate_module(&module).is_ok());
    }
}
