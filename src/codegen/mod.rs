//! Textual LLVM IR emitter (spec §4.8).
//!
//! Walks a validated [`crate::ir::Module`] once and writes assembly-style LLVM text.
//! Value names are assigned by a counter owned entirely by this module (`%v0`, `%v1`,
//! ...) — never derived from the [`crate::ir::ValueId`] the lowerer handed out — so that
//! renumbering the IR's internal arena never perturbs the emitted names. Constant
//! operands (`ConstInt`/`ConstFloat`/`ConstBool`/`ConstNull`) don't get a register at
//! all: they're folded straight into the text wherever they're used, matching how LLVM
//! itself treats immediates.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ir::*;
use crate::typechecker::types::Type;

pub fn emit_module(module: &Module) -> Result<String, Vec<ValidationError>> {
    validate_module(module)?;

    let mut out = String::new();
    for global in &module.globals {
        emit_global_string(&mut out, global);
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    for function in &module.functions {
        if function.is_declaration_only {
            emit_declaration(&mut out, function);
        } else {
            emit_definition(&mut out, function, &module.globals);
        }
    }

    Ok(out)
}

fn emit_global_string(out: &mut String, global: &GlobalString) {
    let (escaped, len) = escape_llvm_string(&global.value);
    let _ = writeln!(out, "@{} = private constant [{} x i8] c\"{}\\00\"", global.name, len, escaped);
}

/// Hex-escape every byte that isn't printable ASCII, `\` itself, or `"`, matching the
/// original backend's `\5C`/`\22`/`\XX` convention byte-for-byte.
fn escape_llvm_string(s: &str) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut escaped = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => escaped.push_str("\\5C"),
            b'"' => escaped.push_str("\\22"),
            0x20..=0x7E => escaped.push(b as char),
            other => {
                let _ = write!(escaped, "\\{other:02X}");
            }
        }
    }
    (escaped, bytes.len() + 1)
}

fn llvm_type(ty: &Type) -> String {
    match ty {
        Type::Int => "i64".to_string(),
        Type::Float => "double".to_string(),
        Type::Bool => "i1".to_string(),
        Type::Char => "i8".to_string(),
        Type::String => "i8*".to_string(),
        Type::Void => "void".to_string(),
        Type::Null => "i8*".to_string(),
        Type::Array(elem) => format!("{}*", llvm_type(elem)),
        Type::Pointer(inner) => format!("{}*", llvm_type(inner)),
        Type::Unknown => "i8*".to_string(),
    }
}

fn emit_declaration(out: &mut String, function: &Function) {
    let params = function.params.iter().map(|p| llvm_type(&p.ty)).collect::<Vec<_>>().join(", ");
    let _ = writeln!(out, "declare {} @{}({})", llvm_type(&function.return_type), function.name, params);
}

struct FunctionEmitter<'f> {
    function: &'f Function,
    globals: &'f [GlobalString],
    names: HashMap<ValueId, String>,
    counter: usize,
}

impl<'f> FunctionEmitter<'f> {
    fn new(function: &'f Function, globals: &'f [GlobalString]) -> Self {
        Self { function, globals, names: HashMap::new(), counter: 0 }
    }

    fn fresh_name(&mut self) -> String {
        let name = format!("%v{}", self.counter);
        self.counter += 1;
        name
    }

    /// Registers a result-producing instruction's name and returns it for the line
    /// being built.
    fn name_for_result(&mut self, id: ValueId) -> String {
        let name = self.fresh_name();
        self.names.insert(id, name.clone());
        name
    }

    /// Registers a constant as inline text rather than a register: nothing is emitted,
    /// and every future use of `id` substitutes this text directly.
    fn fold_constant(&mut self, id: ValueId, text: String) {
        self.names.insert(id, text);
    }

    fn operand(&self, id: ValueId) -> &str {
        self.names.get(&id).expect("operand defined before use (checked by validate_module)")
    }

    fn ty(&self, id: ValueId) -> String {
        llvm_type(self.function.value_type(id))
    }

    fn block_label(&self, id: BlockId) -> &str {
        &self.function.block(id).label
    }
}

fn emit_definition(out: &mut String, function: &Function, globals: &[GlobalString]) {
    let mut emitter = FunctionEmitter::new(function, globals);

    let params = function
        .params
        .iter()
        .map(|p| {
            let name = emitter.fresh_name();
            emitter.names.insert(p.value, name.clone());
            format!("{} {}", llvm_type(&p.ty), name)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let _ = writeln!(out, "define {} @{}({}) {{", llvm_type(&function.return_type), function.name, params);

    for block in &function.blocks {
        let _ = writeln!(out, "{}:", block.label);
        for inst in &block.instructions {
            emit_instruction(out, &mut emitter, inst);
        }
        emit_terminator(out, &emitter, &block.terminator);
    }

    out.push_str("}\n\n");
}

fn emit_instruction(out: &mut String, e: &mut FunctionEmitter, inst: &Instruction) {
    match inst {
        Instruction::Alloca { result, ty } => {
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {} = alloca {}", name, llvm_type(ty));
        }
        Instruction::AllocaArray { result, elem_ty, count } => {
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {} = alloca {}, i64 {}", name, llvm_type(elem_ty), count);
        }
        Instruction::Store { ptr, value } => {
            let value_ty = e.ty(*value);
            let ptr_ty = e.ty(*ptr);
            let value_text = e.operand(*value).to_string();
            let ptr_text = e.operand(*ptr).to_string();
            let _ = writeln!(out, "  store {value_ty} {value_text}, {ptr_ty} {ptr_text}");
        }
        Instruction::Load { result, ptr } => {
            let ptr_ty = e.ty(*ptr);
            let ptr_text = e.operand(*ptr).to_string();
            let result_ty = llvm_type(e.function.value_type(*result));
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {name} = load {result_ty}, {ptr_ty} {ptr_text}");
        }
        Instruction::ConstInt { result, value } => {
            e.fold_constant(*result, value.to_string());
        }
        Instruction::ConstFloat { result, value } => {
            e.fold_constant(*result, format!("0x{:016X}", value.to_bits()));
        }
        Instruction::ConstBool { result, value } => {
            e.fold_constant(*result, if *value { "true".to_string() } else { "false".to_string() });
        }
        Instruction::ConstNull { result, .. } => {
            e.fold_constant(*result, "null".to_string());
        }
        Instruction::GlobalStringPtr { result, global } => {
            let entry = &e.globals[*global];
            let len = entry.value.as_bytes().len() + 1;
            let global_name = entry.name.clone();
            let name = e.name_for_result(*result);
            let _ = writeln!(
                out,
                "  {name} = getelementptr inbounds [{len} x i8], [{len} x i8]* @{global_name}, i64 0, i64 0"
            );
        }
        Instruction::IntBinary { result, op, lhs, rhs } => {
            let mnemonic = match op {
                IntBinOp::Add => "add",
                IntBinOp::Sub => "sub",
                IntBinOp::Mul => "mul",
                IntBinOp::SDiv => "sdiv",
                IntBinOp::SRem => "srem",
            };
            let lhs_text = e.operand(*lhs).to_string();
            let rhs_text = e.operand(*rhs).to_string();
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {name} = {mnemonic} i64 {lhs_text}, {rhs_text}");
        }
        Instruction::FloatBinary { result, op, lhs, rhs } => {
            let mnemonic = match op {
                FloatBinOp::FAdd => "fadd",
                FloatBinOp::FSub => "fsub",
                FloatBinOp::FMul => "fmul",
                FloatBinOp::FDiv => "fdiv",
            };
            let lhs_text = e.operand(*lhs).to_string();
            let rhs_text = e.operand(*rhs).to_string();
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {name} = {mnemonic} double {lhs_text}, {rhs_text}");
        }
        Instruction::ICmp { result, pred, lhs, rhs } => {
            let mnemonic = match pred {
                CmpPred::Eq => "eq",
                CmpPred::Ne => "ne",
                CmpPred::Slt => "slt",
                CmpPred::Sle => "sle",
                CmpPred::Sgt => "sgt",
                CmpPred::Sge => "sge",
            };
            let operand_ty = e.ty(*lhs);
            let lhs_text = e.operand(*lhs).to_string();
            let rhs_text = e.operand(*rhs).to_string();
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {name} = icmp {mnemonic} {operand_ty} {lhs_text}, {rhs_text}");
        }
        Instruction::GetElementPtr { result, base, index, elem_ty } => {
            let elem_llvm = llvm_type(elem_ty);
            let base_text = e.operand(*base).to_string();
            let index_text = e.operand(*index).to_string();
            let name = e.name_for_result(*result);
            let _ = writeln!(out, "  {name} = getelementptr inbounds {elem_llvm}, {elem_llvm}* {base_text}, i64 {index_text}");
        }
        Instruction::Call { result, callee, args, return_type } => {
            let arg_texts: Vec<String> = args
                .iter()
                .map(|a| format!("{} {}", e.ty(*a), e.operand(*a)))
                .collect();
            let ret_ty = llvm_type(return_type);
            match result {
                Some(result) => {
                    let name = e.name_for_result(*result);
                    let _ = writeln!(out, "  {name} = call {ret_ty} @{callee}({})", arg_texts.join(", "));
                }
                None => {
                    let _ = writeln!(out, "  call {ret_ty} @{callee}({})", arg_texts.join(", "));
                }
            }
        }
    }
}

fn emit_terminator(out: &mut String, e: &FunctionEmitter, terminator: &Terminator) {
    match terminator {
        Terminator::Br(target) => {
            let _ = writeln!(out, "  br label %{}", e.block_label(*target));
        }
        Terminator::CondBr { cond, then_block, else_block } => {
            let cond_text = e.operand(*cond);
            let _ = writeln!(
                out,
                "  br i1 {}, label %{}, label %{}",
                cond_text,
                e.block_label(*then_block),
                e.block_label(*else_block)
            );
        }
        Terminator::Ret(None) => {
            out.push_str("  ret void\n");
        }
        Terminator::Ret(Some(value)) => {
            let value_ty = e.ty(*value);
            let value_text = e.operand(*value);
            let _ = writeln!(out, "  ret {value_ty} {value_text}");
        }
        Terminator::Unset => unreachable!("validate_module rejects unterminated blocks before emission"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_escaping_matches_original_backend_convention() {
        let (escaped, len) = escape_llvm_string("a\"b\\c");
        assert_eq!(escaped, "a\\22b\\5Cc");
        assert_eq!(len, 6);
    }

    #[test]
    fn llvm_type_mapping() {
        assert_eq!(llvm_type(&Type::Int), "i64");
        assert_eq!(llvm_type(&Type::String), "i8*");
        assert_eq!(llvm_type(&Type::Array(Box::new(Type::Int))), "i64*");
    }
}
