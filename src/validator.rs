//! Validates a decoded module and, for every function body that passes validation,
//! compiles it into the resolved [`isa::Instruction`] stream the interpreter executes.
//!
//! Validation and compilation are fused into one pass: the symbolic operand-stack
//! and control-frame-stack type checker walks the Wasm instruction stream exactly
//! once, and for every instruction it accepts it also emits the corresponding
//! [`isa::Instruction`], resolving branch targets via a label table as control
//! frames close. There is exactly one way to turn validated Wasm into executable
//! code here, so the two passes don't need to be separate traits implemented by
//! distinct backends — one `FuncBuilder` does both jobs.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::u32;

use parity_wasm::elements::{self, BlockType, External, Instruction as Op, Internal};

use crate::isa;
use crate::trap::Error;
use crate::types::{GlobalType, Limits, MemoryType, Signature, TableType, ValueType};

const DEFAULT_MEMORY_INDEX: u32 = 0;
const DEFAULT_TABLE_INDEX: u32 = 0;

/// A validated module: the original decoded module plus, for every internal
/// function, its compiled instruction stream (in function-index order, not
/// counting imported functions).
pub struct ValidatedModule {
    pub module: elements::Module,
    pub code: Vec<isa::Instructions>,
}

/// Per-module context available while validating a single function body: the
/// index spaces (types, functions, tables, memories, globals) a function's
/// instructions may reference, in the order imports then locally-defined entries
/// are assigned indices.
struct ModuleContext {
    types: Vec<Signature>,
    func_type_refs: Vec<u32>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<GlobalType>,
}

impl ModuleContext {
    fn require_function_type(&self, idx: u32) -> Result<&Signature, Error> {
        self.types
            .get(idx as usize)
            .ok_or_else(|| Error::Invalid(format!("type index out of bounds: {}", idx)))
    }

    fn require_function(&self, idx: u32) -> Result<&Signature, Error> {
        let type_idx = *self
            .func_type_refs
            .get(idx as usize)
            .ok_or_else(|| Error::Invalid(format!("function index out of bounds: {}", idx)))?;
        self.require_function_type(type_idx)
    }

    fn require_table(&self, idx: u32) -> Result<&TableType, Error> {
        self.tables
            .get(idx as usize)
            .ok_or_else(|| Error::Invalid(format!("table index out of bounds: {}", idx)))
    }

    fn require_memory(&self, idx: u32) -> Result<&MemoryType, Error> {
        self.memories
            .get(idx as usize)
            .ok_or_else(|| Error::Invalid(format!("memory index out of bounds: {}", idx)))
    }

    fn require_global(&self, idx: u32, mutable: Option<bool>) -> Result<&GlobalType, Error> {
        let global = self
            .globals
            .get(idx as usize)
            .ok_or_else(|| Error::Invalid(format!("global index out of bounds: {}", idx)))?;
        if let Some(expected_mutable) = mutable {
            if global.is_mutable() != expected_mutable {
                return Err(Error::Invalid(format!(
                    "global {} mutability mismatch: expected mutable={}",
                    idx, expected_mutable
                )));
            }
        }
        Ok(global)
    }
}

/// Validates and compiles an entire module.
pub fn validate_module(module: elements::Module) -> Result<ValidatedModule, Error> {
    let mut types = Vec::new();
    if let Some(section) = module.type_section() {
        for ty in section.types() {
            let elements::Type::Function(func_type) = ty;
            types.push(Signature::from_elements(func_type));
        }
    }

    let mut func_type_refs = Vec::new();
    let mut tables = Vec::new();
    let mut memories = Vec::new();
    let mut globals = Vec::new();

    if let Some(section) = module.import_section() {
        for entry in section.entries() {
            match entry.external() {
                External::Function(type_idx) => func_type_refs.push(*type_idx),
                External::Table(table_type) => tables.push(TableType::from_elements(table_type)),
                External::Memory(memory_type) => {
                    memories.push(MemoryType::from_elements(memory_type))
                }
                External::Global(global_type) => globals.push(GlobalType::from_elements(global_type)),
            }
        }
    }

    if let Some(section) = module.function_section() {
        for func in section.entries() {
            func_type_refs.push(func.type_ref());
        }
    }
    if let Some(section) = module.table_section() {
        for entry in section.entries() {
            validate_limits(entry.limits())?;
            tables.push(TableType::from_elements(entry));
        }
    }
    if let Some(section) = module.memory_section() {
        for entry in section.entries() {
            validate_limits(entry.limits())?;
            memories.push(MemoryType::from_elements(entry));
        }
    }
    if let Some(section) = module.global_section() {
        for entry in section.entries() {
            let init_ty = expr_const_type(entry.init_expr(), &globals)?;
            if init_ty != ValueType::from_elements(entry.global_type().content_type()) {
                return Err(Error::Invalid(format!(
                    "trying to initialize global of type {:?} with value of type {:?}",
                    entry.global_type().content_type(),
                    init_ty
                )));
            }
            globals.push(GlobalType::from_elements(entry.global_type()));
        }
    }

    let context = ModuleContext {
        types,
        func_type_refs,
        tables,
        memories,
        globals,
    };

    let function_section_len = module.function_section().map(|s| s.entries().len()).unwrap_or(0);
    let code_section_len = module.code_section().map(|s| s.bodies().len()).unwrap_or(0);
    if function_section_len != code_section_len {
        return Err(Error::Invalid(format!(
            "function section declares {} functions, but code section has {} bodies",
            function_section_len, code_section_len
        )));
    }

    let mut code = Vec::with_capacity(function_section_len);
    if function_section_len != 0 {
        let function_section = module.function_section().expect("function_section_len != 0");
        let code_section = module.code_section().expect("code_section_len == function_section_len");
        let import_count = module
            .import_section()
            .map(|s| s.functions())
            .unwrap_or(0) as u32;
        for (index, func) in function_section.entries().iter().enumerate() {
            let body = code_section.bodies().get(index).ok_or_else(|| {
                Error::Invalid(format!("missing body for function {}", index))
            })?;
            let compiled = FuncBuilder::compile(&context, func, body).map_err(|e| match e {
                Error::Invalid(msg) if msg.starts_with("type stack size too small at return") => {
                    Error::Invalid(msg)
                }
                Error::Invalid(msg) => Error::Invalid(format!(
                    "function #{}: {}",
                    import_count as usize + index,
                    msg
                )),
                other => other,
            })?;
            code.push(compiled);
        }
    }

    if let Some(start_fn_idx) = module.start_section() {
        let sig = context.require_function(start_fn_idx)?;
        if sig.return_type().is_some() || !sig.params().is_empty() {
            return Err(Error::Invalid(
                "start function must have type [] -> []".into(),
            ));
        }
    }

    if let Some(export_section) = module.export_section() {
        let mut export_names = BTreeSet::new();
        for export in export_section.entries() {
            if !export_names.insert(export.field().to_string()) {
                return Err(Error::Invalid(format!(
                    "duplicate export \"{}\"",
                    export.field()
                )));
            }
            match *export.internal() {
                Internal::Function(idx) => {
                    context.require_function(idx)?;
                }
                Internal::Global(idx) => {
                    context.require_global(idx, Some(false))?;
                }
                Internal::Memory(idx) => {
                    context.require_memory(idx)?;
                }
                Internal::Table(idx) => {
                    context.require_table(idx)?;
                }
            }
        }
    }

    if context.tables.len() > 1 {
        return Err(Error::Invalid(format!(
            "too many tables in index space: {}",
            context.tables.len()
        )));
    }
    if context.memories.len() > 1 {
        return Err(Error::Invalid(format!(
            "too many memories in index space: {}",
            context.memories.len()
        )));
    }

    if let Some(data_section) = module.data_section() {
        for segment in data_section.entries() {
            let memory = context.require_memory(segment.index())?;
            let init_ty = expr_const_type(segment.offset(), &context.globals)?;
            if init_ty != ValueType::I32 {
                return Err(Error::Invalid("data segment offset must be i32".into()));
            }
            if let Some(offset) = const_u32(segment.offset()) {
                let max_bytes = memory.limits().initial() as u64 * 65536;
                let end = offset as u64 + segment.value().len() as u64;
                if end > max_bytes {
                    return Err(Error::Invalid(format!(
                        "data segment is out of bounds: [{}, {}) >= max value {}",
                        offset, end, max_bytes
                    )));
                }
            }
        }
    }

    if let Some(element_section) = module.elements_section() {
        for segment in element_section.entries() {
            let table = context.require_table(segment.index())?;
            let init_ty = expr_const_type(segment.offset(), &context.globals)?;
            if init_ty != ValueType::I32 {
                return Err(Error::Invalid("element segment offset must be i32".into()));
            }
            if let Some(offset) = const_u32(segment.offset()) {
                let max = table.limits().initial();
                let end = offset as u64 + segment.members().len() as u64;
                if end > max as u64 {
                    return Err(Error::Invalid(format!(
                        "elem segment offset is out of bounds: {} >= max value {}",
                        offset, max
                    )));
                }
            }
            for func_idx in segment.members() {
                context.require_function(*func_idx)?;
            }
        }
    }

    if let Some(import_section) = module.import_section() {
        for import in import_section.entries() {
            match import.external() {
                External::Function(type_idx) => {
                    context.require_function_type(*type_idx)?;
                }
                External::Global(global_type) => {
                    if global_type.is_mutable() {
                        return Err(Error::Invalid(format!(
                            "cannot import mutable global \"{}\"",
                            import.field()
                        )));
                    }
                }
                External::Memory(memory_type) => {
                    validate_limits(memory_type.limits())?;
                }
                External::Table(table_type) => {
                    validate_limits(table_type.limits())?;
                }
            }
        }
    }

    Ok(ValidatedModule { module, code })
}

fn validate_limits(limits: &elements::ResizableLimits) -> Result<(), Error> {
    if let Some(maximum) = limits.maximum() {
        if limits.initial() > maximum {
            return Err(Error::Invalid(format!(
                "maximum limit {} is less than initial {}",
                maximum,
                limits.initial()
            )));
        }
    }
    Ok(())
}

fn const_u32(init_expr: &elements::InitExpr) -> Option<u32> {
    match init_expr.code().first() {
        Some(Op::I32Const(v)) => Some(*v as u32),
        _ => None,
    }
}

fn expr_const_type(
    init_expr: &elements::InitExpr,
    globals: &[GlobalType],
) -> Result<ValueType, Error> {
    let code = init_expr.code();
    if code.len() != 2 {
        return Err(Error::Invalid(
            "constant expression must consist of exactly one instruction and `end`".into(),
        ));
    }
    let ty = match code[0] {
        Op::I32Const(_) => ValueType::I32,
        Op::I64Const(_) => ValueType::I64,
        Op::F32Const(_) => ValueType::F32,
        Op::F64Const(_) => ValueType::F64,
        Op::GetGlobal(idx) => {
            let global = globals
                .get(idx as usize)
                .ok_or_else(|| Error::Invalid(format!("global {} not yet defined", idx)))?;
            if global.is_mutable() {
                return Err(Error::Invalid(format!(
                    "global {} used in constant expression must be immutable",
                    idx
                )));
            }
            global.value_type()
        }
        _ => return Err(Error::Invalid("non-constant opcode in constant expression".into())),
    };
    if code[1] != Op::End {
        return Err(Error::Invalid(
            "constant expression must end with `end`".into(),
        ));
    }
    Ok(ty)
}

/// A value type as tracked on the symbolic operand stack: either a concrete type or
/// `Any`, the latter standing in for values pushed while the stack is polymorphic
/// (after `unreachable`, `br`, `br_table`, or `return`).
#[derive(Debug, Clone, Copy, PartialEq)]
enum StackType {
    Any,
    Concrete(ValueType),
}

impl From<ValueType> for StackType {
    fn from(vt: ValueType) -> Self {
        StackType::Concrete(vt)
    }
}

impl PartialEq<ValueType> for StackType {
    fn eq(&self, other: &ValueType) -> bool {
        match self {
            StackType::Any => true,
            StackType::Concrete(vt) => vt == other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Block { end_label: LabelId },
    Loop { header: LabelId },
    IfTrue { end_label: LabelId, if_not: LabelId },
    IfFalse { end_label: LabelId },
}

impl FrameKind {
    fn br_destination(&self) -> LabelId {
        match *self {
            FrameKind::Block { end_label } => end_label,
            FrameKind::Loop { header } => header,
            FrameKind::IfTrue { end_label, .. } => end_label,
            FrameKind::IfFalse { end_label } => end_label,
        }
    }

    fn end_label(&self) -> LabelId {
        match *self {
            FrameKind::Block { end_label } => end_label,
            FrameKind::IfTrue { end_label, .. } => end_label,
            FrameKind::IfFalse { end_label } => end_label,
            FrameKind::Loop { .. } => panic!("a loop frame has no end label"),
        }
    }

    fn is_loop(&self) -> bool {
        matches!(self, FrameKind::Loop { .. })
    }
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    block_type: BlockType,
    value_stack_len: usize,
    polymorphic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LabelId(usize);

enum Label {
    Resolved(u32),
    Unresolved,
}

/// Builds the resolved instruction stream for a single function body while
/// simultaneously type-checking it.
struct FuncBuilder<'a> {
    module: &'a ModuleContext,
    locals: Vec<ValueType>,
    return_type: BlockType,
    value_stack: Vec<StackType>,
    frames: Vec<Frame>,
    instructions: isa::Instructions,
    labels: Vec<(Label, Vec<isa::Reloc>)>,
}

const VALUE_STACK_LIMIT: usize = 16 * 1024;
const FRAME_STACK_LIMIT: usize = 16 * 1024;

impl<'a> FuncBuilder<'a> {
    fn compile(
        module: &'a ModuleContext,
        func: &elements::Func,
        body: &elements::FuncBody,
    ) -> Result<isa::Instructions, Error> {
        let signature = module.require_function_type(func.type_ref())?;
        let mut locals = signature.params().to_vec();
        for local in body.locals() {
            let ty = ValueType::from_elements(local.value_type());
            for _ in 0..local.count() {
                locals.push(ty);
            }
        }
        let return_type = match signature.return_type() {
            Some(vt) => BlockType::Value(to_elements_value_type(vt)),
            None => BlockType::NoResult,
        };

        let ins_size_estimate = body.code().elements().len();
        let mut builder = FuncBuilder {
            module,
            locals,
            return_type,
            value_stack: Vec::new(),
            frames: Vec::new(),
            instructions: isa::Instructions::with_capacity(ins_size_estimate),
            labels: Vec::new(),
        };

        let end_label = builder.new_label();
        builder.push_frame(FrameKind::Block { end_label }, return_type)?;
        builder.read_body(body.code().elements())?;

        if !builder.frames.is_empty() {
            return Err(Error::Invalid("function body missing final `end`".into()));
        }

        Ok(builder.instructions)
    }

    fn read_body(&mut self, body: &[Op]) -> Result<(), Error> {
        if body.is_empty() {
            return Err(Error::Invalid("empty function body".into()));
        }
        for (position, instruction) in body.iter().enumerate() {
            let unreachable = self.read_instruction(instruction).map_err(|e| match e {
                Error::Invalid(msg) if msg.starts_with("type stack size too small at return") => {
                    Error::Invalid(msg)
                }
                Error::Invalid(msg) => {
                    Error::Invalid(format!("at instruction {} ({:?}): {}", position, instruction, msg))
                }
                other => other,
            })?;
            if unreachable {
                self.make_polymorphic();
            }
        }
        Ok(())
    }

    fn make_polymorphic(&mut self) {
        let frame = self.frames.last_mut().expect("frame stack is never empty mid-body");
        self.value_stack.truncate(frame.value_stack_len);
        frame.polymorphic = true;
    }

    /// Returns `true` if control never falls through past this instruction.
    fn read_instruction(&mut self, instruction: &Op) -> Result<bool, Error> {
        use Op::*;

        match *instruction {
            Nop => {}

            Unreachable => {
                self.emit(isa::Instruction::Unreachable);
                return Ok(true);
            }

            Block(block_type) => {
                let end_label = self.new_label();
                self.push_frame(FrameKind::Block { end_label }, block_type)?;
            }
            Loop(block_type) => {
                let header = self.new_label();
                self.resolve_label(header);
                self.push_frame(FrameKind::Loop { header }, block_type)?;
            }
            If(block_type) => {
                let if_not = self.new_label();
                let end_label = self.new_label();
                self.pop_expect(ValueType::I32)?;
                self.push_frame(FrameKind::IfTrue { end_label, if_not }, block_type)?;
                self.emit_br_if_eqz(if_not, isa::DropKeep { drop: 0, keep: isa::Keep::None });
            }
            Else => {
                let top = self.top_frame();
                let (if_not, end_label) = match top.kind {
                    FrameKind::IfTrue { if_not, end_label } => (if_not, end_label),
                    _ => return Err(Error::Invalid("`else` without matching `if`".into())),
                };
                let block_type = top.block_type;
                self.emit_br(end_label, isa::DropKeep { drop: 0, keep: isa::Keep::None });
                self.resolve_label(if_not);
                self.pop_frame()?;
                self.push_frame(FrameKind::IfFalse { end_label }, block_type)?;
            }
            End => {
                let (kind, block_type) = {
                    let top = self.top_frame();
                    (top.kind, top.block_type)
                };

                if let FrameKind::IfTrue { if_not, .. } = kind {
                    if block_type != BlockType::NoResult {
                        return Err(Error::Invalid(
                            "`if` without `else` must have type [] -> []".into(),
                        ));
                    }
                    self.resolve_label(if_not);
                }

                if !kind.is_loop() {
                    let end_label = kind.end_label();
                    self.resolve_label(end_label);
                }

                if self.frames.len() == 1 {
                    if let BlockType::Value(value_type) = self.return_type {
                        self.tee_expect(ValueType::from_elements(value_type))?;
                    }
                    let drop_keep = self.drop_keep_for_return();
                    self.emit(isa::Instruction::Return(drop_keep));
                }

                self.pop_frame()?;
                if let BlockType::Value(value_type) = block_type {
                    self.push(ValueType::from_elements(value_type).into());
                }
            }

            Br(depth) => {
                self.validate_branch_value(depth)?;
                let (label, drop_keep) = self.branch_target(depth);
                self.emit_br(label, drop_keep);
                return Ok(true);
            }
            BrIf(depth) => {
                self.pop_expect(ValueType::I32)?;
                self.validate_branch_value(depth)?;
                let (label, drop_keep) = self.branch_target(depth);
                self.emit_br_if_nez(label, drop_keep);
            }
            BrTable(ref table, default) => {
                let required = self.br_table_required_type(table, default)?;
                self.pop_expect(ValueType::I32)?;
                if let BlockType::Value(vt) = required {
                    self.tee_expect(ValueType::from_elements(vt))?;
                }
                let mut targets = Vec::with_capacity(table.len());
                for depth in table.iter() {
                    targets.push(self.branch_target(*depth));
                }
                let default_target = self.branch_target(default);
                self.emit_br_table(&targets, default_target);
                return Ok(true);
            }
            Return => {
                if let BlockType::Value(value_type) = self.return_type {
                    let frame = self.top_frame();
                    let available = self.value_stack.len() - frame.value_stack_len;
                    if available < 1 && !frame.polymorphic {
                        return Err(Error::Invalid(
                            "type stack size too small at return. got 0, expected at least 1".into(),
                        ));
                    }
                    self.tee_expect(ValueType::from_elements(value_type))?;
                }
                let drop_keep = self.drop_keep_for_return();
                self.emit(isa::Instruction::Return(drop_keep));
                return Ok(true);
            }

            Call(func_idx) => {
                let signature = self.module.require_function(func_idx)?.clone();
                for param in signature.params().iter().rev() {
                    self.pop_expect(*param)?;
                }
                if let Some(ret) = signature.return_type() {
                    self.push(ret.into());
                }
                self.emit(isa::Instruction::Call(func_idx));
            }
            CallIndirect(type_idx, _reserved) => {
                self.module.require_table(DEFAULT_TABLE_INDEX)?;
                self.pop_expect(ValueType::I32)?;
                let signature = self.module.require_function_type(type_idx)?.clone();
                for param in signature.params().iter().rev() {
                    self.pop_expect(*param)?;
                }
                if let Some(ret) = signature.return_type() {
                    self.push(ret.into());
                }
                self.emit(isa::Instruction::CallIndirect(type_idx));
            }

            Drop => {
                self.pop_any()?;
                self.emit(isa::Instruction::Drop);
            }
            Select => {
                self.pop_expect(ValueType::I32)?;
                let ty = self.pop_any()?;
                self.pop_expect_stack(ty)?;
                self.push(ty);
                self.emit(isa::Instruction::Select);
            }

            GetLocal(index) => {
                let ty = self.local_type(index)?;
                let depth = self.relative_local_depth(index)?;
                self.push(ty.into());
                self.emit(isa::Instruction::GetLocal(depth));
            }
            SetLocal(index) => {
                let ty = self.local_type(index)?;
                let depth = self.relative_local_depth(index)?;
                self.pop_expect(ty)?;
                self.emit(isa::Instruction::SetLocal(depth));
            }
            TeeLocal(index) => {
                let ty = self.local_type(index)?;
                let depth = self.relative_local_depth(index)?;
                self.tee_expect(ty)?;
                self.emit(isa::Instruction::TeeLocal(depth));
            }
            GetGlobal(index) => {
                let ty = self.module.require_global(index, None)?.value_type();
                self.push(ty.into());
                self.emit(isa::Instruction::GetGlobal(index));
            }
            SetGlobal(index) => {
                let ty = self.module.require_global(index, Some(true))?.value_type();
                self.pop_expect(ty)?;
                self.emit(isa::Instruction::SetGlobal(index));
            }

            I32Load(align, offset) => self.load(align, 4, ValueType::I32, isa::Instruction::I32Load(offset))?,
            I64Load(align, offset) => self.load(align, 8, ValueType::I64, isa::Instruction::I64Load(offset))?,
            F32Load(align, offset) => self.load(align, 4, ValueType::F32, isa::Instruction::F32Load(offset))?,
            F64Load(align, offset) => self.load(align, 8, ValueType::F64, isa::Instruction::F64Load(offset))?,
            I32Load8S(align, offset) => self.load(align, 1, ValueType::I32, isa::Instruction::I32Load8S(offset))?,
            I32Load8U(align, offset) => self.load(align, 1, ValueType::I32, isa::Instruction::I32Load8U(offset))?,
            I32Load16S(align, offset) => self.load(align, 2, ValueType::I32, isa::Instruction::I32Load16S(offset))?,
            I32Load16U(align, offset) => self.load(align, 2, ValueType::I32, isa::Instruction::I32Load16U(offset))?,
            I64Load8S(align, offset) => self.load(align, 1, ValueType::I64, isa::Instruction::I64Load8S(offset))?,
            I64Load8U(align, offset) => self.load(align, 1, ValueType::I64, isa::Instruction::I64Load8U(offset))?,
            I64Load16S(align, offset) => self.load(align, 2, ValueType::I64, isa::Instruction::I64Load16S(offset))?,
            I64Load16U(align, offset) => self.load(align, 2, ValueType::I64, isa::Instruction::I64Load16U(offset))?,
            I64Load32S(align, offset) => self.load(align, 4, ValueType::I64, isa::Instruction::I64Load32S(offset))?,
            I64Load32U(align, offset) => self.load(align, 4, ValueType::I64, isa::Instruction::I64Load32U(offset))?,

            I32Store(align, offset) => self.store(align, 4, ValueType::I32, isa::Instruction::I32Store(offset))?,
            I64Store(align, offset) => self.store(align, 8, ValueType::I64, isa::Instruction::I64Store(offset))?,
            F32Store(align, offset) => self.store(align, 4, ValueType::F32, isa::Instruction::F32Store(offset))?,
            F64Store(align, offset) => self.store(align, 8, ValueType::F64, isa::Instruction::F64Store(offset))?,
            I32Store8(align, offset) => self.store(align, 1, ValueType::I32, isa::Instruction::I32Store8(offset))?,
            I32Store16(align, offset) => self.store(align, 2, ValueType::I32, isa::Instruction::I32Store16(offset))?,
            I64Store8(align, offset) => self.store(align, 1, ValueType::I64, isa::Instruction::I64Store8(offset))?,
            I64Store16(align, offset) => self.store(align, 2, ValueType::I64, isa::Instruction::I64Store16(offset))?,
            I64Store32(align, offset) => self.store(align, 4, ValueType::I64, isa::Instruction::I64Store32(offset))?,

            CurrentMemory(_) => {
                self.module.require_memory(DEFAULT_MEMORY_INDEX)?;
                self.push(ValueType::I32.into());
                self.emit(isa::Instruction::CurrentMemory);
            }
            GrowMemory(_) => {
                self.module.require_memory(DEFAULT_MEMORY_INDEX)?;
                self.pop_expect(ValueType::I32)?;
                self.push(ValueType::I32.into());
                self.emit(isa::Instruction::GrowMemory);
            }

            I32Const(v) => {
                self.push(ValueType::I32.into());
                self.emit(isa::Instruction::I32Const(v));
            }
            I64Const(v) => {
                self.push(ValueType::I64.into());
                self.emit(isa::Instruction::I64Const(v));
            }
            F32Const(v) => {
                self.push(ValueType::F32.into());
                self.emit(isa::Instruction::F32Const(v));
            }
            F64Const(v) => {
                self.push(ValueType::F64.into());
                self.emit(isa::Instruction::F64Const(v));
            }

            I32Eqz => self.testop(ValueType::I32, isa::Instruction::I32Eqz)?,
            I32Eq => self.relop(ValueType::I32, isa::Instruction::I32Eq)?,
            I32Ne => self.relop(ValueType::I32, isa::Instruction::I32Ne)?,
            I32LtS => self.relop(ValueType::I32, isa::Instruction::I32LtS)?,
            I32LtU => self.relop(ValueType::I32, isa::Instruction::I32LtU)?,
            I32GtS => self.relop(ValueType::I32, isa::Instruction::I32GtS)?,
            I32GtU => self.relop(ValueType::I32, isa::Instruction::I32GtU)?,
            I32LeS => self.relop(ValueType::I32, isa::Instruction::I32LeS)?,
            I32LeU => self.relop(ValueType::I32, isa::Instruction::I32LeU)?,
            I32GeS => self.relop(ValueType::I32, isa::Instruction::I32GeS)?,
            I32GeU => self.relop(ValueType::I32, isa::Instruction::I32GeU)?,

            I64Eqz => self.testop(ValueType::I64, isa::Instruction::I64Eqz)?,
            I64Eq => self.relop(ValueType::I64, isa::Instruction::I64Eq)?,
            I64Ne => self.relop(ValueType::I64, isa::Instruction::I64Ne)?,
            I64LtS => self.relop(ValueType::I64, isa::Instruction::I64LtS)?,
            I64LtU => self.relop(ValueType::I64, isa::Instruction::I64LtU)?,
            I64GtS => self.relop(ValueType::I64, isa::Instruction::I64GtS)?,
            I64GtU => self.relop(ValueType::I64, isa::Instruction::I64GtU)?,
            I64LeS => self.relop(ValueType::I64, isa::Instruction::I64LeS)?,
            I64LeU => self.relop(ValueType::I64, isa::Instruction::I64LeU)?,
            I64GeS => self.relop(ValueType::I64, isa::Instruction::I64GeS)?,
            I64GeU => self.relop(ValueType::I64, isa::Instruction::I64GeU)?,

            F32Eq => self.relop(ValueType::F32, isa::Instruction::F32Eq)?,
            F32Ne => self.relop(ValueType::F32, isa::Instruction::F32Ne)?,
            F32Lt => self.relop(ValueType::F32, isa::Instruction::F32Lt)?,
            F32Gt => self.relop(ValueType::F32, isa::Instruction::F32Gt)?,
            F32Le => self.relop(ValueType::F32, isa::Instruction::F32Le)?,
            F32Ge => self.relop(ValueType::F32, isa::Instruction::F32Ge)?,

            F64Eq => self.relop(ValueType::F64, isa::Instruction::F64Eq)?,
            F64Ne => self.relop(ValueType::F64, isa::Instruction::F64Ne)?,
            F64Lt => self.relop(ValueType::F64, isa::Instruction::F64Lt)?,
            F64Gt => self.relop(ValueType::F64, isa::Instruction::F64Gt)?,
            F64Le => self.relop(ValueType::F64, isa::Instruction::F64Le)?,
            F64Ge => self.relop(ValueType::F64, isa::Instruction::F64Ge)?,

            I32Clz => self.unop(ValueType::I32, isa::Instruction::I32Clz)?,
            I32Ctz => self.unop(ValueType::I32, isa::Instruction::I32Ctz)?,
            I32Popcnt => self.unop(ValueType::I32, isa::Instruction::I32Popcnt)?,
            I32Add => self.binop(ValueType::I32, isa::Instruction::I32Add)?,
            I32Sub => self.binop(ValueType::I32, isa::Instruction::I32Sub)?,
            I32Mul => self.binop(ValueType::I32, isa::Instruction::I32Mul)?,
            I32DivS => self.binop(ValueType::I32, isa::Instruction::I32DivS)?,
            I32DivU => self.binop(ValueType::I32, isa::Instruction::I32DivU)?,
            I32RemS => self.binop(ValueType::I32, isa::Instruction::I32RemS)?,
            I32RemU => self.binop(ValueType::I32, isa::Instruction::I32RemU)?,
            I32And => self.binop(ValueType::I32, isa::Instruction::I32And)?,
            I32Or => self.binop(ValueType::I32, isa::Instruction::I32Or)?,
            I32Xor => self.binop(ValueType::I32, isa::Instruction::I32Xor)?,
            I32Shl => self.binop(ValueType::I32, isa::Instruction::I32Shl)?,
            I32ShrS => self.binop(ValueType::I32, isa::Instruction::I32ShrS)?,
            I32ShrU => self.binop(ValueType::I32, isa::Instruction::I32ShrU)?,
            I32Rotl => self.binop(ValueType::I32, isa::Instruction::I32Rotl)?,
            I32Rotr => self.binop(ValueType::I32, isa::Instruction::I32Rotr)?,

            I64Clz => self.unop(ValueType::I64, isa::Instruction::I64Clz)?,
            I64Ctz => self.unop(ValueType::I64, isa::Instruction::I64Ctz)?,
            I64Popcnt => self.unop(ValueType::I64, isa::Instruction::I64Popcnt)?,
            I64Add => self.binop(ValueType::I64, isa::Instruction::I64Add)?,
            I64Sub => self.binop(ValueType::I64, isa::Instruction::I64Sub)?,
            I64Mul => self.binop(ValueType::I64, isa::Instruction::I64Mul)?,
            I64DivS => self.binop(ValueType::I64, isa::Instruction::I64DivS)?,
            I64DivU => self.binop(ValueType::I64, isa::Instruction::I64DivU)?,
            I64RemS => self.binop(ValueType::I64, isa::Instruction::I64RemS)?,
            I64RemU => self.binop(ValueType::I64, isa::Instruction::I64RemU)?,
            I64And => self.binop(ValueType::I64, isa::Instruction::I64And)?,
            I64Or => self.binop(ValueType::I64, isa::Instruction::I64Or)?,
            I64Xor => self.binop(ValueType::I64, isa::Instruction::I64Xor)?,
            I64Shl => self.binop(ValueType::I64, isa::Instruction::I64Shl)?,
            I64ShrS => self.binop(ValueType::I64, isa::Instruction::I64ShrS)?,
            I64ShrU => self.binop(ValueType::I64, isa::Instruction::I64ShrU)?,
            I64Rotl => self.binop(ValueType::I64, isa::Instruction::I64Rotl)?,
            I64Rotr => self.binop(ValueType::I64, isa::Instruction::I64Rotr)?,

            F32Abs => self.unop(ValueType::F32, isa::Instruction::F32Abs)?,
            F32Neg => self.unop(ValueType::F32, isa::Instruction::F32Neg)?,
            F32Ceil => self.unop(ValueType::F32, isa::Instruction::F32Ceil)?,
            F32Floor => self.unop(ValueType::F32, isa::Instruction::F32Floor)?,
            F32Trunc => self.unop(ValueType::F32, isa::Instruction::F32Trunc)?,
            F32Nearest => self.unop(ValueType::F32, isa::Instruction::F32Nearest)?,
            F32Sqrt => self.unop(ValueType::F32, isa::Instruction::F32Sqrt)?,
            F32Add => self.binop(ValueType::F32, isa::Instruction::F32Add)?,
            F32Sub => self.binop(ValueType::F32, isa::Instruction::F32Sub)?,
            F32Mul => self.binop(ValueType::F32, isa::Instruction::F32Mul)?,
            F32Div => self.binop(ValueType::F32, isa::Instruction::F32Div)?,
            F32Min => self.binop(ValueType::F32, isa::Instruction::F32Min)?,
            F32Max => self.binop(ValueType::F32, isa::Instruction::F32Max)?,
            F32Copysign => self.binop(ValueType::F32, isa::Instruction::F32Copysign)?,

            F64Abs => self.unop(ValueType::F64, isa::Instruction::F64Abs)?,
            F64Neg => self.unop(ValueType::F64, isa::Instruction::F64Neg)?,
            F64Ceil => self.unop(ValueType::F64, isa::Instruction::F64Ceil)?,
            F64Floor => self.unop(ValueType::F64, isa::Instruction::F64Floor)?,
            F64Trunc => self.unop(ValueType::F64, isa::Instruction::F64Trunc)?,
            F64Nearest => self.unop(ValueType::F64, isa::Instruction::F64Nearest)?,
            F64Sqrt => self.unop(ValueType::F64, isa::Instruction::F64Sqrt)?,
            F64Add => self.binop(ValueType::F64, isa::Instruction::F64Add)?,
            F64Sub => self.binop(ValueType::F64, isa::Instruction::F64Sub)?,
            F64Mul => self.binop(ValueType::F64, isa::Instruction::F64Mul)?,
            F64Div => self.binop(ValueType::F64, isa::Instruction::F64Div)?,
            F64Min => self.binop(ValueType::F64, isa::Instruction::F64Min)?,
            F64Max => self.binop(ValueType::F64, isa::Instruction::F64Max)?,
            F64Copysign => self.binop(ValueType::F64, isa::Instruction::F64Copysign)?,

            I32WrapI64 => self.cvtop(ValueType::I64, ValueType::I32, isa::Instruction::I32WrapI64)?,
            I32TruncSF32 => self.cvtop(ValueType::F32, ValueType::I32, isa::Instruction::I32TruncSF32)?,
            I32TruncUF32 => self.cvtop(ValueType::F32, ValueType::I32, isa::Instruction::I32TruncUF32)?,
            I32TruncSF64 => self.cvtop(ValueType::F64, ValueType::I32, isa::Instruction::I32TruncSF64)?,
            I32TruncUF64 => self.cvtop(ValueType::F64, ValueType::I32, isa::Instruction::I32TruncUF64)?,
            I64ExtendSI32 => self.cvtop(ValueType::I32, ValueType::I64, isa::Instruction::I64ExtendSI32)?,
            I64ExtendUI32 => self.cvtop(ValueType::I32, ValueType::I64, isa::Instruction::I64ExtendUI32)?,
            I64TruncSF32 => self.cvtop(ValueType::F32, ValueType::I64, isa::Instruction::I64TruncSF32)?,
            I64TruncUF32 => self.cvtop(ValueType::F32, ValueType::I64, isa::Instruction::I64TruncUF32)?,
            I64TruncSF64 => self.cvtop(ValueType::F64, ValueType::I64, isa::Instruction::I64TruncSF64)?,
            I64TruncUF64 => self.cvtop(ValueType::F64, ValueType::I64, isa::Instruction::I64TruncUF64)?,
            F32ConvertSI32 => self.cvtop(ValueType::I32, ValueType::F32, isa::Instruction::F32ConvertSI32)?,
            F32ConvertUI32 => self.cvtop(ValueType::I32, ValueType::F32, isa::Instruction::F32ConvertUI32)?,
            F32ConvertSI64 => self.cvtop(ValueType::I64, ValueType::F32, isa::Instruction::F32ConvertSI64)?,
            F32ConvertUI64 => self.cvtop(ValueType::I64, ValueType::F32, isa::Instruction::F32ConvertUI64)?,
            F32DemoteF64 => self.cvtop(ValueType::F64, ValueType::F32, isa::Instruction::F32DemoteF64)?,
            F64ConvertSI32 => self.cvtop(ValueType::I32, ValueType::F64, isa::Instruction::F64ConvertSI32)?,
            F64ConvertUI32 => self.cvtop(ValueType::I32, ValueType::F64, isa::Instruction::F64ConvertUI32)?,
            F64ConvertSI64 => self.cvtop(ValueType::I64, ValueType::F64, isa::Instruction::F64ConvertSI64)?,
            F64ConvertUI64 => self.cvtop(ValueType::I64, ValueType::F64, isa::Instruction::F64ConvertUI64)?,
            F64PromoteF32 => self.cvtop(ValueType::F32, ValueType::F64, isa::Instruction::F64PromoteF32)?,

            I32ReinterpretF32 => self.cvtop(ValueType::F32, ValueType::I32, isa::Instruction::I32ReinterpretF32)?,
            I64ReinterpretF64 => self.cvtop(ValueType::F64, ValueType::I64, isa::Instruction::I64ReinterpretF64)?,
            F32ReinterpretI32 => self.cvtop(ValueType::I32, ValueType::F32, isa::Instruction::F32ReinterpretI32)?,
            F64ReinterpretI64 => self.cvtop(ValueType::I64, ValueType::F64, isa::Instruction::F64ReinterpretI64)?,

            ref other => {
                return Err(Error::Invalid(format!(
                    "unsupported instruction: {:?}",
                    other
                )))
            }
        }

        Ok(false)
    }

    // --- operand stack helpers -------------------------------------------------

    fn push(&mut self, ty: StackType) {
        self.value_stack.push(ty);
    }

    fn pop_any(&mut self) -> Result<StackType, Error> {
        let frame = self.frames.last().expect("frame stack is never empty mid-body");
        if self.value_stack.len() == frame.value_stack_len {
            if frame.polymorphic {
                return Ok(StackType::Any);
            }
            return Err(Error::Invalid("type stack size too small".into()));
        }
        Ok(self.value_stack.pop().expect("checked non-empty above"))
    }

    fn pop_expect(&mut self, expected: ValueType) -> Result<(), Error> {
        self.pop_expect_stack(expected.into())
    }

    fn pop_expect_stack(&mut self, expected: StackType) -> Result<(), Error> {
        let actual = self.pop_any()?;
        match (actual, expected) {
            (StackType::Any, _) | (_, StackType::Any) => Ok(()),
            (StackType::Concrete(a), StackType::Concrete(b)) if a == b => Ok(()),
            (StackType::Concrete(a), StackType::Concrete(b)) => Err(Error::Invalid(format!(
                "type mismatch: expected {}, found {}",
                b, a
            ))),
        }
    }

    fn tee_expect(&mut self, expected: ValueType) -> Result<(), Error> {
        self.pop_expect(expected)?;
        self.push(expected.into());
        Ok(())
    }

    fn top_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty mid-body")
    }

    fn push_frame(&mut self, kind: FrameKind, block_type: BlockType) -> Result<(), Error> {
        if self.frames.len() >= FRAME_STACK_LIMIT {
            return Err(Error::Invalid("control frame stack exhausted".into()));
        }
        self.frames.push(Frame {
            kind,
            block_type,
            value_stack_len: self.value_stack.len(),
            polymorphic: false,
        });
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<(), Error> {
        let block_type = self.top_frame().block_type;
        match block_type {
            BlockType::NoResult => {}
            BlockType::Value(vt) => self.pop_expect(ValueType::from_elements(vt))?,
        }
        let frame = self.frames.pop().expect("checked non-empty above");
        if self.value_stack.len() != frame.value_stack_len {
            return Err(Error::Invalid(format!(
                "type stack at end of block is {}, expected {}",
                self.value_stack.len(),
                frame.value_stack_len
            )));
        }
        Ok(())
    }

    fn local_type(&self, index: u32) -> Result<ValueType, Error> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::Invalid(format!("local index out of bounds: {}", index)))
    }

    fn relative_local_depth(&self, index: u32) -> Result<u32, Error> {
        let height = self.value_stack.len() as u32;
        let locals_count = self.locals.len() as u32;
        height
            .checked_add(locals_count)
            .and_then(|x| x.checked_sub(index))
            .ok_or_else(|| Error::Invalid("local depth computation overflowed".into()))
    }

    fn validate_branch_value(&mut self, depth: u32) -> Result<(), Error> {
        let frame = self.require_frame(depth)?;
        if !frame.kind.is_loop() {
            if let BlockType::Value(vt) = frame.block_type {
                self.tee_expect(ValueType::from_elements(vt))?;
            }
        }
        Ok(())
    }

    fn require_frame(&self, depth: u32) -> Result<&Frame, Error> {
        let len = self.frames.len();
        let idx = len
            .checked_sub(1)
            .and_then(|top| top.checked_sub(depth as usize))
            .ok_or_else(|| Error::Invalid(format!("branch depth {} out of bounds", depth)))?;
        Ok(&self.frames[idx])
    }

    fn br_table_required_type(&self, table: &[u32], default: u32) -> Result<BlockType, Error> {
        let default_frame = self.require_frame(default)?;
        let required = if !default_frame.kind.is_loop() {
            default_frame.block_type
        } else {
            BlockType::NoResult
        };
        for depth in table {
            let frame = self.require_frame(*depth)?;
            let frame_ty = if !frame.kind.is_loop() {
                frame.block_type
            } else {
                BlockType::NoResult
            };
            if frame_ty != required {
                return Err(Error::Invalid(
                    "br_table labels have mismatched block types".into(),
                ));
            }
        }
        Ok(required)
    }

    fn drop_keep_for_return(&self) -> isa::DropKeep {
        let depth = (self.frames.len() - 1) as u32;
        let (_, mut drop_keep) = self.branch_target(depth);
        drop_keep.drop += self.locals.len() as u32;
        drop_keep
    }

    /// Computes the label a branch of the given depth resolves to, and the
    /// drop/keep needed to unwind the operand stack down to that frame's height.
    fn branch_target(&self, depth: u32) -> (LabelId, isa::DropKeep) {
        let polymorphic = self.top_frame().polymorphic;
        let frame = self.require_frame(depth).expect("validated by caller");
        let keep = match (frame.kind, frame.block_type) {
            (FrameKind::Loop { .. }, _) => isa::Keep::None,
            (_, BlockType::Value(_)) => isa::Keep::Single,
            (_, BlockType::NoResult) => isa::Keep::None,
        };
        let drop = if polymorphic {
            0
        } else {
            let height = self.value_stack.len() as u32;
            (height - frame.value_stack_len as u32).saturating_sub(keep as u32)
        };
        (frame.kind.br_destination(), isa::DropKeep { drop, keep })
    }

    // --- label/relocation bookkeeping -------------------------------------------

    fn new_label(&mut self) -> LabelId {
        let id = self.labels.len();
        self.labels.push((Label::Unresolved, Vec::new()));
        LabelId(id)
    }

    fn resolve_label(&mut self, label: LabelId) {
        let dst_pc = self.instructions.current_pc();
        let unresolved = core::mem::take(&mut self.labels[label.0].1);
        for reloc in unresolved {
            self.instructions.patch_relocation(reloc, dst_pc);
        }
        self.labels[label.0] = (Label::Resolved(dst_pc), Vec::new());
    }

    fn emit(&mut self, instruction: isa::Instruction) {
        self.instructions.push(instruction);
    }

    fn label_dst_pc(&mut self, label: LabelId, reloc: isa::Reloc) -> u32 {
        match self.labels[label.0] {
            (Label::Resolved(dst_pc), _) => dst_pc,
            (Label::Unresolved, ref mut pending) => {
                pending.push(reloc);
                u32::max_value()
            }
        }
    }

    fn emit_br(&mut self, label: LabelId, drop_keep: isa::DropKeep) {
        let pc = self.instructions.current_pc();
        let dst_pc = self.label_dst_pc(label, isa::Reloc::Br { pc });
        self.emit(isa::Instruction::Br(isa::Target { dst_pc, drop_keep }));
    }

    fn emit_br_if_eqz(&mut self, label: LabelId, drop_keep: isa::DropKeep) {
        let pc = self.instructions.current_pc();
        let dst_pc = self.label_dst_pc(label, isa::Reloc::Br { pc });
        self.emit(isa::Instruction::BrIfEqz(isa::Target { dst_pc, drop_keep }));
    }

    fn emit_br_if_nez(&mut self, label: LabelId, drop_keep: isa::DropKeep) {
        let pc = self.instructions.current_pc();
        let dst_pc = self.label_dst_pc(label, isa::Reloc::Br { pc });
        self.emit(isa::Instruction::BrIfNez(isa::Target { dst_pc, drop_keep }));
    }

    fn emit_br_table(
        &mut self,
        targets: &[(LabelId, isa::DropKeep)],
        default: (LabelId, isa::DropKeep),
    ) {
        let pc = self.instructions.current_pc();
        let mut resolved = Vec::with_capacity(targets.len() + 1);
        for (idx, (label, drop_keep)) in targets.iter().chain(core::iter::once(&default)).enumerate() {
            let dst_pc = self.label_dst_pc(*label, isa::Reloc::BrTable { pc, idx });
            resolved.push(isa::Target {
                dst_pc,
                drop_keep: *drop_keep,
            });
        }
        self.emit(isa::Instruction::BrTable(resolved.into_boxed_slice()));
    }

    fn load(&mut self, align: u32, max_align: u32, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        check_alignment(align, max_align)?;
        self.pop_expect(ValueType::I32)?;
        self.module.require_memory(DEFAULT_MEMORY_INDEX)?;
        self.push(ty.into());
        self.emit(instr);
        Ok(())
    }

    fn store(&mut self, align: u32, max_align: u32, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        check_alignment(align, max_align)?;
        self.module.require_memory(DEFAULT_MEMORY_INDEX)?;
        self.pop_expect(ty)?;
        self.pop_expect(ValueType::I32)?;
        self.emit(instr);
        Ok(())
    }

    fn unop(&mut self, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        self.pop_expect(ty)?;
        self.push(ty.into());
        self.emit(instr);
        Ok(())
    }

    fn binop(&mut self, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        self.pop_expect(ty)?;
        self.pop_expect(ty)?;
        self.push(ty.into());
        self.emit(instr);
        Ok(())
    }

    fn testop(&mut self, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        self.pop_expect(ty)?;
        self.push(ValueType::I32.into());
        self.emit(instr);
        Ok(())
    }

    fn relop(&mut self, ty: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        self.pop_expect(ty)?;
        self.pop_expect(ty)?;
        self.push(ValueType::I32.into());
        self.emit(instr);
        Ok(())
    }

    fn cvtop(&mut self, from: ValueType, to: ValueType, instr: isa::Instruction) -> Result<(), Error> {
        self.pop_expect(from)?;
        self.push(to.into());
        self.emit(instr);
        Ok(())
    }
}

fn check_alignment(align: u32, max_align: u32) -> Result<(), Error> {
    if 1u32.checked_shl(align).unwrap_or(u32::MAX) > max_align {
        return Err(Error::Invalid(format!(
            "alignment 2^{} exceeds natural alignment {}",
            align, max_align
        )));
    }
    Ok(())
}

fn to_elements_value_type(vt: ValueType) -> elements::ValueType {
    match vt {
        ValueType::I32 => elements::ValueType::I32,
        ValueType::I64 => elements::ValueType::I64,
        ValueType::F32 => elements::ValueType::F32,
        ValueType::F64 => elements::ValueType::F64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::decode_module;

    fn compile(wat: &str) -> Result<ValidatedModule, Error> {
        let wasm = wat::parse_str(wat).unwrap();
        let module = decode_module(&wasm).unwrap();
        validate_module(module)
    }

    #[test]
    fn simple_function_compiles() {
        let result = compile("(module (func (result i32) i32.const 1 i32.const 2 i32.add))");
        assert!(result.is_ok());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let result = compile("(module (func (result i32) f32.const 1.0))");
        match result {
            Err(Error::Invalid(msg)) => assert!(msg.contains("type mismatch")),
            other => panic!("expected Invalid(..type mismatch..), got {:?}", other),
        }
    }

    #[test]
    fn stack_underflow_at_return_is_rejected() {
        let result = compile("(module (func (result i32)))");
        match result {
            Err(Error::Invalid(_)) => {}
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_export_is_rejected() {
        let result = compile(
            r#"(module
                 (func $a)
                 (func $b)
                 (export "f" (func $a))
                 (export "f" (func $b))
               )"#,
        );
        match result {
            Err(Error::Invalid(msg)) => assert!(msg.contains("duplicate export")),
            other => panic!("expected duplicate export error, got {:?}", other),
        }
    }
}
