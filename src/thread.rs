//! Execution: runs a function's compiled instruction stream against a flat value
//! stack shared by every active call frame.
//!
//! Unlike the teacher's `Interpreter`, this engine is not resumable. A host call
//! invoked mid-execution runs to completion synchronously (see
//! [`crate::host::Externals`]) rather than suspending the interpreter loop, so there
//! is no `InterpreterState::Resumable` variant threaded through every call site.
//! Locals are addressed the same way the compiled instruction stream is built to
//! expect: `GetLocal`/`SetLocal`/`TeeLocal` carry a depth relative to the *current*
//! stack height, so a single global stack with no per-frame base offset is enough —
//! see `isa.rs`'s module doc for the full picture.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::config::Config;
use crate::environment::{DefinedModule, Environment, ModuleInstance};
use crate::func::{FuncBody, FuncInstanceInternal, FuncRef};
use crate::host::{Externals, RuntimeArgs};
use crate::isa::{self, Instruction, Keep};
use crate::nan_preserving_float::{F32, F64};
use crate::trap::{Trap, TrapKind};
use crate::types::ValueType;
use crate::value::{
    ArithmeticOps, ExtendInto, Float, FromRuntimeValue, Integer, LittleEndianConvert, RuntimeValue,
    TransmuteInto, TryTruncateInto, WrapInto,
};

const DEFAULT_MEMORY_INDEX: u32 = 0;
const DEFAULT_TABLE_INDEX: u32 = 0;

/// One active (non-host) call: the function's compiled body, the Environment index
/// of the module it was defined in (for remapping its module-local index spaces),
/// and the program counter to resume at.
struct Frame {
    body: Rc<FuncBody>,
    module_index: u32,
    pc: u32,
}

/// A single interpreter run: a value stack shared across every frame on the call
/// stack, bounded by [`Config::value_stack_size`] and [`Config::call_stack_size`].
pub struct Thread<'env> {
    env: &'env mut Environment,
    value_stack: Vec<RuntimeValue>,
    call_stack: Vec<Frame>,
    config: Config,
}

/// What the dispatch loop should do after executing one instruction.
enum Step {
    Continue,
    Branch(isa::Target),
    Return(isa::DropKeep),
    Enter(Frame),
}

impl<'env> Thread<'env> {
    pub fn new(env: &'env mut Environment, config: Config) -> Thread<'env> {
        Thread {
            env,
            value_stack: Vec::new(),
            call_stack: Vec::new(),
            config,
        }
    }

    /// Invokes `func` with `args`, running it (and any defined function it calls) to
    /// completion. The caller is expected to have already checked `args` against
    /// `func`'s signature — see `check_function_args` at the public API boundary.
    pub fn invoke(
        &mut self,
        func: &FuncRef,
        args: &[RuntimeValue],
        externals: &mut dyn Externals,
    ) -> Result<Option<RuntimeValue>, Trap> {
        let signature = func.signature().clone();
        debug_assert_eq!(args.len(), signature.params().len());

        let base = self.value_stack.len();
        for arg in args {
            self.push(*arg)?;
        }

        match func.as_internal() {
            FuncInstanceInternal::Host { host_func_index, .. } => {
                let result = {
                    let slice = &self.value_stack[base..];
                    externals.invoke_index(*host_func_index, RuntimeArgs::from(slice))?
                };
                self.value_stack.truncate(base);
                Ok(result)
            }
            FuncInstanceInternal::Defined { module_index, body, .. } => {
                self.push_locals(&body.locals)?;
                self.push_frame(Frame {
                    body: Rc::clone(body),
                    module_index: *module_index,
                    pc: 0,
                })?;
                self.run(externals)?;
                let result = if signature.return_type().is_some() {
                    Some(self.value_stack.pop().expect("Return left the result on the stack"))
                } else {
                    None
                };
                debug_assert_eq!(self.value_stack.len(), base);
                Ok(result)
            }
        }
    }

    fn push_locals(&mut self, locals: &[ValueType]) -> Result<(), Trap> {
        for ty in locals {
            self.push(RuntimeValue::default(*ty))?;
        }
        Ok(())
    }

    fn push(&mut self, value: RuntimeValue) -> Result<(), Trap> {
        if self.value_stack.len() >= self.config.value_stack_size {
            return Err(Trap::new(TrapKind::ValueStackExhausted));
        }
        self.value_stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> RuntimeValue {
        self.value_stack.pop().expect("validated: operand stack underflow can't happen")
    }

    fn pop_typed<T: FromRuntimeValue>(&mut self) -> T {
        self.pop().try_into().expect("validated: operand type matches opcode")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), Trap> {
        if self.call_stack.len() >= self.config.call_stack_size {
            return Err(Trap::new(TrapKind::CallStackExhausted));
        }
        self.call_stack.push(frame);
        Ok(())
    }

    /// Discards `drop_keep.drop` values from the top of the stack, optionally
    /// keeping one value above the drop.
    fn apply_drop_keep(&mut self, drop_keep: isa::DropKeep) {
        let keep = match drop_keep.keep {
            Keep::None => None,
            Keep::Single => Some(self.pop()),
        };
        let new_len = self.value_stack.len() - drop_keep.drop as usize;
        self.value_stack.truncate(new_len);
        if let Some(value) = keep {
            self.value_stack.push(value);
        }
    }

    fn pick(&self, depth: u32) -> RuntimeValue {
        self.value_stack[self.value_stack.len() - depth as usize]
    }

    fn pick_mut(&mut self, depth: u32) -> &mut RuntimeValue {
        let len = self.value_stack.len();
        &mut self.value_stack[len - depth as usize]
    }

    fn defined_module(&self, module_index: u32) -> &DefinedModule {
        match self.env.module(module_index) {
            ModuleInstance::Defined(module) => module,
            ModuleInstance::Host(_) => unreachable!("frames only run inside defined modules"),
        }
    }

    fn current_module_index(&self) -> u32 {
        self.call_stack.last().expect("in a frame").module_index
    }

    fn current_memory_index(&self) -> u32 {
        self.defined_module(self.current_module_index())
            .memory_at(DEFAULT_MEMORY_INDEX)
    }

    /// Runs until the call stack empties back out (the initial call returned).
    fn run(&mut self, externals: &mut dyn Externals) -> Result<(), Trap> {
        loop {
            let frame_depth = self.call_stack.len();
            let frame = self.call_stack.last().expect("run is only entered with a frame pushed");
            let pc = frame.pc;
            let instr = frame
                .body
                .code
                .get(pc)
                .expect("compiled code always ends in an explicit Return")
                .clone();

            if self.config.trace {
                self.trace(frame_depth, pc, &instr);
            }

            self.call_stack.last_mut().expect("checked above").pc += 1;

            match self.step(instr, externals)? {
                Step::Continue => {}
                Step::Branch(target) => {
                    self.apply_drop_keep(target.drop_keep);
                    self.call_stack.last_mut().expect("checked above").pc = target.dst_pc;
                }
                Step::Return(drop_keep) => {
                    self.apply_drop_keep(drop_keep);
                    self.call_stack.pop();
                    if self.call_stack.is_empty() {
                        return Ok(());
                    }
                }
                Step::Enter(frame) => {
                    self.push_frame(frame)?;
                }
            }
        }
    }

    fn trace(&mut self, depth: usize, pc: u32, instr: &Instruction) {
        if let Some(sink) = self.config.log_stream.as_deref_mut() {
            sink.write_trace(&format_args!("{:>4}@{:<5} {:?}", depth, pc, instr));
        }
    }

    fn step(&mut self, instr: Instruction, externals: &mut dyn Externals) -> Result<Step, Trap> {
        use Instruction::*;

        match instr {
            GetLocal(depth) => {
                let value = self.pick(depth);
                self.push(value)?;
            }
            SetLocal(depth) => {
                let value = self.pop();
                *self.pick_mut(depth) = value;
            }
            TeeLocal(depth) => {
                let top = *self.value_stack.last().expect("validated: non-empty stack");
                *self.pick_mut(depth) = top;
            }

            Br(target) => return Ok(Step::Branch(target)),
            BrIfEqz(target) => {
                let condition: i32 = self.pop_typed();
                if condition == 0 {
                    return Ok(Step::Branch(target));
                }
            }
            BrIfNez(target) => {
                let condition: i32 = self.pop_typed();
                if condition != 0 {
                    return Ok(Step::Branch(target));
                }
            }
            BrTable(targets) => {
                let index: i32 = self.pop_typed();
                let target = targets
                    .get(index as usize)
                    .unwrap_or_else(|| targets.last().expect("br_table always has a default"));
                return Ok(Step::Branch(target.clone()));
            }

            Unreachable => return Err(Trap::new(TrapKind::Unreachable)),
            Return(drop_keep) => return Ok(Step::Return(drop_keep)),

            Call(func_idx) => {
                let env_func_idx = self.defined_module(self.current_module_index()).func_at(func_idx);
                return self.enter_call(env_func_idx, externals);
            }
            CallIndirect(type_idx) => {
                let module = self.defined_module(self.current_module_index());
                let table_env_idx = module.table_at(DEFAULT_TABLE_INDEX);
                let expected_sig = module.signature_at(type_idx).clone();
                let elem_index: i32 = self.pop_typed();
                let slot = self
                    .env
                    .table(table_env_idx)
                    .get(elem_index as u32)
                    .ok_or_else(|| Trap::new(TrapKind::UndefinedTableIndex))?;
                let env_func_idx = slot.ok_or_else(|| Trap::new(TrapKind::UninitializedElement))?;
                if self.env.func(env_func_idx).signature() != &expected_sig {
                    return Err(Trap::new(TrapKind::IndirectCallSignatureMismatch));
                }
                return self.enter_call(env_func_idx, externals);
            }

            Drop => {
                self.pop();
            }
            Select => {
                let condition: i32 = self.pop_typed();
                let on_false = self.pop();
                let on_true = self.pop();
                self.push(if condition != 0 { on_true } else { on_false })?;
            }

            GetGlobal(idx) => {
                let env_idx = self.defined_module(self.current_module_index()).global_at(idx);
                let value = self.env.get_global(env_idx).get();
                self.push(value)?;
            }
            SetGlobal(idx) => {
                let env_idx = self.defined_module(self.current_module_index()).global_at(idx);
                let value = self.pop();
                self.env
                    .get_global(env_idx)
                    .set(value)
                    .expect("validated: global is mutable and type-correct");
            }

            I32Load(offset) => self.run_load::<i32>(offset)?,
            I64Load(offset) => self.run_load::<i64>(offset)?,
            F32Load(offset) => self.run_load::<F32>(offset)?,
            F64Load(offset) => self.run_load::<F64>(offset)?,
            I32Load8S(offset) => self.run_load_extend::<i8, i32>(offset)?,
            I32Load8U(offset) => self.run_load_extend::<u8, i32>(offset)?,
            I32Load16S(offset) => self.run_load_extend::<i16, i32>(offset)?,
            I32Load16U(offset) => self.run_load_extend::<u16, i32>(offset)?,
            I64Load8S(offset) => self.run_load_extend::<i8, i64>(offset)?,
            I64Load8U(offset) => self.run_load_extend::<u8, i64>(offset)?,
            I64Load16S(offset) => self.run_load_extend::<i16, i64>(offset)?,
            I64Load16U(offset) => self.run_load_extend::<u16, i64>(offset)?,
            I64Load32S(offset) => self.run_load_extend::<i32, i64>(offset)?,
            I64Load32U(offset) => self.run_load_extend::<u32, i64>(offset)?,

            I32Store(offset) => self.run_store::<i32>(offset)?,
            I64Store(offset) => self.run_store::<i64>(offset)?,
            F32Store(offset) => self.run_store::<F32>(offset)?,
            F64Store(offset) => self.run_store::<F64>(offset)?,
            I32Store8(offset) => self.run_store_wrap::<i32, i8>(offset)?,
            I32Store16(offset) => self.run_store_wrap::<i32, i16>(offset)?,
            I64Store8(offset) => self.run_store_wrap::<i64, i8>(offset)?,
            I64Store16(offset) => self.run_store_wrap::<i64, i16>(offset)?,
            I64Store32(offset) => self.run_store_wrap::<i64, i32>(offset)?,

            CurrentMemory => {
                let env_idx = self.current_memory_index();
                let pages = self.env.memory(env_idx).current_size();
                self.push(RuntimeValue::I32(pages as i32))?;
            }
            GrowMemory => {
                let env_idx = self.current_memory_index();
                let additional: i32 = self.pop_typed();
                let result = self
                    .env
                    .memory(env_idx)
                    .grow(additional as u32)
                    .map(|before| before as i32)
                    .unwrap_or(-1);
                self.push(RuntimeValue::I32(result))?;
            }

            I32Const(v) => self.push(RuntimeValue::I32(v))?,
            I64Const(v) => self.push(RuntimeValue::I64(v))?,
            F32Const(bits) => self.push(RuntimeValue::F32(F32::from_bits(bits)))?,
            F64Const(bits) => self.push(RuntimeValue::F64(F64::from_bits(bits)))?,

            I32Eqz => {
                let v: i32 = self.pop_typed();
                self.push(RuntimeValue::I32((v == 0) as i32))?;
            }
            I32Eq => self.relop::<i32>(|a, b| a == b)?,
            I32Ne => self.relop::<i32>(|a, b| a != b)?,
            I32LtS => self.relop::<i32>(|a, b| a < b)?,
            I32LtU => self.relop::<u32>(|a, b| a < b)?,
            I32GtS => self.relop::<i32>(|a, b| a > b)?,
            I32GtU => self.relop::<u32>(|a, b| a > b)?,
            I32LeS => self.relop::<i32>(|a, b| a <= b)?,
            I32LeU => self.relop::<u32>(|a, b| a <= b)?,
            I32GeS => self.relop::<i32>(|a, b| a >= b)?,
            I32GeU => self.relop::<u32>(|a, b| a >= b)?,

            I64Eqz => {
                let v: i64 = self.pop_typed();
                self.push(RuntimeValue::I32((v == 0) as i32))?;
            }
            I64Eq => self.relop::<i64>(|a, b| a == b)?,
            I64Ne => self.relop::<i64>(|a, b| a != b)?,
            I64LtS => self.relop::<i64>(|a, b| a < b)?,
            I64LtU => self.relop::<u64>(|a, b| a < b)?,
            I64GtS => self.relop::<i64>(|a, b| a > b)?,
            I64GtU => self.relop::<u64>(|a, b| a > b)?,
            I64LeS => self.relop::<i64>(|a, b| a <= b)?,
            I64LeU => self.relop::<u64>(|a, b| a <= b)?,
            I64GeS => self.relop::<i64>(|a, b| a >= b)?,
            I64GeU => self.relop::<u64>(|a, b| a >= b)?,

            F32Eq => self.relop::<F32>(|a, b| a == b)?,
            F32Ne => self.relop::<F32>(|a, b| a != b)?,
            F32Lt => self.relop::<F32>(|a, b| a < b)?,
            F32Gt => self.relop::<F32>(|a, b| a > b)?,
            F32Le => self.relop::<F32>(|a, b| a <= b)?,
            F32Ge => self.relop::<F32>(|a, b| a >= b)?,

            F64Eq => self.relop::<F64>(|a, b| a == b)?,
            F64Ne => self.relop::<F64>(|a, b| a != b)?,
            F64Lt => self.relop::<F64>(|a, b| a < b)?,
            F64Gt => self.relop::<F64>(|a, b| a > b)?,
            F64Le => self.relop::<F64>(|a, b| a <= b)?,
            F64Ge => self.relop::<F64>(|a, b| a >= b)?,

            I32Clz => self.unop::<i32>(Integer::leading_zeros)?,
            I32Ctz => self.unop::<i32>(Integer::trailing_zeros)?,
            I32Popcnt => self.unop::<i32>(Integer::count_ones)?,
            I32Add => self.binop::<i32>(ArithmeticOps::add)?,
            I32Sub => self.binop::<i32>(ArithmeticOps::sub)?,
            I32Mul => self.binop::<i32>(ArithmeticOps::mul)?,
            I32DivS => self.checked_binop::<i32>(ArithmeticOps::div)?,
            I32DivU => self.checked_binop::<u32>(ArithmeticOps::div)?,
            I32RemS => self.checked_binop::<i32>(Integer::rem)?,
            I32RemU => self.checked_binop::<u32>(Integer::rem)?,
            I32And => self.binop::<i32>(|a, b| a & b)?,
            I32Or => self.binop::<i32>(|a, b| a | b)?,
            I32Xor => self.binop::<i32>(|a, b| a ^ b)?,
            I32Shl => self.binop::<i32>(|a, b| a.wrapping_shl(b as u32))?,
            I32ShrS => self.binop::<i32>(|a, b| a.wrapping_shr(b as u32))?,
            I32ShrU => self.binop::<u32>(|a, b| a.wrapping_shr(b))?,
            I32Rotl => self.binop::<i32>(Integer::rotl)?,
            I32Rotr => self.binop::<i32>(Integer::rotr)?,

            I64Clz => self.unop::<i64>(Integer::leading_zeros)?,
            I64Ctz => self.unop::<i64>(Integer::trailing_zeros)?,
            I64Popcnt => self.unop::<i64>(Integer::count_ones)?,
            I64Add => self.binop::<i64>(ArithmeticOps::add)?,
            I64Sub => self.binop::<i64>(ArithmeticOps::sub)?,
            I64Mul => self.binop::<i64>(ArithmeticOps::mul)?,
            I64DivS => self.checked_binop::<i64>(ArithmeticOps::div)?,
            I64DivU => self.checked_binop::<u64>(ArithmeticOps::div)?,
            I64RemS => self.checked_binop::<i64>(Integer::rem)?,
            I64RemU => self.checked_binop::<u64>(Integer::rem)?,
            I64And => self.binop::<i64>(|a, b| a & b)?,
            I64Or => self.binop::<i64>(|a, b| a | b)?,
            I64Xor => self.binop::<i64>(|a, b| a ^ b)?,
            I64Shl => self.binop::<i64>(|a, b| a.wrapping_shl(b as u32))?,
            I64ShrS => self.binop::<i64>(|a, b| a.wrapping_shr(b as u32))?,
            I64ShrU => self.binop::<u64>(|a, b| a.wrapping_shr(b as u32))?,
            I64Rotl => self.binop::<i64>(Integer::rotl)?,
            I64Rotr => self.binop::<i64>(Integer::rotr)?,

            F32Abs => self.unop::<F32>(Float::abs)?,
            F32Neg => self.unop::<F32>(|v| -v)?,
            F32Ceil => self.unop::<F32>(Float::ceil)?,
            F32Floor => self.unop::<F32>(Float::floor)?,
            F32Trunc => self.unop::<F32>(Float::trunc)?,
            F32Nearest => self.unop::<F32>(Float::nearest)?,
            F32Sqrt => self.unop::<F32>(Float::sqrt)?,
            F32Add => self.binop::<F32>(|a, b| a + b)?,
            F32Sub => self.binop::<F32>(|a, b| a - b)?,
            F32Mul => self.binop::<F32>(|a, b| a * b)?,
            F32Div => self.binop::<F32>(|a, b| a / b)?,
            F32Min => self.binop::<F32>(Float::min)?,
            F32Max => self.binop::<F32>(Float::max)?,
            F32Copysign => self.binop::<F32>(Float::copysign)?,

            F64Abs => self.unop::<F64>(Float::abs)?,
            F64Neg => self.unop::<F64>(|v| -v)?,
            F64Ceil => self.unop::<F64>(Float::ceil)?,
            F64Floor => self.unop::<F64>(Float::floor)?,
            F64Trunc => self.unop::<F64>(Float::trunc)?,
            F64Nearest => self.unop::<F64>(Float::nearest)?,
            F64Sqrt => self.unop::<F64>(Float::sqrt)?,
            F64Add => self.binop::<F64>(|a, b| a + b)?,
            F64Sub => self.binop::<F64>(|a, b| a - b)?,
            F64Mul => self.binop::<F64>(|a, b| a * b)?,
            F64Div => self.binop::<F64>(|a, b| a / b)?,
            F64Min => self.binop::<F64>(Float::min)?,
            F64Max => self.binop::<F64>(Float::max)?,
            F64Copysign => self.binop::<F64>(Float::copysign)?,

            I32WrapI64 => self.wrap::<i64, i32>()?,
            I32TruncSF32 => self.trunc::<F32, i32>()?,
            I32TruncUF32 => self.trunc::<F32, u32>()?,
            I32TruncSF64 => self.trunc::<F64, i32>()?,
            I32TruncUF64 => self.trunc::<F64, u32>()?,
            I64ExtendSI32 => self.extend::<i32, i64>()?,
            I64ExtendUI32 => self.extend::<u32, i64>()?,
            I64TruncSF32 => self.trunc::<F32, i64>()?,
            I64TruncUF32 => self.trunc::<F32, u64>()?,
            I64TruncSF64 => self.trunc::<F64, i64>()?,
            I64TruncUF64 => self.trunc::<F64, u64>()?,
            F32ConvertSI32 => self.extend::<i32, F32>()?,
            F32ConvertUI32 => self.extend::<u32, F32>()?,
            F32ConvertSI64 => self.wrap::<i64, F32>()?,
            F32ConvertUI64 => self.wrap::<u64, F32>()?,
            F32DemoteF64 => self.wrap::<F64, F32>()?,
            F64ConvertSI32 => self.extend::<i32, F64>()?,
            F64ConvertUI32 => self.extend::<u32, F64>()?,
            F64ConvertSI64 => self.extend::<i64, F64>()?,
            F64ConvertUI64 => self.extend::<u64, F64>()?,
            F64PromoteF32 => self.extend::<F32, F64>()?,

            I32ReinterpretF32 => self.transmute::<F32, i32>()?,
            I64ReinterpretF64 => self.transmute::<F64, i64>()?,
            F32ReinterpretI32 => self.transmute::<i32, F32>()?,
            F64ReinterpretI64 => self.transmute::<i64, F64>()?,
        }

        Ok(Step::Continue)
    }

    /// Dispatches a call to `env_func_idx`: a host function runs synchronously and
    /// resumes the current frame, while a defined function becomes a new frame for
    /// the caller (`run`) to push.
    fn enter_call(&mut self, env_func_idx: u32, externals: &mut dyn Externals) -> Result<Step, Trap> {
        let func = self.env.func(env_func_idx).clone();
        match func.as_internal() {
            FuncInstanceInternal::Host { host_func_index, signature } => {
                let arg_count = signature.params().len();
                let base = self.value_stack.len() - arg_count;
                let result = {
                    let slice = &self.value_stack[base..];
                    externals.invoke_index(*host_func_index, RuntimeArgs::from(slice))?
                };
                self.value_stack.truncate(base);
                if let Some(value) = result {
                    self.push(value)?;
                }
                Ok(Step::Continue)
            }
            FuncInstanceInternal::Defined { module_index, body, .. } => {
                self.push_locals(&body.locals)?;
                Ok(Step::Enter(Frame {
                    body: Rc::clone(body),
                    module_index: *module_index,
                    pc: 0,
                }))
            }
        }
    }

    fn run_load<T>(&mut self, offset: u32) -> Result<(), Trap>
    where
        T: LittleEndianConvert + Into<RuntimeValue>,
    {
        let env_idx = self.current_memory_index();
        let addr: i32 = self.pop_typed();
        let addr = (addr as u32)
            .checked_add(offset)
            .ok_or_else(|| Trap::new(TrapKind::MemoryAccessOutOfBounds))?;
        let value: T = self.env.memory(env_idx).get_value(addr)?;
        self.push(value.into())
    }

    fn run_load_extend<T, U>(&mut self, offset: u32) -> Result<(), Trap>
    where
        T: LittleEndianConvert,
        U: From<T> + Into<RuntimeValue>,
    {
        let env_idx = self.current_memory_index();
        let addr: i32 = self.pop_typed();
        let addr = (addr as u32)
            .checked_add(offset)
            .ok_or_else(|| Trap::new(TrapKind::MemoryAccessOutOfBounds))?;
        let narrow: T = self.env.memory(env_idx).get_value(addr)?;
        self.push(U::from(narrow).into())
    }

    fn run_store<T>(&mut self, offset: u32) -> Result<(), Trap>
    where
        T: LittleEndianConvert + FromRuntimeValue,
    {
        let env_idx = self.current_memory_index();
        let value: T = self.pop_typed();
        let addr: i32 = self.pop_typed();
        let addr = (addr as u32)
            .checked_add(offset)
            .ok_or_else(|| Trap::new(TrapKind::MemoryAccessOutOfBounds))?;
        self.env.memory(env_idx).set_value(addr, value)
    }

    fn run_store_wrap<T, U>(&mut self, offset: u32) -> Result<(), Trap>
    where
        T: FromRuntimeValue + WrapInto<U>,
        U: LittleEndianConvert,
    {
        let env_idx = self.current_memory_index();
        let value: T = self.pop_typed();
        let narrow = value.wrap_into();
        let addr: i32 = self.pop_typed();
        let addr = (addr as u32)
            .checked_add(offset)
            .ok_or_else(|| Trap::new(TrapKind::MemoryAccessOutOfBounds))?;
        self.env.memory(env_idx).set_value(addr, narrow)
    }

    fn unop<T>(&mut self, f: impl FnOnce(T) -> T) -> Result<(), Trap>
    where
        T: FromRuntimeValue + Into<RuntimeValue>,
    {
        let v: T = self.pop_typed();
        self.push(f(v).into())
    }

    fn binop<T>(&mut self, f: impl FnOnce(T, T) -> T) -> Result<(), Trap>
    where
        T: FromRuntimeValue + Into<RuntimeValue>,
    {
        let b: T = self.pop_typed();
        let a: T = self.pop_typed();
        self.push(f(a, b).into())
    }

    fn checked_binop<T>(&mut self, f: impl FnOnce(T, T) -> Result<T, TrapKind>) -> Result<(), Trap>
    where
        T: FromRuntimeValue + Into<RuntimeValue>,
    {
        let b: T = self.pop_typed();
        let a: T = self.pop_typed();
        self.push(f(a, b).map_err(Trap::new)?.into())
    }

    fn relop<T>(&mut self, f: impl FnOnce(T, T) -> bool) -> Result<(), Trap>
    where
        T: FromRuntimeValue,
    {
        let b: T = self.pop_typed();
        let a: T = self.pop_typed();
        self.push(RuntimeValue::I32(f(a, b) as i32))
    }

    fn wrap<T, U>(&mut self) -> Result<(), Trap>
    where
        T: FromRuntimeValue + WrapInto<U>,
        U: Into<RuntimeValue>,
    {
        let v: T = self.pop_typed();
        self.push(v.wrap_into().into())
    }

    fn extend<T, U>(&mut self) -> Result<(), Trap>
    where
        T: FromRuntimeValue + ExtendInto<U>,
        U: Into<RuntimeValue>,
    {
        let v: T = self.pop_typed();
        self.push(v.extend_into().into())
    }

    fn transmute<T, U>(&mut self) -> Result<(), Trap>
    where
        T: FromRuntimeValue + TransmuteInto<U>,
        U: Into<RuntimeValue>,
    {
        let v: T = self.pop_typed();
        self.push(v.transmute_into().into())
    }

    fn trunc<T, U>(&mut self) -> Result<(), Trap>
    where
        T: FromRuntimeValue + TryTruncateInto<U, TrapKind>,
        U: Into<RuntimeValue>,
    {
        let v: T = self.pop_typed();
        let result = v.try_truncate_into().map_err(Trap::new)?;
        self.push(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::FuncInstance;
    use crate::types::Signature;

    fn new_env() -> Environment {
        Environment::new()
    }

    #[test]
    fn apply_drop_keep_keeps_single_value() {
        let mut env = new_env();
        let mut thread = Thread::new(&mut env, Config::default());
        thread.value_stack = alloc::vec![RuntimeValue::I32(1), RuntimeValue::I32(2), RuntimeValue::I32(3)];
        thread.apply_drop_keep(isa::DropKeep {
            drop: 2,
            keep: Keep::Single,
        });
        assert_eq!(thread.value_stack, alloc::vec![RuntimeValue::I32(3)]);
    }

    #[test]
    fn value_stack_exhaustion_traps() {
        let mut env = new_env();
        let mut config = Config::default();
        config.value_stack_size = 1;
        let mut thread = Thread::new(&mut env, config);
        thread.push(RuntimeValue::I32(0)).unwrap();
        let err = thread.push(RuntimeValue::I32(1)).unwrap_err();
        assert!(matches!(err.kind(), TrapKind::ValueStackExhausted));
    }

    #[test]
    fn invoke_host_function_round_trips_result() {
        struct Double;
        impl Externals for Double {
            fn invoke_index(
                &mut self,
                _index: usize,
                args: RuntimeArgs,
            ) -> Result<Option<RuntimeValue>, Trap> {
                let v: i32 = args.nth_checked(0)?;
                Ok(Some(RuntimeValue::I32(v * 2)))
            }
        }

        let mut env = new_env();
        let func = FuncInstance::alloc_host(Signature::new(&[ValueType::I32][..], Some(ValueType::I32)), 0);
        let mut thread = Thread::new(&mut env, Config::default());
        let result = thread
            .invoke(&func, &[RuntimeValue::I32(21)], &mut Double)
            .unwrap();
        assert_eq!(result, Some(RuntimeValue::I32(42)));
    }
}
