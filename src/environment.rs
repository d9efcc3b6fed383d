//! The linker: an append-only registry of every function, table, memory, global, and
//! module the engine has ever loaded, plus the name bindings used to resolve imports.
//!
//! This is not a port of the teacher's `ModuleInstance`/`ImportResolver` linking
//! model — that model gives every module its own `Rc`-counted web of dependencies.
//! Here, instead, one `Environment` owns everything: a module never holds a
//! reference to another module, only plain indices into the Environment's own
//! arenas (see `DESIGN.md`, "back-references from a module to the environment").
//! That's what makes `mark`/`reset_to_mark` possible — undoing a failed load is
//! just truncating five vectors back to their recorded lengths.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use parity_wasm::elements::{self, External, Instruction as Op, Internal};

use crate::func::{FuncBody, FuncInstance, FuncRef};
use crate::global::{GlobalInstance, GlobalRef};
use crate::host::HostModuleDelegate;
use crate::memory::{MemoryInstance, MemoryRef};
use crate::table::{TableInstance, TableRef};
use crate::trap::Error;
use crate::types::{GlobalType, MemoryType, Signature, TableType, ValueType};
use crate::validator::ValidatedModule;

/// A (name, kind, Environment-arena index) triple, the resolved form of an export
/// or the per-module index-space entry for an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extern {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

/// A module that was loaded from a Wasm binary: its own index spaces (each entry is
/// an Environment-arena index, imports first, then locally-defined entries), its
/// export table, and its start function's index within its own func index space.
pub struct DefinedModule {
    funcs: Vec<u32>,
    tables: Vec<u32>,
    memories: Vec<u32>,
    globals: Vec<u32>,
    /// The module's own type section, kept around so `call_indirect` can check a
    /// table entry's signature against the type index named at the call site.
    types: Vec<Signature>,
    exports: BTreeMap<String, Extern>,
    start: Option<u32>,
}

impl DefinedModule {
    pub fn get_export(&self, name: &str) -> Option<Extern> {
        self.exports.get(name).copied()
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, Extern)> {
        self.exports.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The start function's Environment-arena index, if this module declares one.
    pub fn start_func_index(&self) -> Option<u32> {
        self.start.map(|local| self.funcs[local as usize])
    }

    /// Maps a module-local function index to its Environment-arena index.
    pub(crate) fn func_at(&self, local_idx: u32) -> u32 {
        self.funcs[local_idx as usize]
    }

    /// Maps a module-local table index to its Environment-arena index.
    pub(crate) fn table_at(&self, local_idx: u32) -> u32 {
        self.tables[local_idx as usize]
    }

    /// Maps a module-local memory index to its Environment-arena index.
    pub(crate) fn memory_at(&self, local_idx: u32) -> u32 {
        self.memories[local_idx as usize]
    }

    /// Maps a module-local global index to its Environment-arena index.
    pub(crate) fn global_at(&self, local_idx: u32) -> u32 {
        self.globals[local_idx as usize]
    }

    /// The signature named by a module-local type index, used to check a
    /// `call_indirect` site against the function actually found in the table.
    pub(crate) fn signature_at(&self, type_idx: u32) -> &Signature {
        &self.types[type_idx as usize]
    }
}

/// A module backed by a host delegate rather than a compiled body: every export is
/// materialized on first resolution by calling into the delegate.
pub struct HostModule {
    delegate: Box<dyn HostModuleDelegate>,
    resolved: core::cell::RefCell<BTreeMap<String, Extern>>,
}

pub enum ModuleInstance {
    Defined(DefinedModule),
    Host(HostModule),
}

/// A snapshot of every arena's length, taken before a module load begins.
///
/// `reset_to_mark` truncates every arena back to this snapshot, discarding anything
/// appended since — this is only safe because nothing is ever removed except via a
/// rollback to an earlier mark (see `DESIGN.md`, "rollback discipline").
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    funcs: usize,
    tables: usize,
    memories: usize,
    globals: usize,
    modules: usize,
    bindings: usize,
}

/// Process-wide registry of loaded entities and modules.
#[derive(Default)]
pub struct Environment {
    funcs: Vec<FuncRef>,
    tables: Vec<TableRef>,
    memories: Vec<MemoryRef>,
    globals: Vec<GlobalRef>,
    modules: Vec<ModuleInstance>,
    /// (alias, module index) in registration order; a later entry shadows an
    /// earlier one with the same alias, so lookup scans from the end.
    bindings: Vec<(String, u32)>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    pub fn mark(&self) -> Mark {
        Mark {
            funcs: self.funcs.len(),
            tables: self.tables.len(),
            memories: self.memories.len(),
            globals: self.globals.len(),
            modules: self.modules.len(),
            bindings: self.bindings.len(),
        }
    }

    pub fn reset_to_mark(&mut self, mark: Mark) {
        log::warn!(
            "rolling back environment to mark (funcs={} tables={} memories={} globals={} modules={})",
            mark.funcs, mark.tables, mark.memories, mark.globals, mark.modules
        );
        self.funcs.truncate(mark.funcs);
        self.tables.truncate(mark.tables);
        self.memories.truncate(mark.memories);
        self.globals.truncate(mark.globals);
        self.modules.truncate(mark.modules);
        self.bindings.truncate(mark.bindings);
    }

    /// Binds `alias` to `module_index` for subsequent import resolution.
    pub fn register_module(&mut self, alias: &str, module_index: u32) {
        log::info!("registered module \"{}\" -> index {}", alias, module_index);
        self.bindings.push((alias.to_string(), module_index));
    }

    /// Appends a new host module under `alias` and returns its module index.
    pub fn append_host_module(&mut self, alias: &str, delegate: Box<dyn HostModuleDelegate>) -> u32 {
        let index = self.modules.len() as u32;
        self.modules.push(ModuleInstance::Host(HostModule {
            delegate,
            resolved: core::cell::RefCell::new(BTreeMap::new()),
        }));
        self.register_module(alias, index);
        log::info!("appended host module \"{}\" -> index {}", alias, index);
        index
    }

    /// Looks up the module index currently bound to `alias`.
    pub fn find_module(&self, alias: &str) -> Option<u32> {
        self.bindings
            .iter()
            .rev()
            .find(|(name, _)| name == alias)
            .map(|(_, idx)| *idx)
    }

    /// The most recently loaded module's index, if any.
    pub fn last_module(&self) -> Option<u32> {
        if self.modules.is_empty() {
            None
        } else {
            Some(self.modules.len() as u32 - 1)
        }
    }

    pub fn module(&self, index: u32) -> &ModuleInstance {
        &self.modules[index as usize]
    }

    pub fn func(&self, index: u32) -> &FuncRef {
        &self.funcs[index as usize]
    }

    pub fn table(&self, index: u32) -> &TableRef {
        &self.tables[index as usize]
    }

    pub fn memory(&self, index: u32) -> &MemoryRef {
        &self.memories[index as usize]
    }

    pub fn get_global(&self, index: u32) -> &GlobalRef {
        &self.globals[index as usize]
    }

    /// Resolves `field` on the module bound at `module_index`: a defined module's
    /// export map is just looked up, while a host module's delegate is invoked once
    /// per field and the result cached (and allocated into this Environment's own
    /// arenas, so it gets a regular arena index like anything else).
    fn resolve_from_module(
        &mut self,
        module_index: u32,
        field: &str,
        expected: &ExpectedKind,
    ) -> Result<Extern, Error> {
        if let ModuleInstance::Defined(module) = &self.modules[module_index as usize] {
            return module
                .get_export(field)
                .ok_or_else(|| Error::Unlinkable(format!("unknown module field \"{}\"", field)));
        }
        let host = match &self.modules[module_index as usize] {
            ModuleInstance::Host(host) => host,
            ModuleInstance::Defined(_) => unreachable!(),
        };
        if let Some(found) = host.resolved.borrow().get(field) {
            return Ok(*found);
        }
        let resolved = match expected {
            ExpectedKind::Func(sig) => HostResolved::Func(
                Signature::clone(sig),
                host.delegate.import_func(field, sig).map_err(Error::Unlinkable)?,
            ),
            ExpectedKind::Table(ty) => {
                HostResolved::Table(host.delegate.import_table(field, ty).map_err(Error::Unlinkable)?)
            }
            ExpectedKind::Memory(ty) => {
                HostResolved::Memory(host.delegate.import_memory(field, ty).map_err(Error::Unlinkable)?)
            }
            ExpectedKind::Global(ty) => {
                HostResolved::Global(host.delegate.import_global(field, ty).map_err(Error::Unlinkable)?)
            }
        };
        let ext = match resolved {
            HostResolved::Func(sig, host_func_index) => {
                Extern::Func(self.push_func(FuncInstance::alloc_host(sig, host_func_index)))
            }
            HostResolved::Table(table) => Extern::Table(self.push_table(table)),
            HostResolved::Memory(memory) => Extern::Memory(self.push_memory(memory)),
            HostResolved::Global(global) => Extern::Global(self.push_global(global)),
        };
        if let ModuleInstance::Host(host) = &self.modules[module_index as usize] {
            host.resolved.borrow_mut().insert(field.to_string(), ext);
        }
        Ok(ext)
    }
}

enum ExpectedKind<'a> {
    Func(&'a Signature),
    Table(&'a TableType),
    Memory(&'a MemoryType),
    Global(&'a GlobalType),
}

enum HostResolved {
    Func(Signature, usize),
    Table(TableRef),
    Memory(MemoryRef),
    Global(GlobalRef),
}

impl Environment {
    /// Resolves imports, allocates this module's own tables/memories/globals/funcs,
    /// applies element and data segments, and registers the module under `alias` (if
    /// given). Does not run the start function — invoke it via `Thread` and roll
    /// back to the mark taken before this call if it traps.
    pub fn instantiate(
        &mut self,
        validated: &ValidatedModule,
        alias: Option<&str>,
    ) -> Result<u32, Error> {
        let module = &validated.module;
        let types = module_signatures(module);

        let mut funcs = Vec::new();
        let mut tables = Vec::new();
        let mut memories = Vec::new();
        let mut globals = Vec::new();

        if let Some(import_section) = module.import_section() {
            for import in import_section.entries() {
                let module_index = self.find_module(import.module()).ok_or_else(|| {
                    Error::Unlinkable(format!("unknown import module \"{}\"", import.module()))
                })?;
                match import.external() {
                    External::Function(type_idx) => {
                        let signature = type_signature(module, *type_idx)?;
                        let resolved =
                            self.resolve_from_module(module_index, import.field(), &ExpectedKind::Func(&signature))?;
                        let idx = self.bind_func_extern(resolved, &signature)?;
                        funcs.push(idx);
                    }
                    External::Table(table_type) => {
                        let ty = TableType::from_elements(table_type);
                        let resolved =
                            self.resolve_from_module(module_index, import.field(), &ExpectedKind::Table(&ty))?;
                        let idx = self.bind_table_extern(resolved, &ty)?;
                        tables.push(idx);
                    }
                    External::Memory(memory_type) => {
                        let ty = MemoryType::from_elements(memory_type);
                        let resolved =
                            self.resolve_from_module(module_index, import.field(), &ExpectedKind::Memory(&ty))?;
                        let idx = self.bind_memory_extern(resolved, &ty)?;
                        memories.push(idx);
                    }
                    External::Global(global_type) => {
                        let ty = GlobalType::from_elements(global_type);
                        let resolved =
                            self.resolve_from_module(module_index, import.field(), &ExpectedKind::Global(&ty))?;
                        let idx = self.bind_global_extern(resolved, &ty)?;
                        globals.push(idx);
                    }
                }
            }
        }

        if let Some(section) = module.table_section() {
            for entry in section.entries() {
                let ty = TableType::from_elements(entry);
                let table = TableInstance::alloc(ty.limits().initial(), ty.limits().maximum())?;
                tables.push(self.push_table(table));
            }
        }
        if let Some(section) = module.memory_section() {
            for entry in section.entries() {
                let ty = MemoryType::from_elements(entry);
                let memory = MemoryInstance::alloc(ty.limits().initial(), ty.limits().maximum())?;
                memories.push(self.push_memory(memory));
            }
        }
        if let Some(section) = module.global_section() {
            for entry in section.entries() {
                let value = eval_const_expr(entry.init_expr(), &globals, self)?;
                let global = GlobalInstance::alloc(value, entry.global_type().is_mutable());
                globals.push(self.push_global(global));
            }
        }

        if let Some(section) = module.function_section() {
            // The module being built isn't pushed into the arena until the very end
            // of this function, so its eventual index is just the arena's current length.
            let owning_module_index = self.modules.len() as u32;
            for (local_index, func) in section.entries().iter().enumerate() {
                let signature = type_signature(module, func.type_ref())?;
                let compiled = &validated.code[local_index];
                let body = FuncBody {
                    locals: compiled_locals(module, local_index)?,
                    code: compiled.clone(),
                };
                let func_ref = FuncInstance::alloc_defined(signature, owning_module_index, body);
                funcs.push(self.push_func(func_ref));
            }
        }

        if let Some(section) = module.elements_section() {
            for segment in section.entries() {
                let table_idx = tables[segment.index() as usize];
                let table = self.table(table_idx).clone();
                let offset_expr = segment
                    .offset()
                    .as_ref()
                    .ok_or_else(|| Error::Invalid("passive element segments are not supported".into()))?;
                let offset = const_i32(offset_expr, &globals, self)? as u32;
                if offset as u64 + segment.members().len() as u64 > table.current_size() as u64 {
                    return Err(Error::Unlinkable(format!(
                        "elem segment offset is out of bounds: {} >= max value {}",
                        offset,
                        table.current_size()
                    )));
                }
                for (i, local_func_idx) in segment.members().iter().enumerate() {
                    let env_func_idx = funcs[*local_func_idx as usize];
                    table
                        .set(offset + i as u32, Some(env_func_idx))
                        .map_err(|e| Error::Unlinkable(e.to_string()))?;
                }
            }
        }

        if let Some(section) = module.data_section() {
            for segment in section.entries() {
                let memory_idx = memories[segment.index() as usize];
                let memory = self.memory(memory_idx).clone();
                let offset_expr = segment
                    .offset()
                    .as_ref()
                    .ok_or_else(|| Error::Invalid("passive data segments are not supported".into()))?;
                let offset = const_i32(offset_expr, &globals, self)? as u32;
                let end = offset as u64 + segment.value().len() as u64;
                let max_bytes = memory.current_size() as u64 * crate::memory::PAGE_SIZE as u64;
                if end > max_bytes {
                    return Err(Error::Unlinkable(format!(
                        "data segment is out of bounds: [{}, {}) >= max value {}",
                        offset, end, max_bytes
                    )));
                }
                memory
                    .set(offset, segment.value())
                    .map_err(|trap| Error::Unlinkable(trap.to_string()))?;
            }
        }

        let mut exports = BTreeMap::new();
        if let Some(section) = module.export_section() {
            for export in section.entries() {
                if exports.contains_key(export.field()) {
                    return Err(Error::Invalid(format!("duplicate export \"{}\"", export.field())));
                }
                let ext = match *export.internal() {
                    Internal::Function(idx) => Extern::Func(funcs[idx as usize]),
                    Internal::Table(idx) => Extern::Table(tables[idx as usize]),
                    Internal::Memory(idx) => Extern::Memory(memories[idx as usize]),
                    Internal::Global(idx) => Extern::Global(globals[idx as usize]),
                };
                exports.insert(export.field().to_string(), ext);
            }
        }

        let start = module.start_section();

        let module_index = self.modules.len() as u32;
        self.modules.push(ModuleInstance::Defined(DefinedModule {
            funcs,
            tables,
            memories,
            globals,
            types,
            exports,
            start,
        }));

        if let Some(alias) = alias {
            self.register_module(alias, module_index);
        }
        log::info!("instantiated module at index {}", module_index);
        Ok(module_index)
    }

    fn push_func(&mut self, func: FuncRef) -> u32 {
        self.funcs.push(func);
        self.funcs.len() as u32 - 1
    }
    fn push_table(&mut self, table: TableRef) -> u32 {
        self.tables.push(table);
        self.tables.len() as u32 - 1
    }
    fn push_memory(&mut self, memory: MemoryRef) -> u32 {
        self.memories.push(memory);
        self.memories.len() as u32 - 1
    }
    fn push_global(&mut self, global: GlobalRef) -> u32 {
        self.globals.push(global);
        self.globals.len() as u32 - 1
    }

    fn bind_func_extern(&mut self, resolved: Extern, expected: &Signature) -> Result<u32, Error> {
        match resolved {
            Extern::Func(idx) => {
                if self.funcs[idx as usize].signature() != expected {
                    return Err(Error::Unlinkable("import signature mismatch".into()));
                }
                Ok(idx)
            }
            _ => Err(Error::Unlinkable("import signature mismatch".into())),
        }
    }
    fn bind_table_extern(&mut self, resolved: Extern, expected: &TableType) -> Result<u32, Error> {
        match resolved {
            Extern::Table(idx) => {
                let table = &self.tables[idx as usize];
                if table.initial_size() < expected.limits().initial() {
                    return Err(Error::Unlinkable("import signature mismatch".into()));
                }
                Ok(idx)
            }
            _ => Err(Error::Unlinkable("import signature mismatch".into())),
        }
    }
    fn bind_memory_extern(&mut self, resolved: Extern, expected: &MemoryType) -> Result<u32, Error> {
        match resolved {
            Extern::Memory(idx) => {
                let memory = &self.memories[idx as usize];
                if memory.initial() < expected.limits().initial() {
                    return Err(Error::Unlinkable("import signature mismatch".into()));
                }
                Ok(idx)
            }
            _ => Err(Error::Unlinkable("import signature mismatch".into())),
        }
    }
    fn bind_global_extern(&mut self, resolved: Extern, expected: &GlobalType) -> Result<u32, Error> {
        match resolved {
            Extern::Global(idx) => {
                let global = &self.globals[idx as usize];
                if global.value_type() != expected.value_type() {
                    return Err(Error::Unlinkable("import signature mismatch".into()));
                }
                Ok(idx)
            }
            _ => Err(Error::Unlinkable("import signature mismatch".into())),
        }
    }
}

fn type_signature(module: &elements::Module, type_idx: u32) -> Result<Signature, Error> {
    let elements::Type::Function(func_type) = module
        .type_section()
        .and_then(|s| s.types().get(type_idx as usize))
        .ok_or_else(|| Error::Invalid(format!("type index out of bounds: {}", type_idx)))?;
    Ok(Signature::from_elements(func_type))
}

/// Every signature in a module's type section, indexed the same way a type index
/// names them.
fn module_signatures(module: &elements::Module) -> Vec<Signature> {
    module
        .type_section()
        .map(|s| {
            s.types()
                .iter()
                .map(|elements::Type::Function(func_type)| Signature::from_elements(func_type))
                .collect()
        })
        .unwrap_or_default()
}

fn compiled_locals(module: &elements::Module, local_index: usize) -> Result<Vec<ValueType>, Error> {
    let body = module
        .code_section()
        .and_then(|s| s.bodies().get(local_index))
        .ok_or_else(|| Error::Invalid(format!("missing body for function {}", local_index)))?;
    let mut locals = Vec::new();
    for local in body.locals() {
        let ty = ValueType::from_elements(local.value_type());
        for _ in 0..local.count() {
            locals.push(ty);
        }
    }
    Ok(locals)
}

fn eval_const_expr(
    init_expr: &elements::InitExpr,
    globals_in_progress: &[u32],
    env: &Environment,
) -> Result<crate::value::RuntimeValue, Error> {
    use crate::value::RuntimeValue;
    match init_expr.code().first() {
        Some(Op::I32Const(v)) => Ok(RuntimeValue::I32(*v)),
        Some(Op::I64Const(v)) => Ok(RuntimeValue::I64(*v)),
        Some(Op::F32Const(v)) => Ok(RuntimeValue::F32(crate::nan_preserving_float::F32::from_bits(*v))),
        Some(Op::F64Const(v)) => Ok(RuntimeValue::F64(crate::nan_preserving_float::F64::from_bits(*v))),
        Some(Op::GetGlobal(idx)) => {
            let env_idx = *globals_in_progress
                .get(*idx as usize)
                .ok_or_else(|| Error::Invalid(format!("global {} not yet defined", idx)))?;
            Ok(env.get_global(env_idx).get())
        }
        _ => Err(Error::Invalid("non-constant opcode in constant expression".into())),
    }
}

fn const_i32(init_expr: &elements::InitExpr, globals_in_progress: &[u32], env: &Environment) -> Result<i32, Error> {
    match eval_const_expr(init_expr, globals_in_progress, env)? {
        crate::value::RuntimeValue::I32(v) => Ok(v),
        _ => Err(Error::Invalid("segment offset must be i32".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_reset_truncates_arenas() {
        let mut env = Environment::new();
        let mark = env.mark();
        env.push_func(FuncInstance::alloc_host(Signature::new(&[][..], None), 0));
        assert_eq!(env.funcs.len(), 1);
        env.reset_to_mark(mark);
        assert_eq!(env.funcs.len(), 0);
    }

    #[test]
    fn find_module_prefers_latest_binding() {
        let mut env = Environment::new();
        env.register_module("m", 0);
        env.register_module("m", 1);
        assert_eq!(env.find_module("m"), Some(1));
    }

    #[test]
    fn bind_func_extern_rejects_signature_mismatch() {
        let mut env = Environment::new();
        let idx = env.push_func(FuncInstance::alloc_host(Signature::new(&[ValueType::I32][..], None), 0));
        let expected = Signature::new(&[ValueType::I64][..], None);
        assert!(env.bind_func_extern(Extern::Func(idx), &expected).is_err());
    }
}
