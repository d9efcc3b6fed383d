//! Import resolution glue between modules and the host programs that embed them.
//!
//! A host module exports entities the way a Wasm-defined module does, but instead of
//! a compiled body each export is backed by a [`HostModuleDelegate`] callback invoked
//! at import-resolution time (to populate an imported global/table/memory) or at call
//! time (for functions, via [`Externals`]).

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use core::fmt;

use crate::global::GlobalRef;
use crate::memory::MemoryRef;
use crate::table::TableRef;
use crate::trap::{HostError, Trap, TrapKind};
use crate::types::{GlobalType, MemoryType, Signature, TableType};
use crate::value::{FromRuntimeValue, RuntimeValue};

/// Wrapper around a slice of [`RuntimeValue`], for ergonomic extraction inside a host
/// function body.
#[derive(Debug)]
pub struct RuntimeArgs<'a>(&'a [RuntimeValue]);

impl<'a> From<&'a [RuntimeValue]> for RuntimeArgs<'a> {
    fn from(inner: &'a [RuntimeValue]) -> Self {
        RuntimeArgs(inner)
    }
}

impl<'a> AsRef<[RuntimeValue]> for RuntimeArgs<'a> {
    fn as_ref(&self) -> &[RuntimeValue] {
        self.0
    }
}

#[derive(Debug)]
struct UnexpectedSignature;

impl fmt::Display for UnexpectedSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "host function called with an unexpected argument type or count")
    }
}

impl HostError for UnexpectedSignature {}

fn unexpected_signature_trap() -> Trap {
    Trap::new(TrapKind::HostTrapped(Box::new(UnexpectedSignature)))
}

impl<'a> RuntimeArgs<'a> {
    /// Extracts and converts the argument at `idx`.
    pub fn nth_checked<T: FromRuntimeValue>(&self, idx: usize) -> Result<T, Trap> {
        self.nth_value_checked(idx)?
            .try_into()
            .ok_or_else(unexpected_signature_trap)
    }

    /// Extracts the raw argument at `idx`.
    pub fn nth_value_checked(&self, idx: usize) -> Result<RuntimeValue, Trap> {
        self.0
            .get(idx)
            .copied()
            .ok_or_else(unexpected_signature_trap)
    }

    /// Extracts and converts the argument at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if there are not enough arguments or the cast fails.
    pub fn nth<T: FromRuntimeValue>(&self, idx: usize) -> T {
        self.nth_value_checked(idx)
            .expect("too few host call arguments")
            .try_into()
            .expect("unexpected host call argument type")
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Invokes host functions by index.
///
/// A `Thread` dispatches a call to an imported host function by looking up its
/// `host_func_index` (assigned when the function was registered) and calling
/// `invoke_index` on the `Externals` the caller supplied for that invocation.
pub trait Externals {
    fn invoke_index(&mut self, index: usize, args: RuntimeArgs) -> Result<Option<RuntimeValue>, Trap>;
}

/// An `Externals` that traps on every call; useful when a module is known not to
/// import any host functions.
pub struct NopExternals;

impl Externals for NopExternals {
    fn invoke_index(&mut self, _index: usize, _args: RuntimeArgs) -> Result<Option<RuntimeValue>, Trap> {
        Err(TrapKind::Unreachable.into())
    }
}

/// What a host module offers in place of a compiled body, for one import.
pub enum HostImport {
    Func { host_func_index: usize },
    Table(TableRef),
    Memory(MemoryRef),
    Global(GlobalRef),
}

/// Resolves the imports of a host module.
///
/// Grounded on the four-operation import surface named for host modules: given a
/// field name and the import's declared type, a delegate either produces the entity
/// (constructing it, in the case of tables/memories/globals, or handing back a
/// `host_func_index` for functions) or reports why it can't.
pub trait HostModuleDelegate {
    fn import_func(&self, field_name: &str, signature: &Signature) -> Result<usize, String>;
    fn import_table(&self, field_name: &str, table_type: &TableType) -> Result<TableRef, String>;
    fn import_memory(&self, field_name: &str, memory_type: &MemoryType) -> Result<MemoryRef, String>;
    fn import_global(&self, field_name: &str, global_type: &GlobalType) -> Result<GlobalRef, String>;
}

/// The reference `spectest` host module used by conformance-style tests: a `print`
/// function with no semantic role, a table with limits `(10, 20)`, a memory of one
/// page (max two), and constant globals keyed by their declared type.
pub struct SpecTest;

impl HostModuleDelegate for SpecTest {
    fn import_func(&self, field_name: &str, signature: &Signature) -> Result<usize, String> {
        match field_name {
            "print" | "print_i32" | "print_i64" | "print_f32" | "print_f64" | "print_i32_f32"
            | "print_f64_f64" => Ok(0),
            _ => Err(format!("spectest has no function named \"{}\"", field_name)),
        }
        .map(|index| {
            let _ = signature;
            index
        })
    }

    fn import_table(&self, field_name: &str, _table_type: &TableType) -> Result<TableRef, String> {
        if field_name != "table" {
            return Err(format!("spectest has no table named \"{}\"", field_name));
        }
        crate::table::TableInstance::alloc(10, Some(20))
            .map_err(|e| e.to_string())
    }

    fn import_memory(&self, field_name: &str, _memory_type: &MemoryType) -> Result<MemoryRef, String> {
        if field_name != "memory" {
            return Err(format!("spectest has no memory named \"{}\"", field_name));
        }
        crate::memory::MemoryInstance::alloc(1, Some(2)).map_err(|e| e.to_string())
    }

    fn import_global(&self, field_name: &str, global_type: &GlobalType) -> Result<GlobalRef, String> {
        use crate::types::ValueType;
        let value = match (field_name, global_type.value_type()) {
            ("global_i32", ValueType::I32) => RuntimeValue::I32(666),
            ("global_i64", ValueType::I64) => RuntimeValue::I64(666),
            ("global_f32", ValueType::F32) => RuntimeValue::F32(666.0f32.into()),
            ("global_f64", ValueType::F64) => RuntimeValue::F64(666.0f64.into()),
            _ => {
                return Err(format!(
                    "spectest has no global named \"{}\" of type {}",
                    field_name,
                    global_type.value_type()
                ))
            }
        };
        Ok(crate::global::GlobalInstance::alloc(value, false))
    }
}

/// A `print*` call from a module that imported `spectest`'s `print` family; logs the
/// arguments and returns no value, per `print`'s "no semantic role".
pub fn spectest_print(index: usize, args: RuntimeArgs) -> Result<Option<RuntimeValue>, Trap> {
    let _ = index;
    log::info!("spectest print: {:?}", args.as_ref());
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_runtime_args() {
        let args: RuntimeArgs = (&[RuntimeValue::I32(0)][..]).into();
        let val: i32 = args.nth_checked(0).unwrap();
        assert_eq!(val, 0);
    }

    #[test]
    fn i64_invalid_arg_cast() {
        let args: RuntimeArgs = (&[RuntimeValue::I64(90534534545322)][..]).into();
        assert!(args.nth_checked::<i32>(0).is_err());
    }

    #[test]
    fn spectest_resolves_print() {
        let delegate = SpecTest;
        let sig = Signature::new(&[][..], None);
        assert!(delegate.import_func("print", &sig).is_ok());
        assert!(delegate.import_func("unknown", &sig).is_err());
    }

    #[test]
    fn spectest_resolves_table_and_memory() {
        let delegate = SpecTest;
        let table_ty = TableType::new(crate::types::Limits::new(10, Some(20)));
        let memory_ty = MemoryType::new(crate::types::Limits::new(1, Some(2)));
        assert!(delegate.import_table("table", &table_ty).is_ok());
        assert!(delegate.import_memory("memory", &memory_ty).is_ok());
    }
}
