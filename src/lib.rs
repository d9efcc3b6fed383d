//! # wasm-engine
//!
//! A stack-based WebAssembly interpreter: a binary decoder, a validator that
//! compiles validated function bodies into a flat bytecode, a linker
//! ([`Environment`]) that owns every loaded entity in a set of append-only
//! arenas, and a tree-walking interpreter ([`Thread`]) that executes against
//! them.
//!
//! # Loading and linking
//!
//! Unlike a linking model where every module holds `Rc`-counted references to
//! the modules it imports from, here a single [`Environment`] owns everything:
//! functions, tables, memories, globals and modules are appended to the
//! `Environment`'s own arenas and referenced by index. A module never points at
//! another module directly — only at entries in the `Environment` that outlives
//! it. [`Environment::mark`]/[`Environment::reset_to_mark`] let a caller discard
//! everything appended by a load that failed partway through, which is what
//! makes a failed [`instantiate`] safe to retry.
//!
//! # Execution
//!
//! [`Thread::invoke`] is not resumable: a host function called mid-execution
//! (via [`Externals::invoke_index`]) runs to completion synchronously. There is
//! no interpreter state to suspend and later resume.
//!
//! # Examples
//!
//! ```rust
//! use wasm_engine::{decode_and_validate, Environment, NopExternals};
//!
//! let wasm_binary: Vec<u8> = wat::parse_str(
//!     r#"
//!     (module
//!         (func (export "test") (result i32)
//!             i32.const 1337
//!         )
//!     )
//!     "#,
//! )
//! .expect("failed to parse wat");
//!
//! let validated = decode_and_validate(&wasm_binary).expect("failed to load wasm");
//!
//! let mut env = Environment::new();
//! let module_index = env
//!     .instantiate(&validated, Some("test_module"))
//!     .expect("failed to instantiate wasm module");
//!
//! assert_eq!(
//!     wasm_engine::invoke_export(
//!         &mut env,
//!         module_index,
//!         "test",
//!         &[],
//!         &mut NopExternals,
//!         wasm_engine::Config::default(),
//!     )
//!     .expect("failed to execute export"),
//!     Some(wasm_engine::RuntimeValue::I32(1337)),
//! );
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::len_without_is_empty)]

#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

#[cfg(not(feature = "std"))]
extern crate libm;

mod binary;
mod config;
mod environment;
mod func;
mod global;
mod host;
mod isa;
mod memory;
pub mod nan_preserving_float;
mod table;
mod thread;
mod trap;
mod types;
mod validator;
mod value;

pub use crate::binary::{decode_module, payloads, Payload};
pub use crate::config::{Config, TraceSink};
pub use crate::environment::{DefinedModule, Environment, Extern, HostModule, Mark, ModuleInstance};
pub use crate::func::{FuncBody, FuncInstance, FuncRef};
pub use crate::global::{GlobalInstance, GlobalRef};
pub use crate::host::{
    Externals, HostImport, HostModuleDelegate, NopExternals, RuntimeArgs, SpecTest, spectest_print,
};
pub use crate::memory::{MemoryInstance, MemoryRef, MAX_PAGES, PAGE_SIZE};
pub use crate::table::{TableInstance, TableRef};
pub use crate::thread::Thread;
pub use crate::trap::{Error, HostError, Trap, TrapKind};
pub use crate::types::{GlobalType, Limits, MemoryType, Signature, TableType, ValueType};
pub use crate::validator::{validate_module, ValidatedModule};
pub use crate::value::{
    ArithmeticOps, ExtendInto, Float, FromRuntimeValue, Integer, LittleEndianConvert, RuntimeValue,
    TransmuteInto, TryTruncateInto, WrapInto,
};

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Decodes and validates a Wasm binary in one step: the analogue of parsing plus
/// type-checking, before anything is linked against an [`Environment`].
///
/// Compiles every function body it accepts into the resolved bytecode
/// [`Environment::instantiate`] later copies into each function's [`FuncBody`].
pub fn decode_and_validate(bytes: &[u8]) -> Result<ValidatedModule, Error> {
    let module = binary::decode_module(bytes)?;
    validator::validate_module(module)
}

/// Looks up `field` on the module at `module_index`, checks that it is an
/// exported function whose signature accepts `args`, and runs it to completion.
///
/// This is the boundary where argument counts and types are actually checked;
/// [`Thread::invoke`] itself only asserts that its caller already did so, since
/// every other caller inside this crate (`call`/`call_indirect`) builds its
/// argument list off the validated operand stack, where a mismatch can't occur.
pub fn invoke_export(
    env: &mut Environment,
    module_index: u32,
    field: &str,
    args: &[RuntimeValue],
    externals: &mut dyn Externals,
    config: Config,
) -> Result<Option<RuntimeValue>, Error> {
    let defined = match env.module(module_index) {
        ModuleInstance::Defined(module) => module,
        ModuleInstance::Host(_) => {
            return Err(Error::Trap(Trap::new(TrapKind::UnknownExport(field.to_string()))))
        }
    };
    let export = defined
        .get_export(field)
        .ok_or_else(|| Error::Trap(Trap::new(TrapKind::UnknownExport(field.to_string()))))?;
    let func_index = match export {
        Extern::Func(idx) => idx,
        _ => return Err(Error::Trap(Trap::new(TrapKind::ExportKindMismatch))),
    };
    let func = env.func(func_index).clone();
    check_signature(func.signature(), args)?;
    let mut thread = Thread::new(env, config);
    thread.invoke(&func, args, externals).map_err(Error::Trap)
}

/// Runs a module's `start` function, if it declares one; a no-op otherwise.
pub fn invoke_start(
    env: &mut Environment,
    module_index: u32,
    externals: &mut dyn Externals,
    config: Config,
) -> Result<(), Error> {
    let start = match env.module(module_index) {
        ModuleInstance::Defined(module) => module.start_func_index(),
        ModuleInstance::Host(_) => None,
    };
    if let Some(func_index) = start {
        let func = env.func(func_index).clone();
        let mut thread = Thread::new(env, config);
        thread.invoke(&func, &[], externals).map_err(Error::Trap)?;
    }
    Ok(())
}

/// Runs every zero-argument function export on the module at `module_index`, in
/// export-name order, when [`Config::run_all_exports`] is set; a no-op otherwise.
///
/// A convenience for a test driver that wants to exercise a freshly-instantiated
/// module's exports without naming each one explicitly through [`invoke_export`].
pub fn invoke_all_zero_arg_exports(
    env: &mut Environment,
    module_index: u32,
    externals: &mut dyn Externals,
    config: Config,
) -> Result<Vec<(String, Option<RuntimeValue>)>, Error> {
    if !config.run_all_exports {
        return Ok(Vec::new());
    }
    let defined = match env.module(module_index) {
        ModuleInstance::Defined(module) => module,
        ModuleInstance::Host(_) => return Ok(Vec::new()),
    };
    let candidates: Vec<(String, u32)> = defined
        .exports()
        .filter_map(|(name, export)| match export {
            Extern::Func(idx) => Some((name.to_string(), idx)),
            _ => None,
        })
        .collect();

    let mut results = Vec::new();
    for (name, func_index) in candidates {
        let func = env.func(func_index).clone();
        if !func.signature().params().is_empty() {
            continue;
        }
        let mut thread = Thread::new(env, config.clone());
        let result = thread.invoke(&func, &[], externals).map_err(Error::Trap)?;
        results.push((name, result));
    }
    Ok(results)
}

/// Checks `args` against `signature`'s parameter list, the way a host embedder's
/// own call site is expected to before handing arguments to a Wasm export.
fn check_signature(signature: &Signature, args: &[RuntimeValue]) -> Result<(), Error> {
    if signature.params().len() != args.len() {
        return Err(Error::Invalid(format!(
            "expected {} argument(s), got {}",
            signature.params().len(),
            args.len()
        )));
    }
    for (expected, actual) in signature.params().iter().zip(args) {
        if *expected != actual.value_type() {
            return Err(Error::Invalid(format!(
                "argument type mismatch: expected {}, got {}",
                expected,
                actual.value_type()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wat(source: &str) -> Vec<u8> {
        wat::parse_str(source).expect("failed to parse wat")
    }

    #[test]
    fn load_instantiate_and_invoke_roundtrip() {
        let binary = wat(
            r#"
            (module
                (func (export "add") (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
            "#,
        );
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, Some("arith")).unwrap();
        let result = invoke_export(
            &mut env,
            module_index,
            "add",
            &[RuntimeValue::I32(2), RuntimeValue::I32(40)],
            &mut NopExternals,
            Config::default(),
        )
        .unwrap();
        assert_eq!(result, Some(RuntimeValue::I32(42)));
    }

    #[test]
    fn invoke_export_rejects_wrong_argument_count() {
        let binary = wat(
            r#"
            (module
                (func (export "needs_one") (param i32) (result i32)
                    local.get 0
                )
            )
            "#,
        );
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, None).unwrap();
        let err = invoke_export(
            &mut env,
            module_index,
            "needs_one",
            &[],
            &mut NopExternals,
            Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn invoke_export_rejects_unknown_export() {
        let binary = wat("(module)");
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, None).unwrap();
        let err = invoke_export(&mut env, module_index, "missing", &[], &mut NopExternals, Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::Trap(_)));
    }

    #[test]
    fn invoke_start_runs_declared_start_function() {
        let binary = wat(
            r#"
            (module
                (memory (export "mem") 1)
                (func $init
                    i32.const 0
                    i32.const 99
                    i32.store
                )
                (start $init)
            )
            "#,
        );
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, None).unwrap();
        invoke_start(&mut env, module_index, &mut NopExternals, Config::default()).unwrap();
        let memory_index = match env.module(module_index) {
            ModuleInstance::Defined(module) => match module.get_export("mem") {
                Some(Extern::Memory(idx)) => idx,
                _ => panic!("expected memory export"),
            },
            ModuleInstance::Host(_) => panic!("expected a defined module"),
        };
        let value: i32 = env.memory(memory_index).get_value(0).unwrap();
        assert_eq!(value, 99);
    }

    #[test]
    fn invoke_start_is_a_no_op_without_one() {
        let binary = wat("(module)");
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, None).unwrap();
        invoke_start(&mut env, module_index, &mut NopExternals, Config::default()).unwrap();
    }

    #[test]
    fn invoke_all_zero_arg_exports_is_a_no_op_unless_configured() {
        let binary = wat(
            r#"
            (module
                (func (export "a") (result i32) i32.const 1)
                (func (export "b") (result i32) i32.const 2)
                (func (export "needs_arg") (param i32) (result i32) local.get 0)
            )
            "#,
        );
        let validated = decode_and_validate(&binary).unwrap();
        let mut env = Environment::new();
        let module_index = env.instantiate(&validated, None).unwrap();

        let results =
            invoke_all_zero_arg_exports(&mut env, module_index, &mut NopExternals, Config::default()).unwrap();
        assert_eq!(results, Vec::new());

        let config = Config {
            run_all_exports: true,
            ..Config::default()
        };
        let mut results =
            invoke_all_zero_arg_exports(&mut env, module_index, &mut NopExternals, config).unwrap();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            results,
            alloc::vec![
                ("a".to_string(), Some(RuntimeValue::I32(1))),
                ("b".to_string(), Some(RuntimeValue::I32(2))),
            ]
        );
    }
}
