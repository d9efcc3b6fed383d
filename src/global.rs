//! Runtime representation of a `global`: a single typed value plus a mutability flag.

use alloc::rc::Rc;
use core::cell::Cell;

use crate::trap::Error;
use crate::types::ValueType;
use crate::value::RuntimeValue;

/// Reference-counted handle to a [`GlobalInstance`].
#[derive(Clone, Debug)]
pub struct GlobalRef(Rc<GlobalInstance>);

impl core::ops::Deref for GlobalRef {
    type Target = GlobalInstance;
    fn deref(&self) -> &GlobalInstance {
        &self.0
    }
}

#[derive(Debug)]
pub struct GlobalInstance {
    value: Cell<RuntimeValue>,
    mutable: bool,
}

impl GlobalInstance {
    /// Allocates a global holding `value`. Exported/imported globals are always
    /// immutable by construction elsewhere; this constructor accepts any flag since
    /// it also backs module-internal mutable globals.
    pub fn alloc(value: RuntimeValue, mutable: bool) -> GlobalRef {
        GlobalRef(Rc::new(GlobalInstance {
            value: Cell::new(value),
            mutable,
        }))
    }

    /// Overwrites this global's value.
    pub fn set(&self, value: RuntimeValue) -> Result<(), Error> {
        if !self.mutable {
            return Err(Error::Invalid("attempted to set an immutable global".into()));
        }
        if self.value_type() != value.value_type() {
            return Err(Error::Invalid("attempted to change a global's value type".into()));
        }
        self.value.set(value);
        Ok(())
    }

    pub fn get(&self) -> RuntimeValue {
        self.value.get()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn value_type(&self) -> ValueType {
        self.value.get().value_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_global_rejects_set() {
        let global = GlobalInstance::alloc(RuntimeValue::I32(1), false);
        assert!(global.set(RuntimeValue::I32(2)).is_err());
    }

    #[test]
    fn mutable_global_rejects_type_change() {
        let global = GlobalInstance::alloc(RuntimeValue::I32(1), true);
        assert!(global.set(RuntimeValue::I64(2)).is_err());
        assert!(global.set(RuntimeValue::I32(2)).is_ok());
        assert_eq!(global.get(), RuntimeValue::I32(2));
    }
}
