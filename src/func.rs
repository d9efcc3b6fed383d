//! Runtime representation of a function: either defined by a Wasm module body or
//! backed by a host callback.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::isa;
use crate::types::{Signature, ValueType};

/// Reference-counted handle to a [`FuncInstance`].
#[derive(Clone, Debug)]
pub struct FuncRef(Rc<FuncInstance>);

impl core::ops::Deref for FuncRef {
    type Target = FuncInstance;
    fn deref(&self) -> &FuncInstance {
        &self.0
    }
}

/// A defined function's compiled body: the non-parameter locals (pushed as
/// zero-valued slots at call entry) and the resolved instruction stream.
#[derive(Debug)]
pub struct FuncBody {
    pub locals: Vec<ValueType>,
    pub code: isa::Instructions,
}

pub struct FuncInstance(FuncInstanceInternal);

pub(crate) enum FuncInstanceInternal {
    Defined {
        signature: Signature,
        /// Index, in the owning Environment's module arena, of the module this
        /// function was defined in — used to resolve the tables/memories/globals
        /// its body references.
        module_index: u32,
        body: Rc<FuncBody>,
    },
    Host {
        signature: Signature,
        host_func_index: usize,
    },
}

impl fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            FuncInstanceInternal::Defined { signature, .. } => {
                write!(f, "Defined {{ signature: {:?} }}", signature)
            }
            FuncInstanceInternal::Host { signature, .. } => {
                write!(f, "Host {{ signature: {:?} }}", signature)
            }
        }
    }
}

impl FuncInstance {
    pub fn alloc_defined(signature: Signature, module_index: u32, body: FuncBody) -> FuncRef {
        FuncRef(Rc::new(FuncInstance(FuncInstanceInternal::Defined {
            signature,
            module_index,
            body: Rc::new(body),
        })))
    }

    pub fn alloc_host(signature: Signature, host_func_index: usize) -> FuncRef {
        FuncRef(Rc::new(FuncInstance(FuncInstanceInternal::Host {
            signature,
            host_func_index,
        })))
    }

    pub fn signature(&self) -> &Signature {
        match &self.0 {
            FuncInstanceInternal::Defined { signature, .. } => signature,
            FuncInstanceInternal::Host { signature, .. } => signature,
        }
    }

    pub(crate) fn as_internal(&self) -> &FuncInstanceInternal {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signature;

    #[test]
    fn host_func_keeps_signature() {
        let sig = Signature::new(&[ValueType::I32][..], Some(ValueType::I32));
        let func = FuncInstance::alloc_host(sig.clone(), 0);
        assert_eq!(func.signature(), &sig);
    }
}
