use core::any::TypeId;
use core::fmt;

#[cfg(feature = "std")]
use std::error;

use alloc::boxed::Box;
use alloc::string::String;

/// Trait that allows the host to return a custom error from a host function or from
/// module registration.
///
/// # Examples
///
/// ```rust
/// use std::fmt;
/// use wasm_engine::{Error, HostError};
///
/// #[derive(Debug)]
/// struct MyError {
///     code: u32,
/// }
///
/// impl fmt::Display for MyError {
///     fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
///         write!(f, "MyError, code={}", self.code)
///     }
/// }
///
/// impl HostError for MyError {}
///
/// fn failable_fn() -> Result<(), Error> {
///     let my_error = MyError { code: 1312 };
///     Err(Error::Host(Box::new(my_error)))
/// }
/// ```
pub trait HostError: 'static + fmt::Display + fmt::Debug + Send + Sync {
    #[doc(hidden)]
    fn __private_get_type_id__(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

impl dyn HostError {
    /// Attempts to downcast this `HostError` to a concrete type by reference.
    pub fn downcast_ref<T: HostError>(&self) -> Option<&T> {
        if self.__private_get_type_id__() == TypeId::of::<T>() {
            unsafe { Some(&*(self as *const dyn HostError as *const T)) }
        } else {
            None
        }
    }

    /// Attempts to downcast this `HostError` to a concrete type by mutable reference.
    pub fn downcast_mut<T: HostError>(&mut self) -> Option<&mut T> {
        if self.__private_get_type_id__() == TypeId::of::<T>() {
            unsafe { Some(&mut *(self as *mut dyn HostError as *mut T)) }
        } else {
            None
        }
    }
}

/// Error raised when execution of Wasm code or a host call aborts.
///
/// Traps can't be handled by Wasm code itself — they always propagate up to the embedder.
#[derive(Debug)]
pub struct Trap {
    kind: TrapKind,
}

impl Trap {
    /// Creates a new trap of the given kind.
    pub fn new(kind: TrapKind) -> Trap {
        Trap { kind }
    }

    /// Returns the kind of this trap.
    pub fn kind(&self) -> &TrapKind {
        &self.kind
    }

    /// Consumes this trap, returning its kind.
    pub fn into_kind(self) -> TrapKind {
        self.kind
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "trap: {:?}", self.kind)
    }
}

#[cfg(feature = "std")]
impl error::Error for Trap {}

/// The reason execution was aborted.
#[derive(Debug)]
pub enum TrapKind {
    /// Wasm code executed an `unreachable` opcode.
    Unreachable,

    /// An integer operation (signed division/remainder of `MIN` by `-1`) produced a
    /// result that does not fit back into the operand width.
    IntegerOverflow,

    /// `div` or `rem` was executed with zero as the divisor.
    IntegerDivideByZero,

    /// A `trunc`-family conversion from a float to an integer was given a NaN, an
    /// infinity, or a finite value outside the target integer's range.
    InvalidConversionToInteger,

    /// A load or store accessed an address outside the bounds of linear memory.
    ///
    /// Addresses are unsigned, so this never happens by simply going negative — only by
    /// running past the memory's current size.
    MemoryAccessOutOfBounds,

    /// `call_indirect` was executed with a table index at or past the table's current size.
    UndefinedTableIndex,

    /// `call_indirect` addressed a table slot that has never been initialized by an
    /// active element segment.
    UninitializedElement,

    /// `call_indirect` addressed a function whose signature does not match the one
    /// declared at the call site.
    IndirectCallSignatureMismatch,

    /// The call stack grew past its configured limit.
    ///
    /// Usually caused by unbounded or very deep recursion.
    CallStackExhausted,

    /// The operand stack grew past its configured limit.
    ValueStackExhausted,

    /// A module lookup (`get_export`, `invoke_export`, ...) named an export the module
    /// does not define.
    UnknownExport(String),

    /// A module lookup found an export under the requested name, but it is not of the
    /// requested kind (e.g. a global was asked for where a function was expected).
    ExportKindMismatch,

    /// Error raised by the host, e.g. from a host function body.
    HostTrapped(Box<dyn HostError>),
}

impl TrapKind {
    /// Whether this trap originated from the host rather than from Wasm code itself.
    pub fn is_host(&self) -> bool {
        matches!(self, TrapKind::HostTrapped(_))
    }
}

/// Top-level error type produced while decoding, validating, linking, or running a module.
#[derive(Debug)]
pub enum Error {
    /// The binary could not be decoded: it is not well-formed Wasm at all. Carries a
    /// description and the byte offset where decoding gave up.
    Malformed(String, usize),
    /// The binary decoded but failed a validation rule (type mismatch, stack
    /// underflow, out-of-bounds segment, ...).
    Invalid(String),
    /// The module could not be linked against the environment it was registered into
    /// (missing import, signature mismatch, duplicate export, ...).
    Unlinkable(String),
    /// Execution trapped.
    Trap(Trap),
    /// Error raised directly by the host, outside of a trap (e.g. while registering a
    /// host module).
    Host(Box<dyn HostError>),
}

impl Error {
    /// Returns the host error carried by this `Error`, if any.
    ///
    /// Matches both the [`Error::Host`] variant and a [`Error::Trap`] wrapping
    /// [`TrapKind::HostTrapped`].
    pub fn as_host_error(&self) -> Option<&dyn HostError> {
        match self {
            Error::Host(host_err) => Some(&**host_err),
            Error::Trap(Trap {
                kind: TrapKind::HostTrapped(host_err),
            }) => Some(&**host_err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Malformed(ref s, offset) => write!(f, "malformed at offset {}: {}", offset, s),
            Error::Invalid(ref s) => write!(f, "invalid: {}", s),
            Error::Unlinkable(ref s) => write!(f, "unlinkable: {}", s),
            Error::Trap(ref t) => write!(f, "trap: {:?}", t.kind()),
            Error::Host(ref e) => write!(f, "host: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl error::Error for Error {}

impl<U> From<U> for Error
where
    U: HostError + Sized,
{
    fn from(e: U) -> Self {
        Error::Host(Box::new(e))
    }
}

impl From<Trap> for Error {
    fn from(e: Trap) -> Error {
        Error::Trap(e)
    }
}

impl From<TrapKind> for Trap {
    fn from(e: TrapKind) -> Trap {
        Trap::new(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct MyError(u32);

    impl fmt::Display for MyError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "MyError({})", self.0)
        }
    }

    impl HostError for MyError {}

    #[test]
    fn host_error_downcast_round_trips() {
        let boxed: Box<dyn HostError> = Box::new(MyError(42));
        let downcast = boxed.downcast_ref::<MyError>().unwrap();
        assert_eq!(downcast.0, 42);
    }

    #[test]
    fn host_error_downcast_rejects_wrong_type() {
        #[derive(Debug)]
        struct Other;
        impl fmt::Display for Other {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "Other")
            }
        }
        impl HostError for Other {}

        let boxed: Box<dyn HostError> = Box::new(MyError(1));
        assert!(boxed.downcast_ref::<Other>().is_none());
    }

    #[test]
    fn trap_kind_is_host() {
        let trap = Trap::new(TrapKind::HostTrapped(Box::new(MyError(7))));
        assert!(trap.kind().is_host());
        assert!(!Trap::new(TrapKind::Unreachable).kind().is_host());
    }
}
