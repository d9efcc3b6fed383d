use alloc::borrow::Cow;
use core::fmt;
use parity_wasm::elements;

/// Type of a value.
///
/// See [`crate::value::RuntimeValue`] for the runtime representation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// 32-bit signed or unsigned integer.
    I32,
    /// 64-bit signed or unsigned integer.
    I64,
    /// 32-bit IEEE 754-2008 floating point number.
    F32,
    /// 64-bit IEEE 754-2008 floating point number.
    F64,
}

impl ValueType {
    pub(crate) fn from_elements(value_type: elements::ValueType) -> ValueType {
        match value_type {
            elements::ValueType::I32 => ValueType::I32,
            elements::ValueType::I64 => ValueType::I64,
            elements::ValueType::F32 => ValueType::F32,
            elements::ValueType::F64 => ValueType::F64,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
        }
    }
}

/// Signature of a function: zero or more parameter types and zero or one return type.
///
/// Two signatures are considered equal if their parameter lists and return types match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Cow<'static, [ValueType]>,
    return_type: Option<ValueType>,
}

impl Signature {
    /// Creates a new signature with the given parameter types and optional return type.
    pub fn new<C: Into<Cow<'static, [ValueType]>>>(
        params: C,
        return_type: Option<ValueType>,
    ) -> Signature {
        Signature {
            params: params.into(),
            return_type,
        }
    }

    /// Returns the parameter types of this signature.
    pub fn params(&self) -> &[ValueType] {
        self.params.as_ref()
    }

    /// Returns the return type of this signature.
    pub fn return_type(&self) -> Option<ValueType> {
        self.return_type
    }

    pub(crate) fn from_elements(func_type: &elements::FunctionType) -> Signature {
        Signature {
            params: func_type
                .params()
                .iter()
                .cloned()
                .map(ValueType::from_elements)
                .collect(),
            return_type: func_type
                .results()
                .first()
                .map(|vty| ValueType::from_elements(*vty)),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        if let Some(return_type) = self.return_type {
            write!(f, " -> {}", return_type)?;
        }
        Ok(())
    }
}

/// Minimum and, optionally, maximum size of a table or linear memory, expressed in
/// the entity's own units (elements for tables, pages for memories).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limits {
    initial: u32,
    maximum: Option<u32>,
}

impl Limits {
    /// Creates a new pair of limits.
    pub fn new(initial: u32, maximum: Option<u32>) -> Limits {
        Limits { initial, maximum }
    }

    /// Returns the initial size.
    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Returns the declared maximum size, if any.
    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }

    pub(crate) fn from_elements(limits: &elements::ResizableLimits) -> Limits {
        Limits {
            initial: limits.initial(),
            maximum: limits.maximum(),
        }
    }
}

/// Description of a table: element type (always [`ValueType`]-external `funcref` in the
/// MVP) and [`Limits`] on its element count.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableType {
    limits: Limits,
}

impl TableType {
    /// Creates a new table type with the given limits.
    pub fn new(limits: Limits) -> TableType {
        TableType { limits }
    }

    /// Returns the limits on this table's element count.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(crate) fn from_elements(table_type: &elements::TableType) -> TableType {
        TableType {
            limits: Limits::from_elements(table_type.limits()),
        }
    }
}

/// Description of a linear memory: [`Limits`] on its page count (64 KiB per page).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryType {
    limits: Limits,
}

impl MemoryType {
    /// Creates a new memory type with the given limits, in pages.
    pub fn new(limits: Limits) -> MemoryType {
        MemoryType { limits }
    }

    /// Returns the limits on this memory's page count.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(crate) fn from_elements(memory_type: &elements::MemoryType) -> MemoryType {
        MemoryType {
            limits: Limits::from_elements(memory_type.limits()),
        }
    }
}

/// Description of a global variable: value type plus mutability.
///
/// Primarily used to describe imports and exports of globals.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlobalType {
    value_type: ValueType,
    mutable: bool,
}

impl GlobalType {
    /// Creates a new global type.
    pub fn new(value_type: ValueType, mutable: bool) -> GlobalType {
        GlobalType {
            value_type,
            mutable,
        }
    }

    /// Returns the value type of this global.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns whether this global is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub(crate) fn from_elements(global_type: &elements::GlobalType) -> GlobalType {
        GlobalType {
            value_type: ValueType::from_elements(global_type.content_type()),
            mutable: global_type.is_mutable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_display() {
        let sig = Signature::new(&[ValueType::I32, ValueType::I64][..], Some(ValueType::F32));
        assert_eq!(sig.to_string(), "(i32, i64) -> f32");
    }

    #[test]
    fn limits_without_maximum() {
        let limits = Limits::new(1, None);
        assert_eq!(limits.initial(), 1);
        assert_eq!(limits.maximum(), None);
    }
}
