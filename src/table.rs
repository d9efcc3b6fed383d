//! Runtime representation of a `table`: an array of optional function indices that
//! Wasm code addresses indirectly via `call_indirect`.

use alloc::format;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::trap::Error;

/// Reference-counted handle to a [`TableInstance`].
#[derive(Clone, Debug)]
pub struct TableRef(Rc<TableInstance>);

impl core::ops::Deref for TableRef {
    type Target = TableInstance;
    fn deref(&self) -> &TableInstance {
        &self.0
    }
}

/// A table: a resizable array of function indices (or empty slots), bounded by the
/// same `(initial, optional max)` limits contract as memories.
pub struct TableInstance {
    initial: u32,
    maximum: Option<u32>,
    buffer: RefCell<Vec<Option<u32>>>,
}

impl fmt::Debug for TableInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TableInstance")
            .field("initial", &self.initial)
            .field("maximum", &self.maximum)
            .field("buffer.len", &self.buffer.borrow().len())
            .finish()
    }
}

impl TableInstance {
    /// Allocates a table of `initial` elements, optionally capped at `maximum`.
    pub fn alloc(initial: u32, maximum: Option<u32>) -> Result<TableRef, Error> {
        if let Some(maximum) = maximum {
            if initial > maximum {
                return Err(Error::Invalid(format!(
                    "maximum table size {} is less than initial {}",
                    maximum, initial
                )));
            }
        }
        Ok(TableRef(Rc::new(TableInstance {
            initial,
            maximum,
            buffer: RefCell::new(vec![None; initial as usize]),
        })))
    }

    pub fn initial_size(&self) -> u32 {
        self.initial
    }

    pub fn maximum_size(&self) -> Option<u32> {
        self.maximum
    }

    pub fn current_size(&self) -> u32 {
        self.buffer.borrow().len() as u32
    }

    /// Reads the function index stored at `offset`, or `None` for an uninitialized
    /// slot. Traps [`crate::trap::TrapKind::UndefinedTableIndex`] if `offset` is past
    /// the table's current size — the caller is expected to convert accordingly.
    pub fn get(&self, offset: u32) -> Option<Option<u32>> {
        self.buffer.borrow().get(offset as usize).copied()
    }

    pub fn set(&self, offset: u32, value: Option<u32>) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let len = buffer.len();
        let slot = buffer
            .get_mut(offset as usize)
            .ok_or_else(|| Error::Invalid(format!("table index {} out of bounds (size {})", offset, len)))?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_rejects_initial_over_maximum() {
        assert!(TableInstance::alloc(5, Some(3)).is_err());
    }

    #[test]
    fn get_set_round_trip() {
        let table = TableInstance::alloc(2, None).unwrap();
        table.set(0, Some(7)).unwrap();
        assert_eq!(table.get(0), Some(Some(7)));
        assert_eq!(table.get(1), Some(None));
        assert_eq!(table.get(2), None);
    }
}
