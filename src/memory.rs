//! Runtime representation of linear memory: a contiguous, growable byte buffer
//! addressed by Wasm `load`/`store` instructions.

use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::ops::Range;

use crate::trap::{Trap, TrapKind};
use crate::value::LittleEndianConvert;

/// Bytes per page, fixed by the Wasm MVP.
pub const PAGE_SIZE: u32 = 65536;

/// Hard ceiling on page count: 4 GiB of address space.
pub const MAX_PAGES: u32 = 65536;

/// Reference-counted handle to a [`MemoryInstance`].
#[derive(Clone, Debug)]
pub struct MemoryRef(Rc<MemoryInstance>);

impl core::ops::Deref for MemoryRef {
    type Target = MemoryInstance;
    fn deref(&self) -> &MemoryInstance {
        &self.0
    }
}

/// A linear memory: `pages * PAGE_SIZE` zero-initialized bytes, growable up to an
/// optional declared maximum (or [`MAX_PAGES`] if unset).
pub struct MemoryInstance {
    buffer: RefCell<Vec<u8>>,
    initial: u32,
    current_pages: RefCell<u32>,
    maximum: Option<u32>,
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoryInstance")
            .field("initial", &self.initial)
            .field("current_pages", &self.current_pages.borrow())
            .field("maximum", &self.maximum)
            .finish()
    }
}

impl MemoryInstance {
    /// Allocates a memory of `initial` pages, optionally capped at `maximum` pages.
    pub fn alloc(initial: u32, maximum: Option<u32>) -> Result<MemoryRef, crate::trap::Error> {
        if initial > MAX_PAGES || maximum.map_or(false, |m| m > MAX_PAGES) {
            return Err(crate::trap::Error::Invalid(format!(
                "memory size exceeds the {} page limit",
                MAX_PAGES
            )));
        }
        if let Some(maximum) = maximum {
            if initial > maximum {
                return Err(crate::trap::Error::Invalid(format!(
                    "maximum memory size {} is less than initial {}",
                    maximum, initial
                )));
            }
        }
        let byte_len = initial as usize * PAGE_SIZE as usize;
        Ok(MemoryRef(Rc::new(MemoryInstance {
            buffer: RefCell::new(alloc::vec![0u8; byte_len]),
            initial,
            current_pages: RefCell::new(initial),
            maximum,
        })))
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }

    /// Current size in pages.
    pub fn current_size(&self) -> u32 {
        *self.current_pages.borrow()
    }

    fn checked_range(&self, offset: u32, size: usize) -> Result<Range<usize>, Trap> {
        let offset = offset as usize;
        let end = offset
            .checked_add(size)
            .ok_or_else(|| Trap::new(TrapKind::MemoryAccessOutOfBounds))?;
        if end > self.buffer.borrow().len() {
            return Err(Trap::new(TrapKind::MemoryAccessOutOfBounds));
        }
        Ok(offset..end)
    }

    /// Reads a little-endian-encoded value at `offset`.
    pub fn get_value<T: LittleEndianConvert>(&self, offset: u32) -> Result<T, Trap> {
        let range = self.checked_range(offset, core::mem::size_of::<T>())?;
        let buffer = self.buffer.borrow();
        Ok(T::from_little_endian(&buffer[range]).expect("range length matches T's encoded size"))
    }

    /// Writes a little-endian-encoded value at `offset`.
    pub fn set_value<T: LittleEndianConvert>(&self, offset: u32, value: T) -> Result<(), Trap> {
        let range = self.checked_range(offset, core::mem::size_of::<T>())?;
        let mut buffer = self.buffer.borrow_mut();
        value.into_little_endian(&mut buffer[range]);
        Ok(())
    }

    /// Copies `data` into memory starting at `offset`. Used to apply data segments;
    /// bounds are checked by the caller before any segment is applied.
    pub fn set(&self, offset: u32, data: &[u8]) -> Result<(), Trap> {
        let range = self.checked_range(offset, data.len())?;
        self.buffer.borrow_mut()[range].copy_from_slice(data);
        Ok(())
    }

    /// Copies `target.len()` bytes from `offset` into `target`.
    pub fn get_into(&self, offset: u32, target: &mut [u8]) -> Result<(), Trap> {
        let range = self.checked_range(offset, target.len())?;
        target.copy_from_slice(&self.buffer.borrow()[range]);
        Ok(())
    }

    /// Grows the memory by `additional` pages. Returns the page count before
    /// growing, or `None` if the grow would exceed the maximum (or the engine-wide
    /// cap) — the `grow_memory` instruction turns that into Wasm's `-1` sentinel.
    pub fn grow(&self, additional: u32) -> Option<u32> {
        let before = *self.current_pages.borrow();
        if additional == 0 {
            return Some(before);
        }
        let after = before.checked_add(additional)?;
        let cap = self.maximum.unwrap_or(MAX_PAGES);
        if after > cap {
            return None;
        }
        self.buffer
            .borrow_mut()
            .resize(after as usize * PAGE_SIZE as usize, 0);
        *self.current_pages.borrow_mut() = after;
        Some(before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_rejects_initial_over_maximum() {
        assert!(MemoryInstance::alloc(2, Some(1)).is_err());
    }

    #[test]
    fn set_get_round_trip() {
        let memory = MemoryInstance::alloc(1, None).unwrap();
        memory.set_value::<i32>(0, 42).unwrap();
        assert_eq!(memory.get_value::<i32>(0).unwrap(), 42);
    }

    #[test]
    fn out_of_bounds_access_traps() {
        let memory = MemoryInstance::alloc(1, None).unwrap();
        let err = memory.get_value::<i32>(PAGE_SIZE - 1).unwrap_err();
        assert!(matches!(err.kind(), TrapKind::MemoryAccessOutOfBounds));
    }

    #[test]
    fn grow_respects_maximum() {
        let memory = MemoryInstance::alloc(1, Some(2)).unwrap();
        assert_eq!(memory.grow(1), Some(1));
        assert_eq!(memory.current_size(), 2);
        assert_eq!(memory.grow(1), None);
    }
}
