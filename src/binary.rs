//! Decoding of the raw Wasm binary format.
//!
//! The wire-level grammar (magic number, version, LEB128 varints, section layout) is
//! decoded by [`parity-wasm`]; this module re-surfaces that decode as an explicit,
//! ordered stream of [`Payload`] events, the way a streaming binary reader would, so a
//! caller (here, the validator) can walk a module's declarations section by section
//! without matching on `parity_wasm::elements::Module` accessors directly.
//!
//! [`parity-wasm`]: https://docs.rs/parity-wasm

use alloc::string::ToString;
use alloc::vec::Vec;

use parity_wasm::elements::{self, Module as PModule};

use crate::trap::Error;

/// One section (or sub-entry) of a decoded module, in file order.
///
/// `CodeSectionEntry` is emitted once per function body, interleaved with nothing else,
/// so a validator can pair each entry with the corresponding `FunctionSection` index by
/// simple position.
#[derive(Debug)]
pub enum Payload<'a> {
    /// The `\0asm` magic number and version were recognized.
    Header { version: u32 },
    TypeSection(&'a [elements::Type]),
    ImportSection(&'a [elements::ImportEntry]),
    FunctionSection(&'a [elements::Func]),
    TableSection(&'a [elements::TableType]),
    MemorySection(&'a [elements::MemoryType]),
    GlobalSection(&'a [elements::GlobalEntry]),
    ExportSection(&'a [elements::ExportEntry]),
    StartSection(u32),
    ElementSection(&'a [elements::ElementSegment]),
    CodeSectionEntry(&'a elements::FuncBody),
    DataSection(&'a [elements::DataSegment]),
    CustomSection { name: &'a str, data: &'a [u8] },
    End,
}

/// Decodes a Wasm binary into its `parity-wasm` representation.
///
/// Any decode failure (bad magic, truncated varint, unknown section id, malformed
/// UTF-8 in a name, ...) is reported as [`Error::Malformed`]. `parity-wasm` does not
/// track byte offsets in its error type, so the offset is always reported as `0`; the
/// message carries the detail.
pub fn decode_module(bytes: &[u8]) -> Result<PModule, Error> {
    parity_wasm::deserialize_buffer::<PModule>(bytes)
        .map_err(|e| Error::Malformed(e.to_string(), 0))
}

/// Re-exposes an already-decoded module as an ordered stream of [`Payload`] events.
///
/// Sections absent from the module are simply skipped; this mirrors `parity-wasm`'s own
/// `Option`-returning section accessors.
pub fn payloads(module: &PModule) -> Vec<Payload<'_>> {
    let mut out = Vec::new();
    out.push(Payload::Header {
        version: module.version(),
    });

    if let Some(section) = module.type_section() {
        out.push(Payload::TypeSection(section.types()));
    }
    if let Some(section) = module.import_section() {
        out.push(Payload::ImportSection(section.entries()));
    }
    if let Some(section) = module.function_section() {
        out.push(Payload::FunctionSection(section.entries()));
    }
    if let Some(section) = module.table_section() {
        out.push(Payload::TableSection(section.entries()));
    }
    if let Some(section) = module.memory_section() {
        out.push(Payload::MemorySection(section.entries()));
    }
    if let Some(section) = module.global_section() {
        out.push(Payload::GlobalSection(section.entries()));
    }
    if let Some(section) = module.export_section() {
        out.push(Payload::ExportSection(section.entries()));
    }
    if let Some(start) = module.start_section() {
        out.push(Payload::StartSection(start));
    }
    if let Some(section) = module.elements_section() {
        out.push(Payload::ElementSection(section.entries()));
    }
    if let Some(section) = module.code_section() {
        for body in section.bodies() {
            out.push(Payload::CodeSectionEntry(body));
        }
    }
    if let Some(section) = module.data_section() {
        out.push(Payload::DataSection(section.entries()));
    }
    for custom in module.custom_sections() {
        out.push(Payload::CustomSection {
            name: custom.name(),
            data: custom.payload(),
        });
    }

    out.push(Payload::End);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = decode_module(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::Malformed(_, _)));
    }

    #[test]
    fn empty_module_decodes_to_header_and_end() {
        let wasm = wat::parse_str("(module)").unwrap();
        let module = decode_module(&wasm).unwrap();
        let events = payloads(&module);
        assert!(matches!(events.first(), Some(Payload::Header { version: 1 })));
        assert!(matches!(events.last(), Some(Payload::End)));
    }

    #[test]
    fn function_section_is_surfaced() {
        let wasm = wat::parse_str(
            r#"(module
                 (func $f (result i32) i32.const 0)
               )"#,
        )
        .unwrap();
        let module = decode_module(&wasm).unwrap();
        let events = payloads(&module);
        assert!(events
            .iter()
            .any(|p| matches!(p, Payload::TypeSection(types) if types.len() == 1)));
        assert!(events
            .iter()
            .any(|p| matches!(p, Payload::CodeSectionEntry(_))));
    }
}
