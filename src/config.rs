//! Engine-wide configuration: stack sizes and the handful of behavioral toggles
//! threaded through [`crate::thread::Thread`].

use alloc::boxed::Box;
use core::fmt::Write;

/// Default value stack depth, in slots.
pub const DEFAULT_VALUE_STACK_SIZE: usize = 16 * 1024;

/// Default call stack depth, in frames.
pub const DEFAULT_CALL_STACK_SIZE: usize = 1024;

/// A sink for human-readable execution traces, written one line per executed
/// instruction when [`Config::trace`] is set.
pub trait TraceSink {
    fn write_trace(&mut self, line: &core::fmt::Arguments);
}

impl<W: Write> TraceSink for W {
    fn write_trace(&mut self, line: &core::fmt::Arguments) {
        let _ = self.write_fmt(*line);
        let _ = self.write_char('\n');
    }
}

/// Named engine options.
///
/// Mirrors the teacher's small, copyable options-struct style (see
/// [`crate::types::Signature`]) rather than a builder with chained setters.
pub struct Config {
    /// Maximum number of value-stack slots a single [`crate::thread::Thread`] may hold.
    pub value_stack_size: usize,
    /// Maximum call-stack depth, in frames.
    pub call_stack_size: usize,
    /// When set, every executed instruction is written to `log_stream`.
    pub trace: bool,
    /// Destination for trace output; ignored unless `trace` is set.
    pub log_stream: Option<Box<dyn TraceSink>>,
    /// When set, [`crate::invoke_all_zero_arg_exports`] runs every zero-argument
    /// function export on a module instead of doing nothing; unset, it is a no-op.
    /// A caller naming one specific export directly (`invoke_export`) is unaffected
    /// either way.
    pub run_all_exports: bool,
    /// Accepted for parity with the named options in SPEC_FULL.md §6, but not
    /// currently consulted anywhere in this crate — there is no conformance-test
    /// harness built on top of it yet to relax assumptions for. Reserved for that
    /// use; see `DESIGN.md`.
    pub spec_mode: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value_stack_size: DEFAULT_VALUE_STACK_SIZE,
            call_stack_size: DEFAULT_CALL_STACK_SIZE,
            trace: false,
            log_stream: None,
            run_all_exports: false,
            spec_mode: false,
        }
    }
}

impl Clone for Config {
    fn clone(&self) -> Config {
        Config {
            value_stack_size: self.value_stack_size,
            call_stack_size: self.call_stack_size,
            trace: self.trace,
            // A trace sink is a live destination, not data; a clone starts untraced.
            log_stream: None,
            run_all_exports: self.run_all_exports,
            spec_mode: self.spec_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_named_values() {
        let config = Config::default();
        assert_eq!(config.value_stack_size, 16 * 1024);
        assert_eq!(config.call_stack_size, 1024);
        assert!(!config.trace);
        assert!(!config.run_all_exports);
        assert!(!config.spec_mode);
    }
}
