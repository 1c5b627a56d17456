//! Entry-point synthesizer (SPEC_FULL.md §4.3).
//!
//! Resolves which function in a module is the target, and records the
//! per-mode wrapper shape [`crate::exec::run`] needs to drive it: which
//! arguments it taps versus fabricates, and — for Record — which ABI version
//! it was instrumented against. This crate has no codegen backend, so
//! "synthesizing a wrapper" means building this small descriptor rather than
//! emitting new IR; `exec` is the thing that actually behaves like the
//! wrapper would.

use crate::abi::{self, Mode};
use crate::error::{Error, Result};
use crate::ir::{Function, Module};

/// How the target function is picked out of a module, mirroring
/// `config::InstrumentOptions`'s name-or-index entry selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelector {
    Name(String),
    Index(usize),
}

fn resolve<'a>(module: &'a Module, selector: &EntrySelector) -> Result<&'a Function> {
    match selector {
        EntrySelector::Name(name) => module
            .function(name)
            .ok_or_else(|| Error::NoSuchEntryPoint(name.clone())),
        EntrySelector::Index(index) => module
            .functions
            .get(*index)
            .ok_or_else(|| Error::NoSuchEntryPoint(format!("#{index}"))),
    }
}

/// The synthesized wrapper's shape for one target function under one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedEntry {
    pub function_name: String,
    pub mode: Mode,
    /// `Some` only for Record, and only when version-checking is enabled —
    /// the version the instrumented artifact was built against.
    pub expected_version: Option<u32>,
}

impl SynthesizedEntry {
    #[must_use]
    pub fn symbol(&self) -> String {
        abi::entry_symbol(Some(&self.function_name))
    }
}

/// Resolves `selector` in `module` and builds its [`SynthesizedEntry`].
/// Fails fast (SPEC_FULL.md §7) if the name/index doesn't exist or names a
/// declaration — there's no body to instrument.
pub fn synthesize(module: &Module, selector: &EntrySelector, mode: Mode, version_check: bool) -> Result<SynthesizedEntry> {
    let func = resolve(module, selector)?;
    if func.is_declaration {
        return Err(Error::EntryPointIsDeclaration(func.name.clone()));
    }
    Ok(SynthesizedEntry {
        function_name: func.name.clone(),
        mode,
        expected_version: (mode == Mode::Record && version_check).then_some(abi::ABI_VERSION),
    })
}

/// Checks a synthesized Record-mode entry's expected version against the
/// runtime's actual one (SPEC_FULL.md §4.3/§7) before `exec` ever runs it —
/// the Rust-native stand-in for a stale runtime simply failing to link.
pub fn check_version(entry: &SynthesizedEntry, runtime_version: u32) -> Result<()> {
    match entry.expected_version {
        Some(expected) if expected != runtime_version => Err(Error::VersionMismatch {
            expected,
            found: runtime_version,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::samples;

    #[test]
    fn resolves_by_name() {
        let module = samples::wrap_module(samples::write_then_read());
        let entry = synthesize(&module, &EntrySelector::Name("write_then_read".to_string()), Mode::Generate, true).unwrap();
        assert_eq!(entry.function_name, "write_then_read");
        assert_eq!(entry.expected_version, None, "only Record carries a version to check");
    }

    #[test]
    fn record_mode_carries_the_abi_version_when_checking_is_on() {
        let module = samples::wrap_module(samples::write_then_read());
        let entry = synthesize(&module, &EntrySelector::Name("write_then_read".to_string()), Mode::Record, true).unwrap();
        assert_eq!(entry.expected_version, Some(abi::ABI_VERSION));
        check_version(&entry, abi::ABI_VERSION).unwrap();
        assert!(check_version(&entry, abi::ABI_VERSION + 1).is_err());
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let module = samples::wrap_module(samples::write_then_read());
        let err = synthesize(&module, &EntrySelector::Name("nope".to_string()), Mode::Generate, true).unwrap_err();
        assert!(matches!(err, Error::NoSuchEntryPoint(_)));
    }

    #[test]
    fn declaration_entry_point_is_an_error() {
        let module = samples::wrap_module(samples::write_then_read());
        let err = synthesize(&module, &EntrySelector::Name("add_i32".to_string()), Mode::Generate, true).unwrap_err();
        assert!(matches!(err, Error::EntryPointIsDeclaration(_)));
    }
}
