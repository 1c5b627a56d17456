//! Top-level instrumentation orchestration (SPEC_FULL.md §2/§4).
//!
//! Ties together the module pruner, entry synthesizer and declaration
//! stubber into the single "instrument this module for mode M" operation a
//! real compiler pass would run once per module. The classifier and
//! lowering passes aren't invoked here — they run lazily, per instruction,
//! inside [`crate::exec::run`] — but everything that must happen once,
//! up-front, against the whole module does happen here.

use crate::abi::Mode;
use crate::config::InstrumentOptions;
use crate::entry::{self, EntrySelector, SynthesizedEntry};
use crate::error::Result;
use crate::ir::Module;
use crate::pruner;
use crate::stubber::{self, CompanionGlobal, StubBody};
use log::{debug, info};

/// One declaration's resolved stub body, keyed by name — what `exec`
/// consults instead of re-deriving it from the module on every call.
#[derive(Debug, Clone)]
pub struct StubPlan {
    pub declaration: String,
    pub body: StubBody,
}

/// The result of instrumenting one module for one target/mode: the
/// synthesized entry, and (if module pruning ran) the pruned module.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub entry: SynthesizedEntry,
    pub module: Module,
    pub stubs: Vec<StubPlan>,
    /// The `__input_gen_init` plan: one companion pointer per recorded
    /// global (SPEC_FULL.md §4.4).
    pub globals: Vec<CompanionGlobal>,
}

/// Instruments `module` in place per `options`: prunes dead functions (if
/// enabled), resolves the entry point, and plans a stub body for every
/// surviving declaration. Mirrors the single-threaded, mutate-in-place
/// concurrency model of the real transform (SPEC_FULL.md §5).
pub fn instrument(mut module: Module, options: &InstrumentOptions) -> Result<Instrumented> {
    let mode: Mode = options.mode.into();
    let selector: EntrySelector = options.entry.clone().into();

    let target_name = entry::synthesize(&module, &selector, mode, false)?.function_name;
    info!("instrumenting `{target_name}` for {mode:?}");

    if options.prune_module {
        let before = module.functions.len();
        pruner::prune(&mut module, &target_name);
        debug!("pruned {} dead function(s)", before - module.functions.len());
    }

    let entry = entry::synthesize(&module, &EntrySelector::Name(target_name), mode, options.version_check)?;

    let stubs = module
        .functions
        .iter()
        .filter_map(|f| stubber::classify_declaration(f, mode).map(|body| StubPlan { declaration: f.name.clone(), body }))
        .collect();

    let globals = stubber::plan_global_rewrite(&module);
    debug!("planned {} companion global(s)", globals.len());

    Ok(Instrumented { entry, module, stubs, globals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigEntrySelector, ConfigMode};
    use crate::ir::samples;

    fn options(name: &str, mode: ConfigMode) -> InstrumentOptions {
        InstrumentOptions {
            mode,
            entry: ConfigEntrySelector::Name(name.to_string()),
            ..InstrumentOptions::default()
        }
    }

    #[test]
    fn instrumenting_prunes_and_resolves_the_entry() {
        let module = samples::wrap_module(samples::add_vectors(1));
        let result = instrument(module, &options("add", ConfigMode::Generate)).unwrap();
        assert_eq!(result.entry.function_name, "add");
        assert!(result.module.function("dead_helper").is_none());
        assert!(result.module.function("add_i32").is_some());
    }

    #[test]
    fn a_surviving_declaration_gets_a_stub_plan() {
        let module = samples::wrap_module(samples::add_vectors(1));
        let result = instrument(module, &options("add", ConfigMode::Generate)).unwrap();
        assert!(result.stubs.iter().any(|s| s.declaration == "add_i32"));
    }

    #[test]
    fn record_mode_carries_a_version_check_by_default() {
        let module = samples::wrap_module(samples::write_then_read());
        let result = instrument(module, &options("write_then_read", ConfigMode::Record)).unwrap();
        assert!(result.entry.expected_version.is_some());
    }

    #[test]
    fn disabling_pruning_keeps_the_dead_helper() {
        let module = samples::wrap_module(samples::write_then_read());
        let mut opts = options("write_then_read", ConfigMode::Generate);
        opts.prune_module = false;
        let result = instrument(module, &opts).unwrap();
        assert!(result.module.function("dead_helper").is_some());
    }
}
