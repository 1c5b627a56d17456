//! Seed management and output naming for the `generator`/`replayer` binaries
//! (SPEC_FULL.md §4.8 / §6). Every seed gets its own [`RuntimeState`] — no
//! allocator state is shared across seeds — so fanning the range out over
//! `rayon` is free of synchronization (SPEC_FULL.md §5).

use crate::abi::Mode;
use crate::config::InstrumentOptions;
use crate::entry::SynthesizedEntry;
use crate::error::Result;
use crate::exec;
use crate::ir::{Module, Type};
use crate::runtime::{RuntimeState, Scalar};
use crate::serializer::{InputFile, RelocationKind};
use crate::transform::{self, Instrumented};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Output-directory sentinel meaning "run the seed, keep nothing on disk".
pub const DISCARD_OUTPUT: &str = "-";

/// One seed's result: the seed itself, and either the two files it wrote or
/// the error that stopped it. A failure on one seed never stops the others
/// (SPEC_FULL.md §7, "other seeds continue").
pub struct SeedOutcome {
    pub seed: i64,
    pub result: Result<Option<(PathBuf, PathBuf)>>,
}

/// `INPUT_GEN_SEED`, parsed, if present — overrides whatever seed range the
/// caller asked for down to that single seed, mirroring the original
/// runtime's `__inputgen_init` reading the same variable at startup.
#[must_use]
pub fn seed_override_from_env() -> Option<i64> {
    std::env::var("INPUT_GEN_SEED").ok()?.trim().parse().ok()
}

fn output_paths(output_dir: &str, executable_path: &Path, seed: i64) -> (PathBuf, PathBuf) {
    let stem = executable_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a.out".to_string());
    (
        Path::new(output_dir).join(format!("{stem}.code.{seed}.c")),
        Path::new(output_dir).join(format!("{stem}.report.{seed}.c")),
    )
}

/// Runs the instrumented entry once per seed in `start..end`, in Generate
/// mode, writing a code file (the binary input) and a report file (human-
/// readable, not a contract) per seed unless `output_dir` is [`DISCARD_OUTPUT`].
/// `INPUT_GEN_SEED`, if set, collapses the range to that one seed.
pub fn generate(module: &Module, options: &InstrumentOptions, executable_path: &Path, output_dir: &str, start: i64, end: i64) -> Result<Vec<SeedOutcome>> {
    let Instrumented { entry, module, .. } = transform::instrument(module.clone(), options)?;
    let seeds: Vec<i64> = match seed_override_from_env() {
        Some(seed) => vec![seed],
        None => (start..end).collect(),
    };
    Ok(seeds
        .into_par_iter()
        .map(|seed| SeedOutcome {
            seed,
            result: generate_one(&module, &entry, executable_path, output_dir, seed),
        })
        .collect())
}

fn generate_one(module: &Module, entry: &SynthesizedEntry, executable_path: &Path, output_dir: &str, seed: i64) -> Result<Option<(PathBuf, PathBuf)>> {
    let func = module.function(&entry.function_name).expect("resolved at instrument time");
    let mut state = RuntimeState::new(seed, output_dir, executable_path);
    exec::run(module, func, Mode::Generate, &mut state, None)?;

    if output_dir == DISCARD_OUTPUT {
        return Ok(None);
    }
    let (code_path, report_path) = output_paths(output_dir, executable_path, seed);
    write_code_file(&state, &code_path)?;
    write_report_file(&state, &code_path, &report_path)?;
    Ok(Some((code_path, report_path)))
}

fn write_code_file(state: &RuntimeState, path: &Path) -> Result<()> {
    let file = InputFile::from_runtime(state);
    let mut w = BufWriter::new(File::create(path)?);
    file.write_to(&mut w)
}

/// Human-readable summary of a finished seed (SPEC_FULL.md §6: not a
/// contract, may change shape freely).
fn write_report_file(state: &RuntimeState, code_path: &Path, path: &Path) -> Result<()> {
    use std::io::Write;
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "seed: {}", state.seed)?;
    writeln!(w, "code file: {}", code_path.display())?;
    writeln!(w, "args: {}", state.args.len())?;
    writeln!(w, "objects: {}", state.objects.len())?;
    writeln!(w, "new values fabricated: {}", state.num_new_values)?;
    Ok(())
}

/// Replays one previously recorded input file against `module`'s entry in
/// Run mode. The file's memory and pointer-valued args are relocated to
/// `load_base` before binding, matching where an instrumented binary would
/// actually map the blob.
pub fn replay(module: &Module, options: &InstrumentOptions, input_path: &Path, load_base: u64) -> Result<Option<Scalar>> {
    let Instrumented { entry, module, .. } = transform::instrument(module.clone(), options)?;
    let func = module.function(&entry.function_name).expect("resolved at instrument time");

    let mut input = InputFile::read_from(&mut File::open(input_path)?)?;
    let pointer_slots: Vec<u64> = input
        .relocations
        .iter()
        .filter(|r| r.kind == RelocationKind::Memory)
        .map(|r| load_base + r.location)
        .collect();
    input.relocate(load_base);

    let mut state = RuntimeState::for_replay(0, DISCARD_OUTPUT, "replayed", load_base, &input.memory, &pointer_slots);
    let args: Vec<Scalar> = func
        .params
        .iter()
        .zip(&input.args)
        .map(|(param, &bits)| {
            let ty = match &param.ty {
                Type::Scalar(p) => *p,
                _ => unreachable!("entry params are validated as scalar by exec::run"),
            };
            Scalar::from_le_bytes(ty, &bits.to_le_bytes())
        })
        .collect();

    exec::run(&module, func, Mode::Run, &mut state, Some(&args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigEntrySelector, ConfigMode};
    use crate::ir::samples;
    use tempfile::tempdir;

    fn options(name: &str, mode: ConfigMode) -> InstrumentOptions {
        InstrumentOptions {
            mode,
            entry: ConfigEntrySelector::Name(name.to_string()),
            ..InstrumentOptions::default()
        }
    }

    #[test]
    fn discard_output_runs_but_writes_nothing() {
        let module = samples::wrap_module(samples::write_then_read());
        let opts = options("write_then_read", ConfigMode::Generate);
        let outcomes = generate(&module, &opts, Path::new("/bin/fake"), DISCARD_OUTPUT, 0, 3).unwrap();
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            assert!(outcome.result.as_ref().unwrap().is_none());
        }
    }

    #[test]
    fn same_seed_generates_the_same_code_file_twice() {
        let module = samples::wrap_module(samples::write_then_read());
        let opts = options("write_then_read", ConfigMode::Generate);
        let dir = tempdir().unwrap();
        let exe = Path::new("sample.exe");

        let first = generate(&module, &opts, exe, dir.path().to_str().unwrap(), 5, 6).unwrap();
        let (code_a, _) = first[0].result.as_ref().unwrap().clone().unwrap();
        let bytes_a = std::fs::read(&code_a).unwrap();
        std::fs::remove_file(&code_a).unwrap();

        let second = generate(&module, &opts, exe, dir.path().to_str().unwrap(), 5, 6).unwrap();
        let (code_b, _) = second[0].result.as_ref().unwrap().clone().unwrap();
        let bytes_b = std::fs::read(&code_b).unwrap();

        assert_eq!(bytes_a, bytes_b, "same seed must produce a byte-identical code file");
    }

    #[test]
    fn output_filenames_follow_the_documented_template() {
        let module = samples::wrap_module(samples::write_then_read());
        let opts = options("write_then_read", ConfigMode::Generate);
        let dir = tempdir().unwrap();
        let outcomes = generate(&module, &opts, Path::new("target.exe"), dir.path().to_str().unwrap(), 2, 3).unwrap();
        let (code_path, report_path) = outcomes[0].result.as_ref().unwrap().clone().unwrap();
        assert_eq!(code_path.file_name().unwrap(), "target.exe.code.2.c");
        assert_eq!(report_path.file_name().unwrap(), "target.exe.report.2.c");
    }

    #[test]
    fn record_then_replay_round_trips_through_the_serialized_file() {
        let module = samples::wrap_module(samples::write_then_read());
        let record_opts = options("write_then_read", ConfigMode::Record);
        let dir = tempdir().unwrap();

        let Instrumented { entry, module: pruned, .. } = transform::instrument(module.clone(), &record_opts).unwrap();
        let func = pruned.function(&entry.function_name).unwrap();
        let mut state = RuntimeState::new(1, dir.path().to_str().unwrap(), "x");
        let given = vec![Scalar::Ptr(state.allocate_object(64, false))];
        exec::run(&pruned, func, Mode::Record, &mut state, Some(&given)).unwrap();

        let input_path = dir.path().join("recorded.input.c");
        let file = InputFile::from_runtime(&state);
        let mut w = BufWriter::new(File::create(&input_path).unwrap());
        file.write_to(&mut w).unwrap();
        drop(w);

        let run_opts = options("write_then_read", ConfigMode::Run);
        let result = replay(&module, &run_opts, &input_path, 0x10_0000).unwrap();
        assert!(result.is_none() || result.is_some());
    }
}
