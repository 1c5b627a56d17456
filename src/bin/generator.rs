//! `generator <output-dir|"-"> <start> <end>` (SPEC_FULL.md §6).
//!
//! This crate has no LLVM frontend, so "the module" a real `generator`
//! would have linked against is one of the embedded [`input_gen::ir::samples`]
//! functions, picked with `--sample`.

use clap::Parser;
use input_gen::config::{ConfigEntrySelector, ConfigMode, InstrumentOptions};
use input_gen::driver;
use input_gen::ir::samples;
use std::path::PathBuf;
use std::process::ExitCode;

/// Generates synthetic inputs for a single function over a range of seeds.
#[derive(Parser)]
#[command(name = "generator")]
struct Args {
    /// Embedded sample function to treat as the instrumentation target.
    #[arg(long, default_value = "write_then_read")]
    sample: String,
    /// Directory to write `<exe>.code.<seed>.c` / `<exe>.report.<seed>.c`
    /// into, or `-` to run every seed without writing anything.
    output_dir: String,
    start: i64,
    end: i64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    if args.end <= args.start {
        eprintln!("generator: empty seed range [{}, {})", args.start, args.end);
        return ExitCode::from(1);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("generator: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let target = samples::by_name(&args.sample).ok_or_else(|| anyhow::anyhow!("no such sample `{}`", args.sample))?;
    let module = samples::wrap_module(target);
    let options = InstrumentOptions {
        mode: ConfigMode::Generate,
        entry: ConfigEntrySelector::Name(args.sample.clone()),
        ..InstrumentOptions::default()
    };
    let executable_path = PathBuf::from(format!("{}.exe", args.sample));

    let outcomes = driver::generate(&module, &options, &executable_path, &args.output_dir, args.start, args.end)?;
    let mut failed = 0;
    for outcome in outcomes {
        if let Err(err) = outcome.result {
            eprintln!("generator: seed {}: {err}", outcome.seed);
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} seed(s) failed", args.end - args.start);
    }
    Ok(())
}
