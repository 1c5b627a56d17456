//! `replayer <input-file>` (SPEC_FULL.md §6): replays a previously recorded
//! binary input file against the entry in Run mode and prints its result.

use clap::Parser;
use input_gen::config::{ConfigEntrySelector, ConfigMode, InstrumentOptions};
use input_gen::driver;
use input_gen::ir::samples;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "replayer")]
struct Args {
    /// Embedded sample function the input file was recorded against.
    #[arg(long, default_value = "write_then_read")]
    sample: String,
    /// Address the input file's memory blob is mapped at before replay.
    #[arg(long, default_value_t = 0)]
    load_base: u64,
    input_file: PathBuf,
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

    match run(&args) {
        Ok(result) => {
            println!("{result:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("replayer: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<Option<input_gen::runtime::Scalar>> {
    let target = samples::by_name(&args.sample).ok_or_else(|| anyhow::anyhow!("no such sample `{}`", args.sample))?;
    let module = samples::wrap_module(target);
    let options = InstrumentOptions {
        mode: ConfigMode::Run,
        entry: ConfigEntrySelector::Name(args.sample.clone()),
        ..InstrumentOptions::default()
    };
    Ok(driver::replay(&module, &options, &args.input_file, args.load_base)?)
}
