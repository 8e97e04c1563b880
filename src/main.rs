use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use thiserror::Error;

use ls8_emulator::alu::AluMode;
use ls8_emulator::cpu::{Cpu, MachineConfig};
use ls8_emulator::error::{LoadError, Ls8Error};
use ls8_emulator::loader::load_file;
use ls8_emulator::snapshots::MachineSnapshot;

/// LS-8 emulator: run an assembled bytecode image
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the .ls8 image
    image: PathBuf,

    /// Log a trace line before every instruction
    #[arg(long)]
    trace: bool,

    /// Use conventional SUB and bitwise semantics
    #[arg(long)]
    corrected: bool,

    /// Give up after this many instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,

    /// Print the final machine state as JSON after the program output
    #[arg(long)]
    dump_state: bool,
}

#[derive(Debug, Error)]
enum Failure {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Machine(#[from] Ls8Error),

    #[error("failed to serialize machine state: {0}")]
    Dump(#[from] serde_json::Error),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Load(LoadError::NotFound(_)) => 2,
            _ => 1,
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    let level = if args.trace {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    };
    if let Err(err) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("warning: logging disabled: {}", err);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            match &failure {
                Failure::Load(LoadError::NotFound(path)) => {
                    log::debug!("no image at {}", path.display());
                    eprintln!("File not found");
                }
                _ => eprintln!("error: {}", failure),
            }
            ExitCode::from(failure.exit_code())
        }
    }
}

fn run(args: &Args) -> Result<(), Failure> {
    let program = load_file(&args.image)?;

    let config = MachineConfig {
        alu_mode: if args.corrected {
            AluMode::Corrected
        } else {
            AluMode::Compatible
        },
        max_steps: args.max_steps,
    };
    let mut cpu = Cpu::with_config(config);
    cpu.load(&program)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cpu.run(&mut out)?;

    if args.dump_state {
        let snapshot = MachineSnapshot::capture("cli", &cpu);
        serde_json::to_writer_pretty(&mut out, &snapshot)?;
        writeln!(out).map_err(Ls8Error::from)?;
    }
    Ok(())
}
