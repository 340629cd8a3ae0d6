mod disasm;
mod run;

use clap::{Parser, Subcommand};
use dsp56k::TraceConfig;
use eyre_pretty::{Context, Result};
use std::{io::Write, path::PathBuf};

#[derive(Debug, Subcommand)]
enum Command {
    /// Disassemble DSP56300 program words
    ///
    /// The input is either ASCII hex, six digits per word, or raw 3-byte words.
    Disassemble {
        /// Path to the input file
        #[arg(short, long)]
        input: PathBuf,
        /// Path to the output file. Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Whether raw words are stored little endian
        #[arg(long, default_value_t = false)]
        le: bool,
    },
    /// Load a program image and run it
    Run {
        /// Path to the program image
        #[arg(short, long)]
        input: PathBuf,
        /// Core to run the program with
        #[arg(short, long, value_enum, default_value_t = run::CoreKind::Jit)]
        core: run::CoreKind,
        /// Maximum amount of instructions to execute
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        instructions: u64,
        /// Whether to log every executed instruction
        #[arg(long, default_value_t = false)]
        trace: bool,
        /// Whether to log reads of memory that was never written
        #[arg(long, default_value_t = false)]
        uninitialized: bool,
    },
    /// Load a program image and run it on both cores, checking that they agree
    Compare {
        /// Path to the program image
        #[arg(short, long)]
        input: PathBuf,
        /// Maximum amount of instructions to execute
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        instructions: u64,
        /// Amount of instructions between comparisons
        #[arg(long, default_value_t = 1000)]
        chunk: u64,
    },
}

/// A CLI to inspect and run DSP56300 code.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Action to take
    #[command(subcommand)]
    command: Command,
}

fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(
        "dsptool=info,cores=info,dspjit=info,dspint=info,dsp56k=info",
    ));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn disassemble(input: PathBuf, output: Option<PathBuf>, le: bool) -> Result<()> {
    let bytes = std::fs::read(&input).context("reading input file")?;
    let words = disasm::parse_words(&bytes, le)?;
    let lines = disasm::disassemble(&words);

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(&path).context("opening output file")?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    for line in lines {
        writeln!(out, "{line}")?;
    }

    out.flush()?;
    Ok(())
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Disassemble { input, output, le } => disassemble(input, output, le),
        Command::Run {
            input,
            core,
            instructions,
            trace,
            uninitialized,
        } => {
            let trace = TraceConfig {
                instructions: trace,
                uninitialized_reads: uninitialized,
                strict_memory: false,
            };

            run::run(&input, core, instructions, trace)
        }
        Command::Compare {
            input,
            instructions,
            chunk,
        } => run::compare(&input, instructions, chunk),
    }
}

fn main() {
    if let Err(e) = eyre_pretty::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    setup_tracing();

    let args = Args::parse();
    if let Err(e) = execute(args.command) {
        eprintln!("{e:?}");
        std::process::exit(-1);
    }
}
