// File: src/main.rs
//
// Main entry point for the comefrom compiler.
// Handles command-line argument parsing and dispatches to the appropriate
// subcommand (run, check, or dump).

use clap::{Args, Parser as ClapParser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use comefrom::bytecode::{Chunk, Op};
use comefrom::config::Options;
use comefrom::driver::Driver;
use comefrom::errors::IckError;

#[derive(ClapParser)]
#[command(
    name = "comefrom",
    about = "comefrom: an INTERCAL compiler and nexting-stack runtime",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Path to the .i file
    file: PathBuf,

    /// Link a library (.i) ahead of the system library; repeatable
    #[arg(long = "link", value_name = "LIB")]
    link: Vec<PathBuf>,

    /// Config file; defaults to ./comefrom.toml when present
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compile and run a program
    Run {
        #[command(flatten)]
        common: Common,

        /// Deepest the nexting stack may grow
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Seed for %-chance and random numbers
        #[arg(long, value_name = "N")]
        seed: Option<u64>,

        /// Log every executed statement to stderr
        #[arg(long)]
        trace: bool,

        /// Do not link the system library
        #[arg(long)]
        no_stdlib: bool,
    },

    /// Compile only, and report statements that would fail if reached
    Check {
        #[command(flatten)]
        common: Common,
    },

    /// Print the compiled listing
    Dump {
        #[command(flatten)]
        common: Common,
    },
}

fn init_logging(trace: bool) {
    let filter = if trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn prepare(common: &Common, adjust: impl FnOnce(&mut Options)) -> Result<(Driver, Chunk), IckError> {
    let mut options = Options::discover(common.config.as_deref())?;
    adjust(&mut options);
    init_logging(options.trace);

    let mut driver = Driver::new(options);
    driver.load_libraries(&common.link)?;
    let chunk = driver.compile_file(&common.file)?;
    Ok((driver, chunk))
}

fn report(chunk: &Chunk) {
    let splats = chunk.instructions.iter().filter(|i| matches!(i.op, Op::Splat { .. })).count();
    let lost: Vec<String> = chunk
        .instructions
        .iter()
        .filter_map(|i| match i.op {
            Op::Lost { label } => Some(format!("({})", label)),
            _ => None,
        })
        .collect();
    println!(
        "{}: {} statements, {} abstain slots, {} splatted",
        chunk.name,
        chunk.len(),
        chunk.abstain_defaults.len(),
        splats
    );
    if !lost.is_empty() {
        println!("unresolved NEXT targets: {}", lost.join(" "));
    }
}

fn execute(command: Commands) -> Result<(), IckError> {
    match command {
        Commands::Run { common, max_depth, seed, trace, no_stdlib } => {
            let (driver, chunk) = prepare(&common, |options| {
                if let Some(depth) = max_depth {
                    options.max_nexting_depth = depth;
                }
                if seed.is_some() {
                    options.seed = seed;
                }
                options.trace |= trace;
                options.stdlib &= !no_stdlib;
            })?;
            let ctx = driver.context();
            driver.run_blocking(chunk, ctx)?;
        }

        Commands::Check { common } => {
            let (_, chunk) = prepare(&common, |_| {})?;
            report(&chunk);
        }

        Commands::Dump { common } => {
            let (_, chunk) = prepare(&common, |_| {})?;
            print!("{}", chunk);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = execute(cli.command) {
        eprint!("{}", err);
        process::exit(1);
    }
}
