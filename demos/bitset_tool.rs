//! Command-line front-end for bitset files.
//!
//! ```bash
//! cargo run --example bitset-tool -- set seen.bitset 1 5 1000
//! cargo run --example bitset-tool -- get seen.bitset 0 5 7
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mmap_bitset::options::{parse_indices, Options};
use mmap_bitset::Bitset;

#[derive(Parser)]
#[command(author, version, about = "Inspect and modify persistent bitsets")]
struct Cli {
    /// Open options as `key=value` pairs (e.g. `size=1024`), used when creating
    #[arg(short, long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the state (0 or 1) of each bit
    Get { path: PathBuf, indices: Vec<String> },

    /// Set bits
    Set { path: PathBuf, indices: Vec<String> },

    /// Clear bits
    Unset { path: PathBuf, indices: Vec<String> },

    /// Print the capacity of the bitset
    Info { path: PathBuf },

    /// Remove the bitset
    Delete { path: PathBuf },
}

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();

    simplelog::TermLogger::init(
        if cli.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Warn
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let options = Options::parse(cli.options.iter().map(String::as_str))?;

    let (path, indices) = match &cli.command {
        Commands::Get { path, indices } | Commands::Set { path, indices } | Commands::Unset { path, indices } => {
            (path, parse_indices(indices.iter().map(String::as_str))?)
        }
        Commands::Info { path } | Commands::Delete { path } => (path, Vec::new()),
    };

    let bitset = match Bitset::open(path, options) {
        Ok(bitset) => bitset,
        Err(e) => return Ok(report(e)),
    };

    let result = match cli.command {
        Commands::Get { .. } => bitset.get(&indices).map(|states| {
            let states: Vec<String> = states.iter().map(u8::to_string).collect();
            println!("{}", states.join(" "));
        }),
        Commands::Set { .. } => bitset.set(&indices),
        Commands::Unset { .. } => bitset.unset(&indices),
        Commands::Info { .. } => {
            println!("path = {}", bitset.path().display());
            println!("capacity = {}", bitset.capacity());
            Ok(())
        }
        Commands::Delete { .. } => return Ok(bitset.delete().map_or_else(report, |()| ExitCode::SUCCESS)),
    };

    match result.and_then(|()| bitset.close()) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => Ok(report(e)),
    }
}

fn report(e: mmap_bitset::Error) -> ExitCode {
    eprintln!("error: {} ({})", e, e.name());
    ExitCode::from(e.exit_code() as u8)
}
