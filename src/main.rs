//! CLI entry point: `simulatron run --rom <path> --disk-a <dir> --disk-b <dir>
//! [--log-level <level>]` (§6/§10).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use simulatron::config::Config;
use simulatron::Machine;

#[derive(Parser, Debug)]
#[command(name = "simulatron", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot a machine from a ROM image and two disk directories.
    Run {
        /// Path to a 512-byte ROM image.
        #[arg(long)]
        rom: PathBuf,

        /// Directory backing disk controller A (zero or one file).
        #[arg(long = "disk-a")]
        disk_a: PathBuf,

        /// Directory backing disk controller B (zero or one file).
        #[arg(long = "disk-b")]
        disk_b: PathBuf,

        /// `tracing` filter directive, e.g. "info" or "simulatron=debug".
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Command::Run { rom, disk_a, disk_b, log_level } = cli.command;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&log_level).unwrap_or_default())
        .init();

    let config = Config::validate(rom, disk_a, disk_b, log_level).context("loading configuration")?;

    let mut machine = Machine::new(&config).context("constructing machine")?;
    let reason = machine.run();
    tracing::info!(?reason, "machine stopped");
    Ok(())
}
