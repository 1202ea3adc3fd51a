use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Display commands without doing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a disc from a slot into a drive
    Load {
        /// Drive number
        #[arg(short, long)]
        drive: i64,

        /// Slot number
        #[arg(short, long, allow_negative_numbers = true)]
        slot: i64,
    },

    /// Unload the disc in a drive into a slot
    Unload {
        /// Drive number
        #[arg(short, long)]
        drive: i64,

        /// Slot number
        #[arg(short, long, allow_negative_numbers = true)]
        slot: i64,
    },

    /// Rip the disc already loaded in a drive
    Rip {
        /// Drive number
        #[arg(short, long)]
        drive: i64,

        /// Use a generated title instead of the disc's own
        #[arg(long)]
        generic_name: bool,
    },

    /// Show extraction-tool info for the disc in a drive
    Info {
        /// Drive number
        #[arg(short, long)]
        drive: i64,
    },

    /// Show the title of the disc mounted from a drive
    Title {
        /// Drive number
        #[arg(short, long)]
        drive: i64,
    },

    /// Show the changer inventory
    Status,

    /// Load, rip and return a single input slot
    RipSlot {
        /// Input slot number
        #[arg(short, long, allow_negative_numbers = true)]
        slot: i64,
    },

    /// Rip every input slot using all drives
    RipAll {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and return every slot of a cassette
    TestCassette {
        /// Cassette number (zero based)
        #[arg(short = 'k', long)]
        cassette: u32,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "ripit.toml")]
        output: PathBuf,
    },
}
