//! hashdb CLI
//!
//! Command-line tools for hashdb files.
//!
//! # Commands
//!
//! - `inspect` - Display header and directory statistics
//! - `get` - Print the value stored under a key
//! - `put` - Store a key/value pair
//! - `delete` - Remove a key
//! - `keys` - List every key

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hashdb command-line database tools.
#[derive(Parser)]
#[command(name = "hashdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display header and directory statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the value stored under a key
    Get {
        /// Key to look up
        key: String,
    },

    /// Store a key/value pair, creating the database if needed
    Put {
        /// Key to store
        key: String,

        /// Value to store
        value: String,

        /// Overwrite an existing value instead of failing
        #[arg(short, long)]
        replace: bool,

        /// Defer durability barriers
        #[arg(long)]
        fast_write: bool,

        /// Block size used if the database is created
        #[arg(long, default_value = "4096")]
        block_size: u32,
    },

    /// Remove a key
    Delete {
        /// Key to remove
        key: String,
    },

    /// List every key
    Keys,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Get { key } => {
            let path = cli.path.ok_or("Database path required for get")?;
            commands::get::run(&path, key.as_bytes())?;
        }
        Commands::Put {
            key,
            value,
            replace,
            fast_write,
            block_size,
        } => {
            let path = cli.path.ok_or("Database path required for put")?;
            let options = commands::put::PutOptions {
                replace,
                fast_write,
                block_size,
            };
            commands::put::run(&path, key.as_bytes(), value.as_bytes(), &options)?;
        }
        Commands::Delete { key } => {
            let path = cli.path.ok_or("Database path required for delete")?;
            commands::delete::run(&path, key.as_bytes())?;
        }
        Commands::Keys => {
            let path = cli.path.ok_or("Database path required for keys")?;
            commands::keys::run(&path)?;
        }
        Commands::Version => {
            println!("hashdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("hashdb Core v{}", hashdb_core::VERSION);
            println!("File format v{}", hashdb_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
