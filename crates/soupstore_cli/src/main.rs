//! SoupStore CLI
//!
//! Command-line tools for SoupStore files.
//!
//! # Commands
//!
//! - `inspect` - List soups with their index specs and entry counts
//! - `register` - Register the soups of a schema file
//! - `translate` - Translate smart SQL against the store's soups
//! - `query` - Run one page of a JSON query spec

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SoupStore command-line tools.
#[derive(Parser)]
#[command(name = "soupstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
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
    /// List soups with their index specs and entry counts
    Inspect {
        /// Show index specs of each soup
        #[arg(short, long)]
        indexes: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Register the soups of a schema file
    Register {
        /// Schema file listing soups and their indexes
        schema: PathBuf,
    },

    /// Translate smart SQL into engine SQL
    Translate {
        /// Smart SQL, e.g. "SELECT {people:name} FROM {people}"
        sql: String,
    },

    /// Run one page of a query spec
    Query {
        /// Query spec as JSON
        spec: String,

        /// Soup for structured specs that do not name one
        #[arg(short, long)]
        soup: Option<String>,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: usize,

        /// Print only the number of matching rows
        #[arg(short, long)]
        count: bool,

        /// Print the query plan after the rows
        #[arg(short, long)]
        explain: bool,
    },

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
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {
        Commands::Inspect { indexes, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, indexes, &format)?;
        }
        Commands::Register { schema } => {
            let path = cli.path.ok_or("Store path required for register")?;
            commands::register::run(&path, &schema)?;
        }
        Commands::Translate { sql } => {
            let path = cli.path.ok_or("Store path required for translate")?;
            commands::translate::run(&path, &sql)?;
        }
        Commands::Query {
            spec,
            soup,
            page,
            count,
            explain,
        } => {
            let path = cli.path.ok_or("Store path required for query")?;
            let options = commands::query::QueryOptions {
                soup,
                page,
                count,
                explain,
            };
            commands::query::run(&path, &spec, &options)?;
        }
        Commands::Version => {
            println!("SoupStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SoupStore Core v{}", soupstore_core::VERSION);
        }
    }

    Ok(())
}
