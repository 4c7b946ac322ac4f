//! DocuDB CLI
//!
//! Command-line tools for DocuDB databases.
//!
//! # Commands
//!
//! - `meta` - Print the database metadata document
//! - `insert` / `find` / `update` - Work with documents
//! - `index` - Create, drop, rebuild or optimize an index
//! - `compact` - Rewrite a collection's data log
//! - `export` / `import` - Move collections through JSON files

mod commands;

use clap::{Parser, Subcommand};
use commands::document::FindFlags;
use commands::CliResult;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocuDB command-line database tools.
#[derive(Parser)]
#[command(name = "docudb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
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
    /// Print the database metadata document as JSON
    Meta,

    /// Insert a JSON document and print its id
    Insert {
        /// Collection name (created if missing)
        collection: String,
        /// Document as JSON
        document: String,
    },

    /// Run a query and print matching documents
    Find {
        /// Collection name
        collection: String,
        /// Query as JSON
        query: String,
        /// Hints as JSON ($orderby, $skip, $max, $fields)
        #[arg(long)]
        hints: Option<String>,
        /// Print only the number of matches
        #[arg(long)]
        count: bool,
        /// Print at most one document
        #[arg(long)]
        one: bool,
        /// Print the execution log to stderr
        #[arg(long)]
        log: bool,
    },

    /// Run an update query and print the number of documents processed
    Update {
        /// Collection name
        collection: String,
        /// Query with update operators as JSON
        query: String,
    },

    /// Manage an index
    Index {
        /// Collection name
        collection: String,
        /// Indexed field path
        field: String,
        /// Index kind (number, string, istring, token)
        #[arg(short, long)]
        kind: String,
        /// Action (create, drop, drop-all, rebuild, optimize)
        #[arg(short, long, default_value = "create")]
        action: String,
    },

    /// Rewrite a collection's data log keeping only live documents
    Compact {
        /// Collection name
        collection: String,
    },

    /// Export collections to <dir>/<name>.json
    Export {
        /// Target directory
        dir: PathBuf,
        /// Collections to export (default: all)
        #[arg(short, long)]
        collection: Vec<String>,
    },

    /// Import collections from <dir>/<name>.json
    Import {
        /// Source directory
        dir: PathBuf,
        /// Collections to import (default: every file)
        #[arg(short, long)]
        collection: Vec<String>,
        /// Recreate collections instead of merging by _id
        #[arg(long)]
        replace: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("DocuDB CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("DocuDB Core v{}", docudb_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("database path required (--path)")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    dispatch(&path, cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}

fn dispatch(path: &std::path::Path, command: Commands, out: &mut impl Write) -> CliResult<()> {
    match command {
        Commands::Meta => commands::meta::run(path, out),
        Commands::Insert {
            collection,
            document,
        } => commands::document::insert(path, &collection, &document, out),
        Commands::Find {
            collection,
            query,
            hints,
            count,
            one,
            log,
        } => commands::document::find(
            path,
            &collection,
            &query,
            hints.as_deref(),
            FindFlags { count, one, log },
            out,
        ),
        Commands::Update { collection, query } => {
            commands::document::update(path, &collection, &query, out)
        }
        Commands::Index {
            collection,
            field,
            kind,
            action,
        } => commands::index::run(path, &collection, &field, &kind, &action, out),
        Commands::Compact { collection } => commands::document::compact(path, &collection, out),
        Commands::Export { dir, collection } => {
            commands::transfer::export(path, &dir, &collection, out)
        }
        Commands::Import {
            dir,
            collection,
            replace,
        } => commands::transfer::import(path, &dir, &collection, replace, out),
        Commands::Version => Ok(()),
    }
}
