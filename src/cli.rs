//! Command-line surface for the import lifecycle and point lookups.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cnpj-registry",
    about = "Consolidates the public CNPJ registry into PostgreSQL"
)]
pub struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Schema holding the company and metadata tables.
    #[arg(long, default_value = "public")]
    pub schema: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the company and metadata tables.
    Create,
    /// Drop the tables (safe when they do not exist).
    Drop,
    /// Consolidate a staged import run and bulk-load it.
    Load {
        /// Staging directory written by the source readers.
        #[arg(long, default_value = "data/staging")]
        staging_dir: PathBuf,
        /// Documents per bulk-insert statement.
        #[arg(long, default_value_t = registry_transform::consolidate::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Create secondary indexes on JSON paths (comma-separated names,
    /// `field` or `field.nested`).
    Index {
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,
    },
    /// Print the consolidated document for one CNPJ.
    Get { cnpj: String },
}
