use crate::db::{DatabaseConfig, DEFAULT_DATABASE_URL};
use crate::utils::output::OutputKind;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "crtsh-rs")]
#[command(version = "1.0.0")]
#[command(about = "Query the crt.sh certificate transparency database")]
#[command(long_about = None)]
pub struct Cli {
    /// Postgres URL of a database with the crt.sh schema
    #[arg(long, env = "CRTSH_DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "CRTSH_MAX_CONNECTIONS", default_value_t = 4, global = true)]
    pub max_connections: u32,

    /// Seconds to wait for a database connection
    #[arg(long, env = "CRTSH_CONNECT_TIMEOUT", default_value_t = 30, global = true)]
    pub connect_timeout: u64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputKind::Table, global = true)]
    pub format: OutputKind,

    /// Enable verbose logging (repeat for more verbosity: -v INFO, -vv DEBUG, -vvv TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database_url.clone(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available tables
    Tables,
    /// Show the columns of a table and which ones accept filters
    Columns {
        /// Table name, with or without the crtsh_ prefix
        #[arg(value_hint = clap::ValueHint::Other)]
        table: String,
    },
    /// Query a table
    Query {
        /// Table name, with or without the crtsh_ prefix
        #[arg(value_hint = clap::ValueHint::Other)]
        table: String,
        /// Filter as <column><op><value>, op one of = <> != < <= > >= (repeatable)
        #[arg(long = "where", short = 'w', value_name = "EXPR")]
        filters: Vec<String>,
        /// Maximum number of rows to return
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        limit: Option<i64>,
        /// Columns to display (comma-separated). Use +column to append to defaults.
        #[arg(long)]
        columns: Option<String>,
    },
    /// Decode a local DER or PEM certificate
    Decode {
        /// Certificate file
        file: PathBuf,
    },
    /// Generate shell completion scripts
    Completion {
        #[command(subcommand)]
        command: CompletionCommands,
    },
    /// Internal completion helpers (hidden)
    #[command(hide = true)]
    CompletionHelper {
        #[command(subcommand)]
        command: CompletionHelperCommands,
    },
}

#[derive(Subcommand)]
pub enum CompletionCommands {
    /// Generate bash completion script
    Bash,
    /// Generate zsh completion script
    Zsh,
    /// Generate fish completion script
    Fish,
    /// Generate PowerShell completion script
    PowerShell,
}

impl CompletionCommands {
    pub fn shell(&self) -> Shell {
        match self {
            CompletionCommands::Bash => Shell::Bash,
            CompletionCommands::Zsh => Shell::Zsh,
            CompletionCommands::Fish => Shell::Fish,
            CompletionCommands::PowerShell => Shell::PowerShell,
        }
    }
}

#[derive(Subcommand)]
pub enum CompletionHelperCommands {
    /// List table names for completion
    Tables,
    /// List the columns of a table for completion
    Columns {
        /// Table name
        table: String,
    },
}
