//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Issuedex - searchable, permission-scoped projection of issue records
#[derive(Parser, Debug)]
#[command(name = "issuedex", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Record store path (default: ~/.issuedex/data/records.db)
    #[arg(long, global = true)]
    pub records_db: Option<PathBuf>,

    /// Document store path (default: ~/.issuedex/data/index.db)
    #[arg(long, global = true)]
    pub index_db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the record and document stores
    Init {
        /// Recreate existing databases
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Canonical issue records
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Permission grants
    Grant {
        #[command(subcommand)]
        command: GrantCommands,
    },

    /// Search indexed issues visible to an identity
    Search(SearchArgs),

    /// Synchronize the index with the record store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Clear the issue index and rebuild it from the record store
    Reindex,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Issue Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Record a new issue
    Add(IssueAddArgs),

    /// Transition an issue's status
    Status {
        /// Issue key
        key: String,

        /// New status (OPEN, CONFIRMED, REOPENED, RESOLVED, CLOSED)
        status: String,

        /// Resolution (e.g. FIXED, FALSE-POSITIVE)
        #[arg(short, long)]
        resolution: Option<String>,
    },

    /// Show an issue record and its indexed document
    Show {
        /// Issue key
        key: String,
    },
}

#[derive(Args, Debug)]
pub struct IssueAddArgs {
    /// Issue key
    pub key: String,

    /// Project key (must exist, see `project add`)
    #[arg(short, long)]
    pub project: String,

    /// Component key (defaults to the project)
    #[arg(short, long)]
    pub component: Option<String>,

    /// Rule as repository:rule
    #[arg(short, long, default_value = "manual:issue")]
    pub rule: String,

    /// Status
    #[arg(short, long, default_value = "OPEN")]
    pub status: String,

    /// Severity (INFO, MINOR, MAJOR, CRITICAL, BLOCKER)
    #[arg(long, default_value = "MAJOR")]
    pub severity: String,

    /// Message
    #[arg(short, long)]
    pub message: Option<String>,

    /// Line number
    #[arg(short, long)]
    pub line: Option<u32>,

    /// Assignee login
    #[arg(long)]
    pub assignee: Option<String>,

    /// Author login
    #[arg(long)]
    pub author: Option<String>,

    /// Reporter login
    #[arg(long)]
    pub reporter: Option<String>,

    /// Effort to fix
    #[arg(long)]
    pub effort: Option<f64>,

    /// Action plan key
    #[arg(long)]
    pub action_plan: Option<String>,

    /// Attribute as key=value (repeatable)
    #[arg(long = "attr")]
    pub attributes: Vec<String>,
}

// ============================================================================
// Project / Grant Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register a project in the record store and the index
    Add {
        /// Project key
        key: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GrantCommands {
    /// Grant read access on a project to one user or one group
    Add {
        /// Project key
        project: String,

        /// User login
        #[arg(short, long)]
        user: Option<String>,

        /// Group name
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Load grants from a JSON array of {"project", "user"|"group"} objects
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

// ============================================================================
// Search / Sync Commands
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Acting user login (omit for anonymous)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Group the user belongs to (repeatable, comma-separated accepted)
    #[arg(short, long = "group", value_delimiter = ',')]
    pub groups: Vec<String>,

    /// Only issues with this status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Only issues with this severity
    #[arg(long)]
    pub severity: Option<String>,

    /// Only issues of this project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Only issues assigned to this login
    #[arg(long)]
    pub assignee: Option<String>,

    /// Maximum results
    #[arg(short, long, default_value = "100")]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Run one sync now (bootstraps an empty index)
    Run {
        /// Reprocess every record regardless of the watermark
        #[arg(long)]
        bootstrap: bool,
    },

    /// Reprocess every record
    Resync,

    /// Show sync status
    Status,

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between runs (default from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}
