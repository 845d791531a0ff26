use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tp", about = concat!("taskpad v", env!("CARGO_PKG_VERSION"), " - a small persistent todo list"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different data directory
    #[arg(short = 'C', long = "data-dir", global = true)]
    pub data_dir: Option<String>,

    /// Log debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a task to the top of the list
    Add(AddArgs),
    /// List tasks
    List(ListArgs),
    /// Show task details
    Show(IdArg),
    /// Flip a task between active and done
    Toggle(IdArg),
    /// Change task fields
    Edit(EditArgs),
    /// Delete a task
    Rm(IdArg),
    /// Move a task within the stored order (0-indexed positions)
    Mv(MvArgs),
    /// Subtask commands
    Sub(SubCmd),
    /// Mark tasks done
    Done(IdsArg),
    /// Mark tasks active again
    Undone(IdsArg),
    /// Delete every completed task
    ClearDone,
    /// Show task counts and storage usage
    Stats,
    /// Write a JSON backup of all tasks
    Export(ExportArgs),
    /// Replace all tasks with those from a JSON backup
    Import(ImportArgs),
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
}

// ---------------------------------------------------------------------------
// Shared args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct IdArg {
    /// Task ID (or unique prefix)
    pub id: String,
}

#[derive(Args)]
pub struct IdsArg {
    /// Task IDs (or unique prefixes)
    #[arg(required = true)]
    pub ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Task args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    /// Short line shown under the title
    #[arg(long)]
    pub subtitle: Option<String>,
    /// Longer description
    #[arg(short = 'd', long)]
    pub description: Option<String>,
    /// Free-form notes
    #[arg(long)]
    pub notes: Option<String>,
    /// low, medium or high (default from taskpad.toml)
    #[arg(short = 'p', long)]
    pub priority: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by status (all, active, done)
    #[arg(long)]
    pub filter: Option<String>,
    /// Case-insensitive text search
    #[arg(long)]
    pub search: Option<String>,
    /// Sort by (priority, updated, created)
    #[arg(long)]
    pub sort: Option<String>,
    /// Remember the given filter, search and sort for later listings
    #[arg(long)]
    pub save: bool,
    /// Show tasks in stored order with their positions, ignoring filters
    #[arg(long, conflicts_with_all = ["filter", "search", "sort", "save"])]
    pub stored: bool,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID (or unique prefix)
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New subtitle (empty string clears it)
    #[arg(long)]
    pub subtitle: Option<String>,
    /// New description (empty string clears it)
    #[arg(short = 'd', long)]
    pub description: Option<String>,
    /// New notes (empty string clears them)
    #[arg(long)]
    pub notes: Option<String>,
    /// New priority
    #[arg(short = 'p', long)]
    pub priority: Option<String>,
}

#[derive(Args)]
pub struct MvArgs {
    /// Current position
    pub from: usize,
    /// Target position
    pub to: usize,
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SubCmd {
    #[command(subcommand)]
    pub action: SubAction,
}

#[derive(Subcommand)]
pub enum SubAction {
    /// Append a subtask
    Add(SubAddArgs),
    /// Flip a subtask's completion
    Toggle(SubIdArgs),
    /// Rename a subtask
    Edit(SubEditArgs),
    /// Delete a subtask
    Rm(SubIdArgs),
}

#[derive(Args)]
pub struct SubAddArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask title
    pub title: String,
}

#[derive(Args)]
pub struct SubIdArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask ID (or unique prefix)
    pub sub_id: String,
}

#[derive(Args)]
pub struct SubEditArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask ID (or unique prefix)
    pub sub_id: String,
    /// New title
    pub title: String,
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ExportArgs {
    /// Write to this file instead of stdout
    pub file: Option<String>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Backup file produced by `tp export`
    pub file: String,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}
