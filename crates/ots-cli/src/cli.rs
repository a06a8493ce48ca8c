use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ots_tree::Role;

#[derive(Parser)]
#[command(
    name = "ots",
    about = "Object tree store: inspect and maintain a content-addressed record store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with a `[driver]` table
    #[arg(long, global = true, conflicts_with = "store")]
    pub config: Option<PathBuf>,

    /// Filesystem store directory (default options)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the store layout if missing
    Init,
    /// Print the published root hash
    Root,
    /// List the entries of an index node
    List(ListArgs),
    /// Print one stored record
    Show(EntryArgs),
    /// Remove an entry (its blob is reclaimed by the next compaction)
    Delete(EntryArgs),
    /// Move an entry to a new ID
    Rename(RenameArgs),
    /// Set the alias of an entry
    Alias(AliasArgs),
    /// Flip buckets and reclaim unreachable blobs
    Compact,
    /// Copy the reachable tree into another filesystem store
    Migrate(MigrateArgs),
    /// Re-hash and decode every reachable blob
    Fsck,
}

#[derive(Args)]
pub struct ListArgs {
    /// servers, issuers or threads
    pub role: Role,
    /// Only IDs starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct EntryArgs {
    pub role: Role,
    pub id: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub role: Role,
    pub old: String,
    pub new: String,
}

#[derive(Args)]
pub struct AliasArgs {
    pub role: Role,
    pub id: String,
    pub alias: String,
}

#[derive(Args)]
pub struct MigrateArgs {
    /// Target store directory
    #[arg(long)]
    pub to: PathBuf,
}
