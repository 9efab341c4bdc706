//! CLI command definitions using `clap`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use questlock_core::sequence::QUEST_RESOURCE;

#[derive(Debug, Parser)]
#[command(name = "questlock", version, about = "Quest sequencing over user-level locks")]
pub struct Cli {
    /// Extra config file, applied after the global and project files
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the data and lock schemas
    Init,

    /// Create and list quests
    #[command(subcommand)]
    Quest(QuestCommand),

    /// Per-user sequence counters
    #[command(subcommand)]
    Seq(SeqCommand),

    /// Allocate from one counter with N concurrent callers
    Contend(ContendArgs),

    /// Inspect the sqlite lock table
    #[command(subcommand)]
    Locks(LocksCommand),
}

#[derive(Debug, Subcommand)]
pub enum QuestCommand {
    /// Create a quest with the user's next ordinal
    Add {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        title: String,
    },
    /// List a user's quests in ordinal order
    List {
        #[arg(long)]
        user: i64,
    },
}

#[derive(Debug, Args)]
pub struct CounterArgs {
    #[arg(long)]
    pub user: i64,
    #[arg(long, default_value = QUEST_RESOURCE)]
    pub resource: String,
}

#[derive(Debug, Subcommand)]
pub enum SeqCommand {
    /// Advance the counter and print the new value
    Next(CounterArgs),
    /// Print the last value handed out
    Show(CounterArgs),
}

#[derive(Debug, Args)]
pub struct ContendArgs {
    #[command(flatten)]
    pub counter: CounterArgs,

    /// Number of concurrent callers
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub callers: u32,

    /// Per-caller lock wait in seconds (defaults to lock.default_timeout_secs)
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub enum LocksCommand {
    /// Locks currently recorded in the lock table
    List,
    /// Delete locks left behind by crashed processes
    Reap {
        #[arg(long)]
        older_than_secs: u64,
    },
}
