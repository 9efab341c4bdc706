//! Command implementations
//!
//! Every command prints a single JSON document on stdout.

use std::sync::Arc;

use anyhow::Result;
use questlock_core::{
    db, load_config, AnyLockChannel, Config, QuestService, SequenceAllocator, SequenceKey, UserId,
    UserLockManager,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::cli::{Cli, Command, CounterArgs, LocksCommand, QuestCommand, SeqCommand};

mod contend;
mod init;
mod locks;
mod quest;
mod seq;

/// Everything a command needs: configuration, the main data pool and the
/// lock manager over its own dedicated channel.
pub struct App {
    pub config: Config,
    pub pool: SqlitePool,
    pub locks: Arc<UserLockManager<AnyLockChannel>>,
}

impl App {
    pub async fn open(cli: &Cli) -> Result<Self> {
        let config = load_config(cli.config.as_deref())?;
        let default_timeout = config.default_lock_timeout()?;
        let pool = db::open(&config.database).await?;
        let channel = AnyLockChannel::connect(&config.lock).await?;
        tracing::debug!(backend = %config.lock.backend, "lock channel ready");

        Ok(Self {
            config,
            pool,
            locks: Arc::new(UserLockManager::new(channel, default_timeout)),
        })
    }

    pub fn quests(&self) -> QuestService<AnyLockChannel> {
        QuestService::new(Arc::clone(&self.locks), self.pool.clone())
    }

    pub fn sequences(&self) -> SequenceAllocator<AnyLockChannel> {
        SequenceAllocator::new(Arc::clone(&self.locks), self.pool.clone())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn counter_key(args: &CounterArgs) -> Result<SequenceKey> {
    Ok(SequenceKey::new(UserId::new(args.user)?, &args.resource)?)
}

pub async fn run(cli: Cli) -> Result<()> {
    let app = App::open(&cli).await?;

    match cli.command {
        Command::Init => init::run(&app).await,
        Command::Quest(QuestCommand::Add { user, title }) => {
            quest::add(&app, UserId::new(user)?, &title).await
        }
        Command::Quest(QuestCommand::List { user }) => {
            quest::list(&app, UserId::new(user)?).await
        }
        Command::Seq(SeqCommand::Next(args)) => seq::next(&app, &counter_key(&args)?).await,
        Command::Seq(SeqCommand::Show(args)) => seq::show(&app, &counter_key(&args)?).await,
        Command::Contend(args) => {
            contend::run(&app, counter_key(&args.counter)?, args.callers, args.timeout).await
        }
        Command::Locks(LocksCommand::List) => locks::list(&app).await,
        Command::Locks(LocksCommand::Reap { older_than_secs }) => {
            locks::reap(&app, older_than_secs).await
        }
    }
}
