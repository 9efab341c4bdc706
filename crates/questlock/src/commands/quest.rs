//! `questlock quest add|list`

use anyhow::Result;
use questlock_core::UserId;
use serde::Serialize;

use super::{print_json, App};

pub async fn add(app: &App, user: UserId, title: &str) -> Result<()> {
    let quest = app.quests().create_quest(user, title).await?;
    print_json(&quest)
}

#[derive(Debug, Serialize)]
struct QuestList<T> {
    user_id: UserId,
    count: usize,
    quests: Vec<T>,
}

pub async fn list(app: &App, user: UserId) -> Result<()> {
    let quests = app.quests().list_quests(user).await?;
    print_json(&QuestList {
        user_id: user,
        count: quests.len(),
        quests,
    })
}
