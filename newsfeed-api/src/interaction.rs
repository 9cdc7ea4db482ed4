use crate::{NewsId, Table, Time, UserId, Uuid};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum InteractionKind {
    Like,
    Bookmark,
}

impl InteractionKind {
    pub fn table(&self) -> Table {
        match self {
            InteractionKind::Like => Table::Likes,
            InteractionKind::Bookmark => Table::Bookmarks,
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionKind::Like => f.write_str("like"),
            InteractionKind::Bookmark => f.write_str("bookmark"),
        }
    }
}

/// Row of the `likes` or `bookmarks` table
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    pub news_id: NewsId,
    pub user_id: UserId,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewInteraction {
    pub news_id: NewsId,
    pub user_id: UserId,
}

/// What a remote toggle actually did
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Toggled {
    Added,
    Removed,
}

impl Toggled {
    pub fn is_set(&self) -> bool {
        matches!(self, Toggled::Added)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Share {
    pub id: Uuid,
    pub news_id: NewsId,
    pub user_id: Option<UserId>,
    pub platform: Option<String>,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewShare {
    pub news_id: NewsId,
    pub user_id: Option<UserId>,
    pub platform: Option<String>,
}
