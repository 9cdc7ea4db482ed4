use async_trait::async_trait;

use crate::{Filter, Record, Uuid};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Table {
    News,
    Comments,
    Likes,
    Bookmarks,
    Shares,
    Profiles,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::News => "news",
            Table::Comments => "comments",
            Table::Likes => "likes",
            Table::Bookmarks => "bookmarks",
            Table::Shares => "shares",
            Table::Profiles => "profiles",
        }
    }
}

/// Table access offered by the hosted backend
///
/// Records cross this boundary untyped; callers narrow them with
/// [`crate::decode`] as soon as they are received.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn fetch_records(&self, table: Table, filter: &Filter) -> anyhow::Result<Vec<Record>>;
    async fn fetch_record_by_id(&self, table: Table, id: Uuid) -> anyhow::Result<Option<Record>>;
    async fn insert_record(&self, table: Table, payload: Record) -> anyhow::Result<Record>;
    async fn update_record(&self, table: Table, id: Uuid, patch: Record) -> anyhow::Result<()>;
    async fn delete_record(&self, table: Table, id: Uuid) -> anyhow::Result<()>;
    async fn find_record(&self, table: Table, criteria: &Filter) -> anyhow::Result<Option<Record>>;
}
