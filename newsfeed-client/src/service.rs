use anyhow::Context;
use async_trait::async_trait;

use crate::api::{
    self, CategoryFilter, Comment, CommentId, CommentPatch, DataService, Filter, InteractionKind,
    InteractionRecord, NewComment, NewInteraction, NewShare, News, NewsId, OrderType, Profile,
    ProfilePatch, Share, Table, Time, Toggled, UserId,
};

/// Columns fetched for comments, with the author profile embedded
pub const COMMENT_SELECT: &str = "*,profile:profiles(username,avatar_url)";

/// Typed operations over the untyped table access of a [`DataService`]
#[async_trait]
pub trait DataServiceExt {
    async fn fetch_news(&self, category: CategoryFilter) -> anyhow::Result<Vec<News>>;
    async fn fetch_news_by_id(&self, id: NewsId) -> anyhow::Result<Option<News>>;
    async fn fetch_news_in(&self, ids: &[NewsId]) -> anyhow::Result<Vec<News>>;

    async fn fetch_comments(&self, news: NewsId) -> anyhow::Result<Vec<Comment>>;
    async fn fetch_user_comments(&self, user: UserId) -> anyhow::Result<Vec<Comment>>;
    async fn add_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;
    async fn update_comment(&self, id: CommentId, content: String, at: Time)
        -> anyhow::Result<()>;
    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()>;

    async fn interaction_exists(
        &self,
        kind: InteractionKind,
        news: NewsId,
        user: UserId,
    ) -> anyhow::Result<bool>;

    /// Deletes the interaction if it exists, creates it otherwise
    async fn toggle_interaction(
        &self,
        kind: InteractionKind,
        news: NewsId,
        user: UserId,
    ) -> anyhow::Result<Toggled>;

    async fn interacted_news(&self, kind: InteractionKind, user: UserId)
        -> anyhow::Result<Vec<NewsId>>;

    async fn record_share(&self, share: NewShare) -> anyhow::Result<Share>;

    async fn fetch_profile(&self, user: UserId) -> anyhow::Result<Option<Profile>>;
    async fn update_profile(&self, user: UserId, patch: ProfilePatch) -> anyhow::Result<()>;
}

fn interaction_filter(news: NewsId, user: UserId) -> Filter {
    Filter::all().eq("news_id", news).eq("user_id", user)
}

fn decode_all<T>(table: Table, records: Vec<api::Record>) -> anyhow::Result<Vec<T>>
where
    T: for<'de> serde::Deserialize<'de>,
{
    records.into_iter().map(|r| api::decode(table, r)).collect()
}

#[async_trait]
impl<D: DataService + ?Sized> DataServiceExt for D {
    async fn fetch_news(&self, category: CategoryFilter) -> anyhow::Result<Vec<News>> {
        let mut filter = Filter::all().order_by("news_date", OrderType::Desc);
        if let CategoryFilter::Only(c) = category {
            filter = filter.contains("categories", [c.name()]);
        }
        let records = self
            .fetch_records(Table::News, &filter)
            .await
            .with_context(|| format!("fetching news for {category:?}"))?;
        decode_all(Table::News, records)
    }

    async fn fetch_news_by_id(&self, id: NewsId) -> anyhow::Result<Option<News>> {
        self.fetch_record_by_id(Table::News, id.0)
            .await
            .with_context(|| format!("fetching news {id}"))?
            .map(|r| api::decode(Table::News, r))
            .transpose()
    }

    async fn fetch_news_in(&self, ids: &[NewsId]) -> anyhow::Result<Vec<News>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::all()
            .is_in("id", ids)
            .order_by("news_date", OrderType::Desc);
        let records = self
            .fetch_records(Table::News, &filter)
            .await
            .with_context(|| format!("fetching {} news items", ids.len()))?;
        decode_all(Table::News, records)
    }

    async fn fetch_comments(&self, news: NewsId) -> anyhow::Result<Vec<Comment>> {
        let filter = Filter::all()
            .select(COMMENT_SELECT)
            .eq("news_id", news)
            .order_by("created_at", OrderType::Desc);
        let records = self
            .fetch_records(Table::Comments, &filter)
            .await
            .with_context(|| format!("fetching comments of news {news}"))?;
        decode_all(Table::Comments, records)
    }

    async fn fetch_user_comments(&self, user: UserId) -> anyhow::Result<Vec<Comment>> {
        let filter = Filter::all()
            .eq("user_id", user)
            .order_by("created_at", OrderType::Desc);
        let records = self
            .fetch_records(Table::Comments, &filter)
            .await
            .with_context(|| format!("fetching comments of user {user}"))?;
        decode_all(Table::Comments, records)
    }

    async fn add_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        comment.validate()?;
        let payload = api::encode(Table::Comments, &comment)?;
        let record = self
            .insert_record(Table::Comments, payload)
            .await
            .with_context(|| format!("adding comment to news {}", comment.news_id))?;
        api::decode(Table::Comments, record)
    }

    async fn update_comment(
        &self,
        id: CommentId,
        content: String,
        at: Time,
    ) -> anyhow::Result<()> {
        api::validate_string(&content)?;
        let patch = CommentPatch {
            content,
            updated_at: at,
        };
        self.update_record(Table::Comments, id.0, api::encode(Table::Comments, &patch)?)
            .await
            .with_context(|| format!("updating comment {id}"))
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()> {
        self.delete_record(Table::Comments, id.0)
            .await
            .with_context(|| format!("deleting comment {id}"))
    }

    async fn interaction_exists(
        &self,
        kind: InteractionKind,
        news: NewsId,
        user: UserId,
    ) -> anyhow::Result<bool> {
        let found = self
            .find_record(kind.table(), &interaction_filter(news, user))
            .await
            .with_context(|| format!("checking {kind} of news {news}"))?;
        Ok(found.is_some())
    }

    async fn toggle_interaction(
        &self,
        kind: InteractionKind,
        news: NewsId,
        user: UserId,
    ) -> anyhow::Result<Toggled> {
        let table = kind.table();
        let existing = self
            .find_record(table, &interaction_filter(news, user))
            .await
            .with_context(|| format!("looking up {kind} of news {news}"))?;
        match existing {
            Some(record) => {
                let record: InteractionRecord = api::decode(table, record)?;
                self.delete_record(table, record.id)
                    .await
                    .with_context(|| format!("removing {kind} of news {news}"))?;
                Ok(Toggled::Removed)
            }
            None => {
                let payload = api::encode(
                    table,
                    &NewInteraction {
                        news_id: news,
                        user_id: user,
                    },
                )?;
                match self.insert_record(table, payload).await {
                    Ok(_) => Ok(Toggled::Added),
                    // a retried or concurrent insert already landed
                    Err(e) if matches!(e.downcast_ref(), Some(api::Error::Conflict(_))) => {
                        tracing::debug!(%kind, %news, err = ?e, "interaction already present");
                        Ok(Toggled::Added)
                    }
                    Err(e) => Err(e.context(format!("adding {kind} to news {news}"))),
                }
            }
        }
    }

    async fn interacted_news(
        &self,
        kind: InteractionKind,
        user: UserId,
    ) -> anyhow::Result<Vec<NewsId>> {
        let table = kind.table();
        let records = self
            .fetch_records(table, &Filter::all().eq("user_id", user))
            .await
            .with_context(|| format!("fetching {kind}s of user {user}"))?;
        Ok(decode_all::<InteractionRecord>(table, records)?
            .into_iter()
            .map(|r| r.news_id)
            .collect())
    }

    async fn record_share(&self, share: NewShare) -> anyhow::Result<Share> {
        if let Some(p) = &share.platform {
            api::validate_string(p)?;
        }
        let payload = api::encode(Table::Shares, &share)?;
        let record = self
            .insert_record(Table::Shares, payload)
            .await
            .with_context(|| format!("recording share of news {}", share.news_id))?;
        api::decode(Table::Shares, record)
    }

    async fn fetch_profile(&self, user: UserId) -> anyhow::Result<Option<Profile>> {
        self.fetch_record_by_id(Table::Profiles, user.0)
            .await
            .with_context(|| format!("fetching profile of user {user}"))?
            .map(|r| api::decode(Table::Profiles, r))
            .transpose()
    }

    async fn update_profile(&self, user: UserId, patch: ProfilePatch) -> anyhow::Result<()> {
        patch.validate()?;
        self.update_record(Table::Profiles, user.0, api::encode(Table::Profiles, &patch)?)
            .await
            .with_context(|| format!("updating profile of user {user}"))
    }
}
