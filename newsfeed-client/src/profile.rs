use std::collections::HashMap;

use chrono::Utc;

use crate::{
    api::{Comment, InteractionKind, News, Profile, ProfilePatch, User},
    initials, Backend, DataServiceExt, Error,
};

/// A comment of the viewer's, along with the article it was written on
#[derive(Clone, Debug, PartialEq)]
pub struct UserComment {
    pub comment: Comment,
    pub news: Option<News>,
}

/// The signed-in viewer's own page
pub struct ProfileView {
    backend: Backend,
    pub user: User,
    pub profile: Option<Profile>,
    pub liked: Vec<News>,
    pub bookmarked: Vec<News>,

    /// Newest first
    pub comments: Vec<UserComment>,
}

impl ProfileView {
    pub async fn load(backend: Backend) -> Result<ProfileView, Error> {
        let user = backend.auth.current_user().ok_or(Error::Unauthenticated)?;
        let data = &backend.data;
        let (profile, liked, bookmarked, comments) = futures::try_join!(
            data.fetch_profile(user.id),
            data.interacted_news(InteractionKind::Like, user.id),
            data.interacted_news(InteractionKind::Bookmark, user.id),
            data.fetch_user_comments(user.id),
        )
        .map_err(Error::FetchFailed)?;

        let mut commented = comments.iter().map(|c| c.news_id).collect::<Vec<_>>();
        commented.sort_unstable();
        commented.dedup();
        let (liked, bookmarked, commented) = futures::try_join!(
            data.fetch_news_in(&liked),
            data.fetch_news_in(&bookmarked),
            data.fetch_news_in(&commented),
        )
        .map_err(Error::FetchFailed)?;

        let commented = commented
            .into_iter()
            .map(|n| (n.id, n))
            .collect::<HashMap<_, _>>();
        let comments = comments
            .into_iter()
            .map(|comment| UserComment {
                news: commented.get(&comment.news_id).cloned(),
                comment,
            })
            .collect();
        tracing::debug!(user = %user.id, "loaded profile");

        Ok(ProfileView {
            backend,
            user,
            profile,
            liked,
            bookmarked,
            comments,
        })
    }

    /// Username if set, email otherwise
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.username.as_deref())
            .filter(|u| !u.is_empty())
            .unwrap_or(self.user.email.as_str())
    }

    pub fn initials(&self) -> String {
        initials(self.display_name())
    }

    pub async fn save(&mut self, username: &str, full_name: &str) -> Result<(), Error> {
        let patch = ProfilePatch {
            username: String::from(username),
            full_name: String::from(full_name),
            updated_at: Utc::now(),
        };
        patch.validate()?;
        self.backend
            .data
            .update_profile(self.user.id, patch.clone())
            .await
            .map_err(Error::RemoteMutationFailed)?;
        if let Some(p) = &mut self.profile {
            p.username = Some(patch.username);
            p.full_name = Some(patch.full_name);
            p.updated_at = patch.updated_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use newsfeed_mock_server::MockServer;
    use serde_json::json;

    use super::*;
    use crate::{
        api::Table,
        testutil::{backend, news, sign_in},
    };

    #[tokio::test]
    async fn requires_a_signed_in_viewer() {
        let srv = MockServer::new();
        assert!(matches!(
            ProfileView::load(backend(&srv)).await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn gathers_the_viewer_activity() {
        let srv = MockServer::new();
        let (a, b) = (news(1, vec![], 1), news(2, vec![], 2));
        srv.add_news(&a);
        srv.add_news(&b);
        let user = sign_in(&srv, "gus@example.org", None);
        srv.add_record(Table::Likes, json!({ "news_id": a.id, "user_id": user.id }));
        srv.add_record(Table::Bookmarks, json!({ "news_id": b.id, "user_id": user.id }));
        for (news_id, text) in [(a.id, "older"), (b.id, "newer")] {
            srv.add_record(
                Table::Comments,
                json!({
                    "news_id": news_id,
                    "user_id": user.id,
                    "content": text,
                    "parent_id": null,
                }),
            );
        }

        let view = ProfileView::load(backend(&srv)).await.unwrap();
        assert_eq!(view.liked.iter().map(|n| n.id).collect::<Vec<_>>(), vec![a.id]);
        assert_eq!(view.bookmarked.iter().map(|n| n.id).collect::<Vec<_>>(), vec![b.id]);
        assert_eq!(view.comments.len(), 2);
        assert_eq!(view.comments[0].comment.content, "newer");
        assert_eq!(view.comments[0].news.as_ref().map(|n| n.id), Some(b.id));
        assert_eq!(view.display_name(), "gus@example.org");
        assert_eq!(view.initials(), "GU");
    }

    #[tokio::test]
    async fn saving_updates_the_local_profile() {
        let srv = MockServer::new();
        sign_in(&srv, "hal@example.org", Some("hal"));
        let mut view = ProfileView::load(backend(&srv)).await.unwrap();
        assert_eq!(view.display_name(), "hal");

        view.save("hal9000", "Hal Nine").await.unwrap();
        assert_eq!(view.display_name(), "hal9000");
        let profile = view.profile.as_ref().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Hal Nine"));
        assert_eq!(srv.records(Table::Profiles)[0]["username"], "hal9000");

        srv.set_failing(Table::Profiles, true);
        assert!(matches!(
            view.save("x", "y").await,
            Err(Error::RemoteMutationFailed(_))
        ));
        assert_eq!(view.display_name(), "hal9000");
    }
}
