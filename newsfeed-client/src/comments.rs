use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    api::{Comment, CommentId, CommentProfile, NewComment, NewsId, User, UserId},
    Backend, CommentTree, DataServiceExt, Error,
};

pub const ANONYMOUS_NAME: &str = "Anonymous User";

/// Two first characters of `name`, upper-cased, for avatar placeholders
pub fn initials(name: &str) -> String {
    name.chars().take(2).flat_map(char::to_uppercase).collect()
}

#[derive(Default)]
struct Section {
    profiles: HashMap<UserId, CommentProfile>,
    unmounted: bool,
}

/// Comments of one article, along with their authors' profiles
pub struct CommentSection {
    backend: Backend,
    news_id: NewsId,
    session: watch::Receiver<Option<User>>,
    comments: watch::Sender<Vec<Comment>>,
    section: Mutex<Section>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl CommentSection {
    pub fn new(backend: Backend, news_id: NewsId) -> CommentSection {
        let session = backend.auth.subscribe();
        let (comments, _) = watch::channel(Vec::new());
        CommentSection {
            backend,
            news_id,
            session,
            comments,
            section: Mutex::new(Section::default()),
        }
    }

    /// Comments as last loaded, newest first
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Comment>> {
        self.comments.subscribe()
    }

    pub fn tree(&self) -> CommentTree {
        CommentTree::build(&self.comments.borrow())
    }

    pub fn unmount(&self) {
        self.section.lock().unmounted = true;
    }

    fn viewer(&self) -> Result<User, Error> {
        self.session.borrow().clone().ok_or(Error::Unauthenticated)
    }

    /// Replaces the local comments with the backend's, keeping the current
    /// ones if fetching fails
    pub async fn load(&self) -> Result<(), Error> {
        let data = &self.backend.data;
        let comments = data
            .fetch_comments(self.news_id)
            .await
            .map_err(Error::FetchFailed)?;

        let missing = {
            let s = self.section.lock();
            comments
                .iter()
                .filter(|c| c.profile.is_none() && !s.profiles.contains_key(&c.user_id))
                .map(|c| c.user_id)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
        };
        let fetched =
            futures::future::join_all(missing.iter().map(|u| data.fetch_profile(*u))).await;

        let mut s = self.section.lock();
        if s.unmounted {
            return Err(Error::ViewUnmounted);
        }
        for c in &comments {
            if let Some(p) = &c.profile {
                s.profiles.insert(c.user_id, p.clone());
            }
        }
        for (user, res) in missing.into_iter().zip(fetched) {
            match res {
                Ok(Some(p)) => {
                    s.profiles.insert(
                        user,
                        CommentProfile {
                            username: p.username,
                            avatar_url: p.avatar_url,
                        },
                    );
                }
                Ok(None) => (),
                Err(err) => tracing::warn!(%user, ?err, "failed to fetch comment author profile"),
            }
        }
        tracing::debug!(news = %self.news_id, num_comments = comments.len(), "loaded comments");
        self.comments.send_replace(comments);
        Ok(())
    }

    /// Posts a comment, or a reply to `reply_to`
    ///
    /// The new comment is shown right away, then the whole section is
    /// reloaded to pick up the thread structure the backend settled on.
    pub async fn submit(&self, text: &str, reply_to: Option<CommentId>) -> Result<Comment, Error> {
        if text.trim().is_empty() {
            return Err(Error::EmptyComment);
        }
        let user = self.viewer()?;
        let new = NewComment {
            content: String::from(text),
            news_id: self.news_id,
            user_id: user.id,
            parent_id: reply_to,
        };
        new.validate()?;

        let mut created = self
            .backend
            .data
            .add_comment(new)
            .await
            .map_err(Error::RemoteMutationFailed)?;
        {
            let s = self.section.lock();
            if s.unmounted {
                return Err(Error::ViewUnmounted);
            }
            if created.profile.is_none() {
                created.profile = s.profiles.get(&user.id).cloned();
            }
            let shown = created.clone();
            self.comments.send_modify(|cs| cs.insert(0, shown));
        }

        if let Err(err) = self.load().await {
            tracing::warn!(news = %self.news_id, ?err, "failed to reload comments after posting");
        }
        Ok(created)
    }

    /// Fails unless the viewer wrote comment `id`
    fn check_author(&self, id: CommentId) -> Result<User, Error> {
        let user = self.viewer()?;
        let author = self
            .comments
            .borrow()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.user_id)
            .ok_or(Error::RecordNotFound)?;
        match author == user.id {
            true => Ok(user),
            false => Err(Error::PermissionDenied),
        }
    }

    pub fn can_modify(&self, comment: &Comment) -> bool {
        self.session
            .borrow()
            .as_ref()
            .map_or(false, |u| u.id == comment.user_id)
    }

    pub async fn edit(&self, id: CommentId, text: &str) -> Result<(), Error> {
        if text.trim().is_empty() {
            return Err(Error::EmptyComment);
        }
        self.check_author(id)?;
        let now = Utc::now();
        self.backend
            .data
            .update_comment(id, String::from(text), now)
            .await
            .map_err(Error::RemoteMutationFailed)?;

        let s = self.section.lock();
        if s.unmounted {
            return Err(Error::ViewUnmounted);
        }
        self.comments.send_modify(|cs| {
            if let Some(c) = cs.iter_mut().find(|c| c.id == id) {
                c.content = String::from(text);
                c.updated_at = now;
            }
        });
        Ok(())
    }

    /// Deletes a comment; its replies are then shown as top-level comments
    pub async fn delete(&self, id: CommentId) -> Result<(), Error> {
        self.check_author(id)?;
        self.backend
            .data
            .delete_comment(id)
            .await
            .map_err(Error::RemoteMutationFailed)?;

        let s = self.section.lock();
        if s.unmounted {
            return Err(Error::ViewUnmounted);
        }
        self.comments.send_modify(|cs| cs.retain(|c| c.id != id));
        Ok(())
    }

    pub fn display_name(&self, comment: &Comment) -> String {
        let s = self.section.lock();
        let cached = s.profiles.get(&comment.user_id).and_then(|p| non_empty(&p.username));
        let embedded = comment.profile.as_ref().and_then(|p| non_empty(&p.username));
        if let Some(name) = cached.or(embedded) {
            return String::from(name);
        }
        match &*self.session.borrow() {
            Some(u) if u.id == comment.user_id => String::from(u.email_local_part()),
            _ => String::from(ANONYMOUS_NAME),
        }
    }

    pub fn avatar_url(&self, comment: &Comment) -> Option<String> {
        let s = self.section.lock();
        s.profiles
            .get(&comment.user_id)
            .and_then(|p| non_empty(&p.avatar_url))
            .or_else(|| comment.profile.as_ref().and_then(|p| non_empty(&p.avatar_url)))
            .map(String::from)
    }
}
