use parking_lot::Mutex;

use crate::{
    api::{InteractionKind, News, NewsId},
    Backend, CommentSection, DataServiceExt, Error, InteractionState, Interactions,
};

#[derive(Clone, Debug, PartialEq)]
pub enum ArticleState {
    Loading,
    Loaded(News),

    /// The article does not exist; this view will not retry
    NotFound,
}

/// Detail page of one article: its contents, the viewer's interactions and
/// the comment section
pub struct ArticleView {
    backend: Backend,
    news_id: NewsId,
    state: Mutex<ArticleState>,
    interactions: Interactions,
    comments: CommentSection,
}

impl ArticleView {
    pub fn new(backend: Backend, news_id: NewsId) -> ArticleView {
        ArticleView {
            interactions: Interactions::unseeded(backend.clone(), news_id),
            comments: CommentSection::new(backend.clone(), news_id),
            backend,
            news_id,
            state: Mutex::new(ArticleState::Loading),
        }
    }

    pub fn state(&self) -> ArticleState {
        self.state.lock().clone()
    }

    pub fn news(&self) -> Option<News> {
        match &*self.state.lock() {
            ArticleState::Loaded(n) => Some(n.clone()),
            _ => None,
        }
    }

    pub fn interactions(&self) -> &Interactions {
        &self.interactions
    }

    pub fn comments(&self) -> &CommentSection {
        &self.comments
    }

    /// Fetches the article, then the viewer's interactions and the comments
    ///
    /// Only a failure to fetch the article itself is returned; the other
    /// parts are logged and left empty.
    pub async fn load(&self) -> Result<ArticleState, Error> {
        let fetched = self
            .backend
            .data
            .fetch_news_by_id(self.news_id)
            .await
            .map_err(Error::FetchFailed)?;
        if !self.interactions.is_mounted() {
            return Err(Error::ViewUnmounted);
        }
        let news = match fetched {
            Some(n) => n,
            None => {
                tracing::info!(news = %self.news_id, "article not found");
                *self.state.lock() = ArticleState::NotFound;
                return Err(Error::RecordNotFound);
            }
        };
        self.interactions.seed(InteractionState::for_news(&news));
        *self.state.lock() = ArticleState::Loaded(news);

        let (status, comments) =
            futures::join!(self.interactions.refresh_status(), self.comments.load());
        if let Err(err) = status {
            tracing::warn!(news = %self.news_id, ?err, "failed to fetch interaction status");
        }
        if let Err(err) = comments {
            tracing::warn!(news = %self.news_id, ?err, "failed to load comments");
        }
        Ok(self.state())
    }

    /// To be called whenever the viewer signs in or out
    pub async fn session_changed(&self) -> Result<(), Error> {
        self.interactions.refresh_status().await.map(|_| ())
    }

    pub async fn toggle_like(&self) -> Result<InteractionState, Error> {
        self.interactions.toggle(InteractionKind::Like).await
    }

    pub async fn toggle_bookmark(&self) -> Result<InteractionState, Error> {
        self.interactions.toggle(InteractionKind::Bookmark).await
    }

    pub async fn share(&self, platform: Option<String>) {
        self.interactions.share(platform).await
    }

    pub fn unmount(&self) {
        self.interactions.unmount();
        self.comments.unmount();
    }
}
