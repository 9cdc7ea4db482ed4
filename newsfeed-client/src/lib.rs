use std::sync::Arc;

use newsfeed_api::{AuthService, DataService};

mod article;
pub use article::{ArticleState, ArticleView};

mod comment;
pub use comment::{CommentNode, CommentTree};

mod comments;
pub use comments::{initials, CommentSection, ANONYMOUS_NAME};

mod error;
pub use error::Error;

mod feed;
pub use feed::{ActiveCard, Feed};

mod interaction;
pub use interaction::{InteractionState, Interactions};

mod media;
pub use media::{backup_image, ImageLoader, ImageStep, MAX_IMAGE_RETRIES};

mod profile;
pub use profile::{ProfileView, UserComment};

mod service;
pub use service::{DataServiceExt, COMMENT_SELECT};

#[cfg(test)]
mod testutil;

pub mod api {
    pub use newsfeed_api::*;
}

pub mod prelude {
    pub use crate::DataServiceExt;
}

/// Collaborators every view-state talks to
///
/// Cloning is cheap; all clones share the same services.
#[derive(Clone)]
pub struct Backend {
    pub data: Arc<dyn DataService>,
    pub auth: Arc<dyn AuthService>,
}

impl Backend {
    pub fn new(data: Arc<dyn DataService>, auth: Arc<dyn AuthService>) -> Backend {
        Backend { data, auth }
    }

    /// Uses the same service for both data and auth
    pub fn from_service<S>(service: S) -> Backend
    where
        S: DataService + AuthService + 'static,
    {
        let service = Arc::new(service);
        Backend {
            data: service.clone(),
            auth: service,
        }
    }
}
