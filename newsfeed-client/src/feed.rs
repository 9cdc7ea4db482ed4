use crate::{
    api::{CategoryFilter, News, NewsCategory},
    Backend, DataServiceExt, Error, Interactions,
};

/// Card that just became the active one while scrolling
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveCard {
    pub index: usize,
    pub news: News,

    /// Primary category of the card, announced on every change of card
    pub announcement: Option<NewsCategory>,
}

/// Vertically scrolled list of full-height news cards
pub struct Feed {
    backend: Backend,
    category: CategoryFilter,
    items: Vec<News>,
    active: Option<usize>,
}

/// Index of the card filling most of the viewport
fn card_index(offset: f64, viewport_height: f64, len: usize) -> Option<usize> {
    if len == 0 || viewport_height.is_nan() || viewport_height <= 0.0 || !offset.is_finite() {
        return None;
    }
    let raw = (offset / viewport_height).round();
    if raw <= 0.0 {
        return Some(0);
    }
    Some((raw as usize).min(len - 1))
}

impl Feed {
    pub fn new(backend: Backend) -> Feed {
        Feed {
            backend,
            category: CategoryFilter::All,
            items: Vec::new(),
            active: None,
        }
    }

    pub fn category(&self) -> CategoryFilter {
        self.category
    }

    pub fn items(&self) -> &[News] {
        &self.items
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&News> {
        self.active.and_then(|i| self.items.get(i))
    }

    /// Fetches the news of `category`, most recent first, and scrolls back
    /// to the top
    pub async fn load(&mut self, category: CategoryFilter) -> Result<&[News], Error> {
        let items = self
            .backend
            .data
            .fetch_news(category)
            .await
            .map_err(Error::FetchFailed)?;
        tracing::debug!(?category, num_items = items.len(), "loaded feed");
        self.category = category;
        self.active = (!items.is_empty()).then_some(0);
        self.items = items;
        Ok(&self.items)
    }

    pub fn on_scroll(&mut self, offset: f64, viewport_height: f64) -> Option<ActiveCard> {
        let index = card_index(offset, viewport_height, self.items.len())?;
        if self.active == Some(index) {
            return None;
        }
        self.active = Some(index);
        let news = self.items[index].clone();
        let announcement = news.primary_category();
        Some(ActiveCard {
            index,
            news,
            announcement,
        })
    }

    /// Like and bookmark state for the card at `index`
    pub fn interactions(&self, index: usize) -> Option<Interactions> {
        self.items
            .get(index)
            .map(|n| Interactions::for_news(self.backend.clone(), n))
    }
}

#[cfg(test)]
mod tests {
    use newsfeed_mock_server::MockServer;

    use super::*;
    use crate::{
        api::{InteractionKind, Table},
        testutil::{backend, news, sign_in},
    };

    #[test]
    fn active_card_is_clamped() {
        assert_eq!(card_index(0.0, 800.0, 3), Some(0));
        assert_eq!(card_index(-120.0, 800.0, 3), Some(0));
        assert_eq!(card_index(390.0, 800.0, 3), Some(0));
        assert_eq!(card_index(410.0, 800.0, 3), Some(1));
        assert_eq!(card_index(1600.0, 800.0, 3), Some(2));
        assert_eq!(card_index(99_999.0, 800.0, 3), Some(2));
        assert_eq!(card_index(100.0, 0.0, 3), None);
        assert_eq!(card_index(100.0, 800.0, 0), None);
        assert_eq!(card_index(f64::NAN, 800.0, 3), None);
    }

    #[tokio::test]
    async fn scrolling_announces_each_new_card() {
        let srv = MockServer::new();
        srv.add_news(&news(1, vec![NewsCategory::Media], 3));
        srv.add_news(&news(2, vec![NewsCategory::Media], 2));
        srv.add_news(&news(3, vec![NewsCategory::Telecom], 1));
        let mut feed = Feed::new(backend(&srv));
        assert_eq!(feed.load(CategoryFilter::All).await.unwrap().len(), 3);
        assert_eq!(feed.active_index(), Some(0));

        assert_eq!(feed.on_scroll(100.0, 800.0), None);
        let card = feed.on_scroll(800.0, 800.0).unwrap();
        assert_eq!(card.index, 1);
        assert_eq!(card.announcement, Some(NewsCategory::Media));
        let card = feed.on_scroll(1700.0, 800.0).unwrap();
        assert_eq!(card.index, 2);
        assert_eq!(card.announcement, Some(NewsCategory::Telecom));
        assert_eq!(feed.active().map(|n| n.id), Some(card.news.id));

        // back to a card without a category
        srv.add_news(&news(4, vec![], 4));
        feed.load(CategoryFilter::All).await.unwrap();
        let card = feed.on_scroll(800.0, 800.0).unwrap();
        assert_eq!(card.announcement, Some(NewsCategory::Media));
        let card = feed.on_scroll(0.0, 800.0).unwrap();
        assert_eq!((card.index, card.announcement), (0, None));
    }

    #[tokio::test]
    async fn category_filter_and_failures() {
        let srv = MockServer::new();
        srv.add_news(&news(1, vec![NewsCategory::Media], 3));
        srv.add_news(&news(2, vec![NewsCategory::Trending], 2));
        let mut feed = Feed::new(backend(&srv));
        let only = feed
            .load(CategoryFilter::Only(NewsCategory::Trending))
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(feed.category(), CategoryFilter::Only(NewsCategory::Trending));

        srv.set_fetch_failing(Table::News, true);
        assert!(matches!(
            feed.load(CategoryFilter::All).await,
            Err(Error::FetchFailed(_))
        ));
        assert_eq!(feed.items().len(), 1);
    }

    #[tokio::test]
    async fn cards_toggle_independently() {
        let srv = MockServer::new();
        srv.add_news(&news(1, vec![], 3));
        srv.add_news(&news(2, vec![], 2));
        sign_in(&srv, "fay@example.org", None);
        let mut feed = Feed::new(backend(&srv));
        feed.load(CategoryFilter::All).await.unwrap();

        let first = feed.interactions(0).unwrap();
        let second = feed.interactions(1).unwrap();
        first.toggle(InteractionKind::Like).await.unwrap();
        assert!(first.state().liked);
        assert!(!second.state().liked);
        assert!(feed.interactions(2).is_none());
    }
}
