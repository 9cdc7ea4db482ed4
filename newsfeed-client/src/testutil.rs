use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use newsfeed_mock_server::MockServer;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    api::{
        DataService, Filter, News, NewsCategory, NewsId, Record, SignUpMetadata, Table, User, Uuid,
    },
    Backend,
};

pub fn news(n: u128, categories: Vec<NewsCategory>, day: u32) -> News {
    let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
    News {
        id: NewsId(Uuid::from_u128(n)),
        title: format!("news {n}"),
        summary: None,
        content: None,
        image_url: None,
        source: None,
        source_image_url: None,
        news_date: at,
        created_at: at,
        categories,
        tags: Vec::new(),
        likes_count: 0,
        comments_count: 0,
        shares_count: 0,
        metadata: None,
    }
}

pub fn backend(srv: &MockServer) -> Backend {
    Backend::from_service(srv.clone())
}

/// Creates an account with the given username and signs it in
pub fn sign_in(srv: &MockServer, email: &str, username: Option<&str>) -> User {
    let user = srv
        .admin_create_user(
            email,
            "hunter2",
            SignUpMetadata {
                username: username.map(String::from),
                avatar_url: None,
            },
        )
        .expect("creating test user");
    srv.force_sign_in(&user);
    user
}

/// Lets the other branch of a `join!` run until `cond` holds
pub async fn until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::task::yield_now().await;
    }
}

/// Data side of a [`MockServer`] whose `find_record` answers can go stale
///
/// Held answers are read when the call arrives and only returned after
/// [`StaleReads::release`].
#[derive(Clone)]
pub struct StaleReads {
    inner: MockServer,
    holds: Arc<Mutex<StaleState>>,
    released: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct StaleState {
    to_hold: usize,
    held: usize,
    forget: bool,
}

impl StaleReads {
    pub fn new(inner: &MockServer) -> StaleReads {
        StaleReads {
            inner: inner.clone(),
            holds: Arc::new(Mutex::new(StaleState::default())),
            released: Arc::new(watch::channel(false).0),
        }
    }

    /// Data from this wrapper, auth from the wrapped server
    pub fn backend(&self) -> Backend {
        Backend::new(Arc::new(self.clone()), Arc::new(self.inner.clone()))
    }

    pub fn hold(&self, count: usize) {
        self.holds.lock().to_hold = count;
    }

    pub fn held(&self) -> usize {
        self.holds.lock().held
    }

    pub fn release(&self) {
        self.released.send_replace(true);
    }

    /// Makes every lookup answer as if nothing matched
    pub fn forget(&self) {
        self.holds.lock().forget = true;
    }
}

#[async_trait]
impl DataService for StaleReads {
    async fn fetch_records(&self, table: Table, filter: &Filter) -> anyhow::Result<Vec<Record>> {
        self.inner.fetch_records(table, filter).await
    }

    async fn fetch_record_by_id(&self, table: Table, id: Uuid) -> anyhow::Result<Option<Record>> {
        self.inner.fetch_record_by_id(table, id).await
    }

    async fn insert_record(&self, table: Table, payload: Record) -> anyhow::Result<Record> {
        self.inner.insert_record(table, payload).await
    }

    async fn update_record(&self, table: Table, id: Uuid, patch: Record) -> anyhow::Result<()> {
        self.inner.update_record(table, id, patch).await
    }

    async fn delete_record(&self, table: Table, id: Uuid) -> anyhow::Result<()> {
        self.inner.delete_record(table, id).await
    }

    async fn find_record(&self, table: Table, criteria: &Filter) -> anyhow::Result<Option<Record>> {
        let found = self.inner.find_record(table, criteria).await;
        let hold = {
            let mut st = self.holds.lock();
            if st.forget {
                return found.map(|_| None);
            }
            let hold = st.to_hold > 0 && !*self.released.borrow();
            if hold {
                st.to_hold -= 1;
                st.held += 1;
            }
            hold
        };
        if hold {
            let mut released = self.released.subscribe();
            let _ = released.wait_for(|r| *r).await;
        }
        found
    }
}
