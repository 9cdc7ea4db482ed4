use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    api::{InteractionKind, NewShare, News, NewsId, User},
    Backend, DataServiceExt, Error,
};

/// What the viewer sees of their own like and bookmark on one article
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InteractionState {
    pub liked: bool,
    pub bookmarked: bool,

    /// Seeded from the article and adjusted locally, never ground truth
    pub like_count: i64,
}

impl InteractionState {
    pub fn for_news(news: &News) -> InteractionState {
        InteractionState {
            liked: false,
            bookmarked: false,
            like_count: news.likes_count.max(0),
        }
    }

    pub fn is_set(&self, kind: InteractionKind) -> bool {
        match kind {
            InteractionKind::Like => self.liked,
            InteractionKind::Bookmark => self.bookmarked,
        }
    }

    /// This state with `kind` set to `set`, moving the like counter along
    pub fn with(&self, kind: InteractionKind, set: bool) -> InteractionState {
        let mut res = *self;
        match kind {
            InteractionKind::Like => {
                if res.liked != set {
                    res.like_count = match set {
                        true => res.like_count + 1,
                        false => (res.like_count - 1).max(0),
                    };
                }
                res.liked = set;
            }
            InteractionKind::Bookmark => res.bookmarked = set,
        }
        res
    }

    pub fn toggled(&self, kind: InteractionKind) -> InteractionState {
        self.with(kind, !self.is_set(kind))
    }

    /// This state with everything `kind` controls taken back from `prior`
    pub fn restored(&self, kind: InteractionKind, prior: &InteractionState) -> InteractionState {
        let mut res = *self;
        match kind {
            InteractionKind::Like => {
                res.liked = prior.liked;
                res.like_count = prior.like_count;
            }
            InteractionKind::Bookmark => res.bookmarked = prior.bookmarked,
        }
        res
    }
}

#[derive(Default)]
struct Guard {
    in_flight: HashSet<InteractionKind>,

    /// Bumped whenever a toggle of that kind starts or completes
    generations: HashMap<InteractionKind, u64>,

    seeded: bool,
    unmounted: bool,
}

impl Guard {
    fn generation(&self, kind: InteractionKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or(0)
    }

    fn bump(&mut self, kind: InteractionKind) {
        *self.generations.entry(kind).or_insert(0) += 1;
    }
}

/// Optimistic like and bookmark toggling for one article, as seen by the
/// signed-in viewer
///
/// Every state change is published on a watch channel before the matching
/// remote call is issued, and reverted if that call fails.
pub struct Interactions {
    backend: Backend,
    news_id: NewsId,
    session: watch::Receiver<Option<User>>,
    state: watch::Sender<InteractionState>,
    guard: Mutex<Guard>,
}

impl Interactions {
    pub fn new(backend: Backend, news_id: NewsId, initial: InteractionState) -> Interactions {
        let res = Interactions::unseeded(backend, news_id);
        res.seed(initial);
        res
    }

    /// Refuses toggles with [`Error::NotLoaded`] until [`Interactions::seed`]
    /// is called, as the like counter is not known yet
    pub fn unseeded(backend: Backend, news_id: NewsId) -> Interactions {
        let session = backend.auth.subscribe();
        let (state, _) = watch::channel(InteractionState::default());
        Interactions {
            backend,
            news_id,
            session,
            state,
            guard: Mutex::new(Guard::default()),
        }
    }

    pub fn for_news(backend: Backend, news: &News) -> Interactions {
        Interactions::new(backend, news.id, InteractionState::for_news(news))
    }

    pub fn news_id(&self) -> NewsId {
        self.news_id
    }

    pub fn state(&self) -> InteractionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionState> {
        self.state.subscribe()
    }

    /// Replaces the whole state, eg. once the article has been (re)loaded
    pub fn seed(&self, state: InteractionState) {
        let mut g = self.guard.lock();
        if g.unmounted {
            return;
        }
        g.seeded = true;
        self.state.send_replace(state);
    }

    /// Makes every later completion a no-op
    pub fn unmount(&self) {
        self.guard.lock().unmounted = true;
    }

    pub fn is_mounted(&self) -> bool {
        !self.guard.lock().unmounted
    }

    /// Asks the backend whether the current viewer liked or bookmarked this
    /// article, and updates the flags accordingly
    pub async fn refresh_status(&self) -> Result<InteractionState, Error> {
        const KINDS: [InteractionKind; 2] = [InteractionKind::Like, InteractionKind::Bookmark];
        let started = {
            let g = self.guard.lock();
            KINDS.map(|k| g.generation(k))
        };
        let user = self.session.borrow().clone();
        let (liked, bookmarked) = match user {
            None => (false, false),
            Some(user) => {
                let data = &self.backend.data;
                futures::try_join!(
                    data.interaction_exists(InteractionKind::Like, self.news_id, user.id),
                    data.interaction_exists(InteractionKind::Bookmark, self.news_id, user.id),
                )
                .map_err(Error::FetchFailed)?
            }
        };

        let g = self.guard.lock();
        if g.unmounted {
            return Err(Error::ViewUnmounted);
        }
        let mut state = *self.state.borrow();
        let fetched = started.into_iter().zip([liked, bookmarked]);
        for (kind, (started, set)) in KINDS.into_iter().zip(fetched) {
            // any toggle since the snapshot was taken knows better than it
            if g.in_flight.contains(&kind) || g.generation(kind) != started {
                tracing::debug!(news = %self.news_id, %kind, "ignoring outdated status");
                continue;
            }
            // the seeded counter already accounts for the viewer's own like
            match kind {
                InteractionKind::Like => state.liked = set,
                InteractionKind::Bookmark => state.bookmarked = set,
            }
        }
        self.state.send_replace(state);
        Ok(state)
    }

    /// Flips `kind` for the current viewer
    ///
    /// A second toggle of the same kind issued while the first one is still
    /// pending is refused with [`Error::ToggleInFlight`], without touching
    /// the state nor the backend.
    pub async fn toggle(&self, kind: InteractionKind) -> Result<InteractionState, Error> {
        let user = self
            .session
            .borrow()
            .clone()
            .ok_or(Error::Unauthenticated)?;

        let prior = {
            let mut g = self.guard.lock();
            if g.unmounted {
                return Err(Error::ViewUnmounted);
            }
            if !g.seeded {
                return Err(Error::NotLoaded);
            }
            if !g.in_flight.insert(kind) {
                tracing::debug!(news = %self.news_id, %kind, "ignoring overlapping toggle");
                return Err(Error::ToggleInFlight { kind });
            }
            g.bump(kind);
            let prior = *self.state.borrow();
            self.state.send_replace(prior.toggled(kind));
            prior
        };
        tracing::trace!(news = %self.news_id, %kind, ?prior, "optimistically toggled");

        let res = self
            .backend
            .data
            .toggle_interaction(kind, self.news_id, user.id)
            .await;

        let mut g = self.guard.lock();
        g.in_flight.remove(&kind);
        g.bump(kind);
        if g.unmounted {
            tracing::debug!(news = %self.news_id, %kind, "toggle completed after unmount");
            return Err(Error::ViewUnmounted);
        }
        let current = *self.state.borrow();
        match res {
            Ok(toggled) => {
                if toggled.is_set() == prior.is_set(kind) {
                    tracing::warn!(
                        news = %self.news_id,
                        %kind,
                        ?toggled,
                        "backend toggled the other way than expected"
                    );
                }
                let state = current.with(kind, toggled.is_set());
                self.state.send_replace(state);
                Ok(state)
            }
            Err(source) => {
                tracing::warn!(
                    news = %self.news_id,
                    %kind,
                    err = ?source,
                    "toggle failed, rolling back"
                );
                self.state.send_replace(current.restored(kind, &prior));
                Err(Error::InteractionFailed { kind, source })
            }
        }
    }

    /// Records that the article was shared, by whoever is viewing it
    ///
    /// Failures are only logged: sharing itself happens outside the
    /// backend and must not be held back by it.
    pub async fn share(&self, platform: Option<String>) {
        let user_id = self.session.borrow().as_ref().map(|u| u.id);
        let share = NewShare {
            news_id: self.news_id,
            user_id,
            platform,
        };
        if let Err(err) = self.backend.data.record_share(share).await {
            tracing::error!(news = %self.news_id, ?err, "failed to record share");
        }
    }
}

#[cfg(test)]
mod tests {
    use newsfeed_mock_server::{Call, MockServer};
    use serde_json::json;

    use super::*;
    use crate::{
        api::{AuthService, Table},
        testutil::{backend, news, sign_in, until, StaleReads},
    };

    const UNLIKED: InteractionState = InteractionState {
        liked: false,
        bookmarked: false,
        like_count: 10,
    };

    fn setup(signed_in: bool) -> (MockServer, Interactions) {
        let srv = MockServer::new();
        let mut item = news(1, vec![], 1);
        item.likes_count = 10;
        srv.add_news(&item);
        if signed_in {
            sign_in(&srv, "reader@example.org", Some("reader"));
        }
        let i = Interactions::for_news(backend(&srv), &item);
        (srv, i)
    }

    #[test]
    fn like_counter_never_goes_negative() {
        let s = InteractionState {
            liked: true,
            bookmarked: false,
            like_count: 0,
        };
        assert_eq!(s.toggled(InteractionKind::Like).like_count, 0);
        assert_eq!(s.toggled(InteractionKind::Bookmark).like_count, 0);
    }

    #[tokio::test]
    async fn optimistic_update_is_rolled_back_on_failure() {
        let (srv, i) = setup(true);
        assert_eq!(i.state(), UNLIKED);
        srv.set_failing(Table::Likes, true);
        let rx = i.subscribe();

        srv.pause();
        let (res, ()) = tokio::join!(i.toggle(InteractionKind::Like), async {
            until(|| !srv.calls().is_empty()).await;
            let seen = *rx.borrow();
            assert_eq!(
                seen,
                InteractionState {
                    liked: true,
                    bookmarked: false,
                    like_count: 11,
                }
            );
            srv.resume();
        });

        assert!(matches!(
            res,
            Err(Error::InteractionFailed {
                kind: InteractionKind::Like,
                ..
            })
        ));
        assert_eq!(i.state(), UNLIKED);
        assert_eq!(*rx.borrow(), UNLIKED);
    }

    #[tokio::test]
    async fn toggling_twice_round_trips() {
        let (srv, i) = setup(true);
        for kind in [InteractionKind::Like, InteractionKind::Bookmark] {
            let once = i.toggle(kind).await.unwrap();
            assert!(once.is_set(kind));
            let twice = i.toggle(kind).await.unwrap();
            assert_eq!(twice, UNLIKED);
        }
        assert!(srv.records(Table::Likes).is_empty());
        assert!(srv.records(Table::Bookmarks).is_empty());
        assert_eq!(srv.mutation_count(), 4);
    }

    #[tokio::test]
    async fn signed_out_viewers_cannot_toggle() {
        let (srv, i) = setup(false);
        let res = i.toggle(InteractionKind::Like).await;
        assert!(matches!(res, Err(Error::Unauthenticated)));
        assert_eq!(srv.calls(), Vec::<Call>::new());
        assert_eq!(i.state(), UNLIKED);
    }

    #[tokio::test]
    async fn overlapping_toggles_are_refused() {
        let (srv, i) = setup(true);
        srv.pause();
        let (first, ()) = tokio::join!(i.toggle(InteractionKind::Like), async {
            until(|| !srv.calls().is_empty()).await;
            let second = i.toggle(InteractionKind::Like).await;
            assert!(matches!(
                second,
                Err(Error::ToggleInFlight {
                    kind: InteractionKind::Like
                })
            ));
            srv.resume();
        });
        assert_eq!(
            first.unwrap(),
            InteractionState {
                liked: true,
                bookmarked: false,
                like_count: 11,
            }
        );
        assert_eq!(srv.mutation_count(), 1);
    }

    #[tokio::test]
    async fn different_kinds_do_not_block_each_other() {
        let (srv, i) = setup(true);
        srv.pause();
        let (like, bookmark, ()) = tokio::join!(
            i.toggle(InteractionKind::Like),
            i.toggle(InteractionKind::Bookmark),
            async {
                until(|| srv.calls().len() >= 2).await;
                srv.resume();
            }
        );
        like.unwrap();
        bookmark.unwrap();
        assert_eq!(
            i.state(),
            InteractionState {
                liked: true,
                bookmarked: true,
                like_count: 11,
            }
        );
    }

    #[tokio::test]
    async fn late_completion_after_unmount_is_ignored() {
        let (srv, i) = setup(true);
        srv.set_failing(Table::Likes, true);
        srv.pause();
        let (res, ()) = tokio::join!(i.toggle(InteractionKind::Like), async {
            until(|| !srv.calls().is_empty()).await;
            i.unmount();
            srv.resume();
        });
        assert!(matches!(res, Err(Error::ViewUnmounted)));
        // no rollback happened on the torn-down view
        assert!(i.state().liked);
        assert!(!i.is_mounted());
    }

    #[tokio::test]
    async fn backend_direction_wins() {
        let (srv, i) = setup(true);
        let user = srv.current_user().unwrap();
        srv.add_record(
            Table::Likes,
            json!({ "news_id": i.news_id(), "user_id": user.id }),
        );
        // local state still believes the article is not liked
        let state = i.toggle(InteractionKind::Like).await.unwrap();
        assert_eq!(state, UNLIKED);
        assert!(srv.records(Table::Likes).is_empty());
    }

    #[tokio::test]
    async fn status_follows_the_session() {
        let (srv, i) = setup(true);
        let user = srv.current_user().unwrap();
        srv.add_record(
            Table::Bookmarks,
            json!({ "news_id": i.news_id(), "user_id": user.id }),
        );
        let state = i.refresh_status().await.unwrap();
        assert!(state.bookmarked);
        assert!(!state.liked);

        srv.sign_out().await.unwrap();
        let state = i.refresh_status().await.unwrap();
        assert!(!state.bookmarked);
    }

    #[tokio::test]
    async fn share_failures_are_not_reported() {
        let (srv, i) = setup(false);
        i.share(Some(String::from("twitter"))).await;
        let shares = srv.records(Table::Shares);
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0]["user_id"], serde_json::Value::Null);
        assert_eq!(shares[0]["platform"], "twitter");

        srv.set_failing(Table::Shares, true);
        i.share(None).await;
        assert_eq!(srv.records(Table::Shares).len(), 1);
        assert_eq!(i.state(), UNLIKED);
    }

    #[tokio::test]
    async fn refresh_does_not_undo_a_later_toggle() {
        let (srv, _) = setup(true);
        let mut item = news(1, vec![], 1);
        item.likes_count = 10;
        let stale = StaleReads::new(&srv);
        let i = Interactions::for_news(stale.backend(), &item);

        // both lookups of the refresh see the article as not liked yet
        stale.hold(2);
        let (refreshed, ()) = tokio::join!(i.refresh_status(), async {
            until(|| stale.held() == 2).await;
            let toggled = i.toggle(InteractionKind::Like).await.unwrap();
            assert!(toggled.liked);
            stale.release();
        });

        let liked = InteractionState {
            liked: true,
            bookmarked: false,
            like_count: 11,
        };
        assert_eq!(refreshed.unwrap(), liked);
        assert_eq!(i.state(), liked);
        assert_eq!(srv.records(Table::Likes).len(), 1);

        // a later refresh agrees and leaves the counter alone
        assert_eq!(i.refresh_status().await.unwrap(), liked);
        assert_eq!(i.toggle(InteractionKind::Like).await.unwrap(), UNLIKED);
        assert!(srv.records(Table::Likes).is_empty());
    }

    #[tokio::test]
    async fn toggles_wait_for_the_seed() {
        let (srv, _) = setup(true);
        let i = Interactions::unseeded(backend(&srv), NewsId(crate::api::Uuid::from_u128(1)));
        assert!(matches!(
            i.toggle(InteractionKind::Like).await,
            Err(Error::NotLoaded)
        ));
        assert_eq!(srv.calls(), Vec::<Call>::new());

        i.seed(UNLIKED);
        assert_eq!(i.toggle(InteractionKind::Like).await.unwrap().like_count, 11);
    }
}
