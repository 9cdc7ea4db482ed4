use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use newsfeed_api::{
    AuthService, Comment, Credentials, DataService, Error, Filter, News, Profile, Record,
    SignUpMetadata, Table, Time, User, UserId, Uuid,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;

// this server only ever runs in tests, no need for a slow hash
const BCRYPT_COST: u32 = 4;

/// In-memory stand-in for the hosted backend
///
/// Cloning yields another handle onto the same backend.
#[derive(Clone)]
pub struct MockServer(Arc<Shared>);

struct Shared {
    state: Mutex<State>,
    session: watch::Sender<Option<User>>,
    paused: watch::Sender<bool>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<Table, Vec<Record>>,
    users: BTreeMap<UserId, DbUser>,
    failing: HashSet<Table>,
    failing_fetches: HashSet<Table>,
    calls: Vec<Call>,
    last_time: Option<Time>,
}

#[derive(Debug)]
struct DbUser {
    email: String,
    pass_hash: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Call {
    Fetch(Table),
    FetchById(Table),
    Find(Table),
    Insert(Table),
    Update(Table),
    Delete(Table),
}

impl Call {
    pub fn table(&self) -> Table {
        match self {
            Call::Fetch(t)
            | Call::FetchById(t)
            | Call::Find(t)
            | Call::Insert(t)
            | Call::Update(t)
            | Call::Delete(t) => *t,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Insert(_) | Call::Update(_) | Call::Delete(_))
    }
}

fn id_of(r: &Record) -> Option<&str> {
    r.get("id").and_then(|id| id.as_str())
}

impl State {
    fn table(&self, t: Table) -> &[Record] {
        self.tables.get(&t).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Strictly increasing clock, so that records inserted in a row never
    /// share a timestamp
    fn now(&mut self) -> Time {
        let mut now = Utc::now();
        if let Some(last) = self.last_time {
            if now <= last {
                now = last + chrono::Duration::milliseconds(1);
            }
        }
        self.last_time = Some(now);
        now
    }

    fn bump_counter(&mut self, table: Table, rec: &Record, delta: i64) {
        let column = match table {
            Table::Likes => "likes_count",
            Table::Comments => "comments_count",
            Table::Shares => "shares_count",
            _ => return,
        };
        let news_id = match rec.get("news_id").and_then(|n| n.as_str()) {
            Some(n) => n.to_string(),
            None => return,
        };
        let news = self.tables.entry(Table::News).or_insert_with(Vec::new);
        if let Some(n) = news.iter_mut().find(|n| id_of(n) == Some(&news_id)) {
            let current = n.get(column).and_then(|c| c.as_i64()).unwrap_or(0);
            n[column] = json!((current + delta).max(0));
        }
    }

    fn insert(&mut self, table: Table, mut rec: Record) -> Result<Record, Error> {
        let now = self.now();
        let obj = rec.as_object_mut().ok_or_else(|| {
            Error::InvalidInput(format!("inserting a non-object into {}", table.name()))
        })?;
        obj.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
        obj.entry("created_at").or_insert_with(|| json!(now));
        if matches!(table, Table::Comments | Table::Profiles) {
            obj.entry("updated_at").or_insert_with(|| json!(now));
        }

        let rows = self.table(table);
        if rows.iter().any(|r| id_of(r) == id_of(&rec)) {
            return Err(Error::Conflict(format!(
                "duplicate id in table {}",
                table.name()
            )));
        }
        if matches!(table, Table::Likes | Table::Bookmarks)
            && rows.iter().any(|r| {
                r.get("news_id") == rec.get("news_id") && r.get("user_id") == rec.get("user_id")
            })
        {
            return Err(Error::Conflict(format!(
                "duplicate (news_id, user_id) in table {}",
                table.name()
            )));
        }

        self.bump_counter(table, &rec, 1);
        self.tables
            .entry(table)
            .or_insert_with(Vec::new)
            .push(rec.clone());
        Ok(rec)
    }

    fn embed_profile(&self, comment: &mut Record) {
        let profile = comment
            .get("user_id")
            .and_then(|u| u.as_str())
            .and_then(|u| self.table(Table::Profiles).iter().find(|p| id_of(p) == Some(u)))
            .map(|p| {
                json!({
                    "username": p.get("username").cloned().unwrap_or(Record::Null),
                    "avatar_url": p.get("avatar_url").cloned().unwrap_or(Record::Null),
                })
            })
            .unwrap_or(Record::Null);
        comment["profile"] = profile;
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        let (session, _) = watch::channel(None);
        let (paused, _) = watch::channel(false);
        MockServer(Arc::new(Shared {
            state: Mutex::new(State::default()),
            session,
            paused,
        }))
    }

    pub fn admin_create_user(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<User, Error> {
        let creds = Credentials {
            email: String::from(email),
            password: String::from(password),
        };
        creds.validate()?;
        let pass_hash =
            bcrypt::hash(password, BCRYPT_COST).map_err(|e| Error::Unknown(e.to_string()))?;

        let mut st = self.0.state.lock();
        if st.users.values().any(|u| u.email == email) {
            return Err(Error::Conflict(format!("email {email:?} already registered")));
        }
        let user = User {
            id: UserId(Uuid::new_v4()),
            email: String::from(email),
        };
        st.users.insert(
            user.id,
            DbUser {
                email: user.email.clone(),
                pass_hash,
            },
        );
        // the backend creates the profile row along with the account
        st.insert(
            Table::Profiles,
            json!({
                "id": user.id,
                "username": metadata.username,
                "avatar_url": metadata.avatar_url,
                "full_name": null,
            }),
        )?;
        Ok(user)
    }

    /// Marks `user` as signed in without going through password checks
    pub fn force_sign_in(&self, user: &User) {
        self.0.session.send_replace(Some(user.clone()));
    }

    pub fn add_record(&self, table: Table, rec: Record) -> Record {
        self.0
            .state
            .lock()
            .insert(table, rec)
            .unwrap_or_else(|e| panic!("seeding table {}: {e}", table.name()))
    }

    pub fn add_news(&self, news: &News) {
        self.add_record(
            Table::News,
            serde_json::to_value(news).expect("serializing news"),
        );
    }

    pub fn add_comment(&self, comment: &Comment) {
        let mut rec = serde_json::to_value(comment).expect("serializing comment");
        if let Some(obj) = rec.as_object_mut() {
            obj.remove("profile");
        }
        self.add_record(Table::Comments, rec);
    }

    pub fn add_profile(&self, profile: &Profile) {
        let mut st = self.0.state.lock();
        let rows = st.tables.entry(Table::Profiles).or_insert_with(Vec::new);
        let id = profile.id.0.to_string();
        rows.retain(|r| id_of(r) != Some(&id));
        rows.push(serde_json::to_value(profile).expect("serializing profile"));
    }

    pub fn records(&self, table: Table) -> Vec<Record> {
        self.0.state.lock().table(table).to_vec()
    }

    /// Makes every mutation on `table` fail until reverted
    pub fn set_failing(&self, table: Table, failing: bool) {
        let mut st = self.0.state.lock();
        match failing {
            true => st.failing.insert(table),
            false => st.failing.remove(&table),
        };
    }

    /// Makes every read on `table` fail until reverted
    pub fn set_fetch_failing(&self, table: Table, failing: bool) {
        let mut st = self.0.state.lock();
        match failing {
            true => st.failing_fetches.insert(table),
            false => st.failing_fetches.remove(&table),
        };
    }

    /// Holds every call issued from now on until [`MockServer::resume`]
    pub fn pause(&self) {
        self.0.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.0.paused.send_replace(false);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.state.lock().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.0
            .state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .count()
    }

    pub fn clear_calls(&self) {
        self.0.state.lock().calls.clear();
    }

    async fn enter(&self, call: Call) -> anyhow::Result<()> {
        self.0.state.lock().calls.push(call);
        let mut paused = self.0.paused.subscribe();
        // the sender lives in self, so this can only return Ok
        let _ = paused.wait_for(|p| !*p).await;
        let st = self.0.state.lock();
        let failing = match call.is_mutation() {
            true => st.failing.contains(&call.table()),
            false => st.failing_fetches.contains(&call.table()),
        };
        if failing {
            tracing::debug!(?call, "injecting failure");
            return Err(Error::Unknown(format!("injected failure for {call:?}")).into());
        }
        Ok(())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[async_trait]
impl DataService for MockServer {
    async fn fetch_records(&self, table: Table, filter: &Filter) -> anyhow::Result<Vec<Record>> {
        self.enter(Call::Fetch(table)).await?;
        let st = self.0.state.lock();
        let mut res = st
            .table(table)
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect::<Vec<_>>();
        filter.sort(&mut res);
        let wants_profile = filter
            .select
            .as_deref()
            .map_or(false, |s| s.contains("profile:profiles"));
        if table == Table::Comments && wants_profile {
            for r in res.iter_mut() {
                st.embed_profile(r);
            }
        }
        Ok(res)
    }

    async fn fetch_record_by_id(&self, table: Table, id: Uuid) -> anyhow::Result<Option<Record>> {
        self.enter(Call::FetchById(table)).await?;
        let id = id.to_string();
        Ok(self
            .0
            .state
            .lock()
            .table(table)
            .iter()
            .find(|r| id_of(r) == Some(&id))
            .cloned())
    }

    async fn insert_record(&self, table: Table, payload: Record) -> anyhow::Result<Record> {
        self.enter(Call::Insert(table)).await?;
        Ok(self.0.state.lock().insert(table, payload)?)
    }

    async fn update_record(&self, table: Table, id: Uuid, patch: Record) -> anyhow::Result<()> {
        self.enter(Call::Update(table)).await?;
        let patch = patch
            .as_object()
            .ok_or_else(|| anyhow!("patching {} with a non-object", table.name()))?
            .clone();
        let id = id.to_string();
        let mut st = self.0.state.lock();
        let rec = st
            .tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| id_of(r) == Some(&id)))
            .ok_or(Error::NotFound)?;
        for (k, v) in patch {
            rec[k.as_str()] = v;
        }
        Ok(())
    }

    async fn delete_record(&self, table: Table, id: Uuid) -> anyhow::Result<()> {
        self.enter(Call::Delete(table)).await?;
        let id = id.to_string();
        let mut st = self.0.state.lock();
        let removed = match st.tables.get_mut(&table) {
            None => None,
            Some(rows) => rows
                .iter()
                .position(|r| id_of(r) == Some(&id))
                .map(|i| rows.remove(i)),
        };
        if let Some(rec) = removed {
            st.bump_counter(table, &rec, -1);
        }
        Ok(())
    }

    async fn find_record(&self, table: Table, criteria: &Filter) -> anyhow::Result<Option<Record>> {
        self.enter(Call::Find(table)).await?;
        Ok(self
            .0
            .state
            .lock()
            .table(table)
            .iter()
            .find(|r| criteria.matches(r))
            .cloned())
    }
}

#[async_trait]
impl AuthService for MockServer {
    fn current_user(&self) -> Option<User> {
        self.0.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.0.session.subscribe()
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<User, Error> {
        credentials.validate()?;
        let user = {
            let st = self.0.state.lock();
            let (id, u) = st
                .users
                .iter()
                .find(|(_, u)| u.email == credentials.email)
                .ok_or(Error::PermissionDenied)?;
            if !bcrypt::verify(&credentials.password, &u.pass_hash).unwrap_or(false) {
                return Err(Error::PermissionDenied);
            }
            User {
                id: *id,
                email: u.email.clone(),
            }
        };
        self.0.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(
        &self,
        credentials: Credentials,
        metadata: SignUpMetadata,
    ) -> Result<(), Error> {
        self.admin_create_user(&credentials.email, &credentials.password, metadata)?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.0.session.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use newsfeed_api::OrderType;

    use super::*;

    #[tokio::test]
    async fn sign_in_announces_the_user() {
        let mock = MockServer::new();
        let user = mock
            .admin_create_user("ada@example.com", "hunter22", SignUpMetadata::default())
            .unwrap();
        let mut sub = mock.subscribe();
        assert_eq!(*sub.borrow(), None);

        let bad = Credentials {
            email: String::from("ada@example.com"),
            password: String::from("wrong"),
        };
        assert_eq!(mock.sign_in(bad).await, Err(Error::PermissionDenied));

        let good = Credentials {
            email: String::from("ada@example.com"),
            password: String::from("hunter22"),
        };
        assert_eq!(mock.sign_in(good).await.unwrap(), user);
        sub.changed().await.unwrap();
        assert_eq!(*sub.borrow(), Some(user));

        mock.sign_out().await.unwrap();
        assert!(!mock.is_authenticated());
    }

    #[tokio::test]
    async fn likes_are_unique_and_counted() {
        let mock = MockServer::new();
        let news = mock.add_record(Table::News, json!({ "title": "t", "likes_count": 0 }));
        let news_id = news["id"].clone();
        let like = json!({ "news_id": news_id, "user_id": UserId::stub() });

        mock.insert_record(Table::Likes, like.clone()).await.unwrap();
        assert!(mock.insert_record(Table::Likes, like).await.is_err());
        assert_eq!(mock.records(Table::News)[0]["likes_count"], 1);

        let found = mock
            .find_record(
                Table::Likes,
                &Filter::all().eq("user_id", UserId::stub()),
            )
            .await
            .unwrap()
            .unwrap();
        let id = found["id"].as_str().unwrap().parse::<Uuid>().unwrap();
        mock.delete_record(Table::Likes, id).await.unwrap();
        assert_eq!(mock.records(Table::News)[0]["likes_count"], 0);
        assert_eq!(mock.mutation_count(), 3);
    }

    #[tokio::test]
    async fn failures_only_hit_the_chosen_table() {
        let mock = MockServer::new();
        mock.set_failing(Table::Likes, true);
        assert!(mock.insert_record(Table::Likes, json!({})).await.is_err());
        assert!(mock.insert_record(Table::Shares, json!({})).await.is_ok());
        assert!(mock
            .fetch_records(Table::Likes, &Filter::all())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn fetch_embeds_profiles_and_sorts() {
        let mock = MockServer::new();
        let user = mock
            .admin_create_user(
                "bob@example.com",
                "pw",
                SignUpMetadata {
                    username: Some(String::from("bob")),
                    avatar_url: None,
                },
            )
            .unwrap();
        for text in ["first", "second"] {
            mock.insert_record(
                Table::Comments,
                json!({ "content": text, "user_id": user.id, "news_id": Uuid::new_v4() }),
            )
            .await
            .unwrap();
        }
        let rows = mock
            .fetch_records(
                Table::Comments,
                &Filter::all()
                    .select("*,profile:profiles(username,avatar_url)")
                    .order_by("created_at", OrderType::Desc),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["content"], "second");
        assert_eq!(rows[1]["profile"]["username"], "bob");
    }
}
