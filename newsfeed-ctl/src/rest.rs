use anyhow::{anyhow, Context};
use async_trait::async_trait;
use newsfeed_api::{
    AuthService, Credentials, DataService, Error, Filter, Record, SignUpMetadata, Table, User,
    Uuid,
};
use parking_lot::Mutex;
use reqwest::{header, Method};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::sync::watch;

const MAX_RETRIES: u32 = 3;

/// Hosted backend reached over its REST and auth HTTP endpoints
pub struct Rest {
    host: String,
    api_key: String,
    client: ClientWithMiddleware,

    /// Same as `client` without retries, for non-idempotent requests
    once: ClientWithMiddleware,
    token: Mutex<Option<String>>,
    session: watch::Sender<Option<User>>,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    user: User,
}

#[derive(serde::Serialize)]
struct SignUpRequest {
    email: String,
    password: String,
    data: SignUpMetadata,
}

fn id_filter(id: Uuid) -> Vec<(String, String)> {
    vec![(String::from("id"), format!("eq.{id}"))]
}

impl Rest {
    pub fn new(host: String, api_key: String) -> Rest {
        let policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let http = reqwest::Client::new();
        let client = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(policy))
            .build();
        let once = ClientBuilder::new(http).build();
        let (session, _) = watch::channel(None);
        Rest {
            host: host.trim_end_matches('/').to_string(),
            api_key,
            client,
            once,
            token: Mutex::new(None),
            session,
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.host, table.name())
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.host, endpoint)
    }

    fn client_for(&self, method: &Method) -> &ClientWithMiddleware {
        if method.is_idempotent() {
            &self.client
        } else {
            &self.once
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = self
            .token
            .lock()
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        self.client_for(&method)
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Sends `req` and returns the response body, turning error responses
    /// into [`Error`]s
    async fn send(&self, req: RequestBuilder) -> anyhow::Result<Vec<u8>> {
        let resp = req.send().await.context("sending request to backend")?;
        let status = resp.status();
        let body = resp.bytes().await.context("reading backend response")?;
        if !status.is_success() {
            tracing::debug!(%status, "backend returned an error");
            return Err(Error::from_backend(status, &body).into());
        }
        Ok(body.to_vec())
    }

    async fn send_json(&self, req: RequestBuilder, payload: &Record) -> anyhow::Result<Vec<u8>> {
        let body = serde_json::to_vec(payload).context("serializing request body")?;
        self.send(
            req.header(header::CONTENT_TYPE, "application/json")
                .body(body),
        )
        .await
    }

    async fn fetch(&self, table: Table, query: &[(String, String)]) -> anyhow::Result<Vec<Record>> {
        let req = self
            .request(Method::GET, self.table_url(table))
            .query(query);
        let body = self.send(req).await?;
        serde_json::from_slice(&body)
            .with_context(|| format!("parsing records of table {}", table.name()))
    }

    /// Maps failures of the auth endpoints to the wire error type
    fn auth_error(err: anyhow::Error) -> Error {
        match err.downcast::<Error>() {
            Ok(e) => e,
            Err(e) => Error::Unknown(format!("{e:#}")),
        }
    }
}

#[async_trait]
impl DataService for Rest {
    async fn fetch_records(&self, table: Table, filter: &Filter) -> anyhow::Result<Vec<Record>> {
        self.fetch(table, &filter.to_postgrest()).await
    }

    async fn fetch_record_by_id(&self, table: Table, id: Uuid) -> anyhow::Result<Option<Record>> {
        Ok(self.fetch(table, &id_filter(id)).await?.into_iter().next())
    }

    async fn insert_record(&self, table: Table, payload: Record) -> anyhow::Result<Record> {
        let req = self
            .request(Method::POST, self.table_url(table))
            .header("Prefer", "return=representation");
        let body = self.send_json(req, &payload).await?;
        let mut inserted: Vec<Record> = serde_json::from_slice(&body)
            .with_context(|| format!("parsing record inserted into {}", table.name()))?;
        match inserted.len() {
            1 => Ok(inserted.remove(0)),
            n => Err(anyhow!(
                "backend returned {n} records for one insert into {}",
                table.name()
            )),
        }
    }

    async fn update_record(&self, table: Table, id: Uuid, patch: Record) -> anyhow::Result<()> {
        let req = self
            .request(Method::PATCH, self.table_url(table))
            .query(&id_filter(id));
        self.send_json(req, &patch).await?;
        Ok(())
    }

    async fn delete_record(&self, table: Table, id: Uuid) -> anyhow::Result<()> {
        let req = self
            .request(Method::DELETE, self.table_url(table))
            .query(&id_filter(id));
        self.send(req).await?;
        Ok(())
    }

    async fn find_record(&self, table: Table, criteria: &Filter) -> anyhow::Result<Option<Record>> {
        let mut query = criteria.to_postgrest();
        query.push((String::from("limit"), String::from("1")));
        Ok(self.fetch(table, &query).await?.into_iter().next())
    }
}

#[async_trait]
impl AuthService for Rest {
    fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<User, Error> {
        credentials.validate()?;
        let req = self
            .request(Method::POST, self.auth_url("token"))
            .query(&[("grant_type", "password")]);
        let payload =
            serde_json::to_value(&credentials).map_err(|e| Error::Unknown(e.to_string()))?;
        let body = self
            .send_json(req, &payload)
            .await
            .map_err(Rest::auth_error)?;
        let resp: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Unknown(e.to_string()))?;
        *self.token.lock() = Some(resp.access_token);
        tracing::info!(user = %resp.user.id, "signed in");
        self.session.send_replace(Some(resp.user.clone()));
        Ok(resp.user)
    }

    async fn sign_up(
        &self,
        credentials: Credentials,
        metadata: SignUpMetadata,
    ) -> Result<(), Error> {
        credentials.validate()?;
        let payload = serde_json::to_value(SignUpRequest {
            email: credentials.email,
            password: credentials.password,
            data: metadata,
        })
        .map_err(|e| Error::Unknown(e.to_string()))?;
        let req = self.request(Method::POST, self.auth_url("signup"));
        self.send_json(req, &payload)
            .await
            .map_err(Rest::auth_error)?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), Error> {
        let req = self.request(Method::POST, self.auth_url("logout"));
        match self.send(req).await {
            Ok(_) => (),
            // the session is gone on the backend side already
            Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::PermissionDenied)) => (),
            Err(e) => return Err(Rest::auth_error(e)),
        }
        *self.token.lock() = None;
        self.session.send_replace(None);
        Ok(())
    }
}
