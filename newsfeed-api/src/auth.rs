use async_trait::async_trait;
use tokio::sync::watch;

use crate::{Error, UserId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

impl User {
    /// Part of the email before the `@`, used when no username is set
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.email)?;
        crate::validate_string(&self.password)?;
        if !self.email.contains('@') {
            return Err(Error::InvalidInput(format!(
                "{:?} is not an email address",
                self.email
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SignUpMetadata {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Session management offered by the hosted backend
///
/// Sign-in and sign-out are announced through [`AuthService::subscribe`];
/// consumers react to the channel rather than polling `current_user`.
#[async_trait]
pub trait AuthService: Send + Sync {
    fn current_user(&self) -> Option<User>;

    fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>>;

    async fn sign_in(&self, credentials: Credentials) -> Result<User, Error>;
    async fn sign_up(&self, credentials: Credentials, metadata: SignUpMetadata)
        -> Result<(), Error>;
    async fn sign_out(&self) -> Result<(), Error>;
}
