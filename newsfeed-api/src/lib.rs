use anyhow::Context;
use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

/// Untyped row as returned by the hosted backend
pub type Record = serde_json::Value;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
pub use auth::{AuthService, Credentials, SignUpMetadata, User};

mod comment;
pub use comment::{Comment, CommentId, CommentPatch, CommentProfile, NewComment};

mod db;
pub use db::{DataService, Table};

mod error;
pub use error::Error;

mod filter;
pub use filter::{Condition, Filter, Order, OrderType};

mod interaction;
pub use interaction::{
    InteractionKind, InteractionRecord, NewInteraction, NewShare, Share, Toggled,
};

mod news;
pub use news::{CategoryFilter, News, NewsCategory, NewsId, NewsTag};

mod user;
pub use user::{Profile, ProfilePatch, UserId};

pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

/// Narrows a record received from `table` into its typed form
pub fn decode<T>(table: Table, record: Record) -> anyhow::Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    serde_json::from_value(record)
        .with_context(|| format!("decoding record from table {}", table.name()))
}

/// Serializes a typed payload for submission to `table`
pub fn encode<T: serde::Serialize>(table: Table, payload: &T) -> anyhow::Result<Record> {
    serde_json::to_value(payload)
        .with_context(|| format!("encoding payload for table {}", table.name()))
}
