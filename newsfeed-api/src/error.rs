#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Record not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    /// Interprets an error response from the hosted backend, whose body
    /// carries a human-readable message under one of a few keys
    pub fn from_backend(status: http::StatusCode, body: &[u8]) -> Error {
        use http::StatusCode;
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|data| {
                ["message", "msg", "error_description", "error"]
                    .iter()
                    .find_map(|k| data.get(*k).and_then(|m| m.as_str()).map(String::from))
            })
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::PermissionDenied,
            StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => Error::NotFound,
            StatusCode::CONFLICT => Error::Conflict(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Error::InvalidInput(message)
            }
            _ => Error::Unknown(message),
        }
    }
}
