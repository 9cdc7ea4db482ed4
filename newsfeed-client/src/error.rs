use newsfeed_api::InteractionKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sign-in required")]
    Unauthenticated,

    #[error("remote mutation failed")]
    RemoteMutationFailed(#[source] anyhow::Error),

    #[error("failed to update {kind}")]
    InteractionFailed {
        kind: InteractionKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("a {kind} toggle is already in flight")]
    ToggleInFlight { kind: InteractionKind },

    #[error("record not found")]
    RecordNotFound,

    #[error("failed to fetch data")]
    FetchFailed(#[source] anyhow::Error),

    #[error("comment is empty")]
    EmptyComment,

    #[error("permission denied")]
    PermissionDenied,

    #[error("view was unmounted before the call completed")]
    ViewUnmounted,

    #[error("article is not loaded yet")]
    NotLoaded,

    #[error(transparent)]
    Api(#[from] newsfeed_api::Error),
}

impl Error {
    /// Whether the user should be prompted to sign in
    pub fn needs_sign_in(&self) -> bool {
        matches!(self, Error::Unauthenticated)
    }
}
