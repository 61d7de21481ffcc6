use thiserror::Error;

/// Input problems caught before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid Spotify link.")]
    InvalidLink,

    #[error("Select a download folder.")]
    MissingFolder,
}

impl ValidationError {
    /// Title used for the modal notice.
    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::InvalidLink => "Invalid link",
            ValidationError::MissingFolder => "Missing folder",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A download is already running.")]
    AlreadyRunning,

    #[error("spotdl executable not found: {0}")]
    ToolNotFound(String),

    #[error("spotdl exited with code {}", .0.map(|c| c.to_string()).unwrap_or_else(|| "<signal>".to_string()))]
    NonZeroExit(Option<i32>),

    #[error("CLIENT_ID or CLIENT_SECRET missing from the environment and .env")]
    MissingCredentials,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Process(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
