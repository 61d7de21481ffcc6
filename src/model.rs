use std::fmt;

use crate::error::ValidationError;

/// Links must start with this to be accepted.
pub const LINK_PREFIX: &str = "https://open.spotify.com";

/// What the user asked for: one link, one destination folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Spotify track/album/playlist link
    pub link: String,
    /// Destination folder passed to spotdl's `--output`
    pub folder: String,
}

impl DownloadRequest {
    /// Trims both inputs and checks them. Nothing is spawned on failure.
    pub fn new(link: &str, folder: &str) -> Result<Self, ValidationError> {
        let link = link.trim();
        let folder = folder.trim();

        if !link.starts_with(LINK_PREFIX) {
            return Err(ValidationError::InvalidLink);
        }
        if folder.is_empty() {
            return Err(ValidationError::MissingFolder);
        }

        Ok(Self {
            link: link.to_owned(),
            folder: folder.to_owned(),
        })
    }
}

/// How a download attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// spotdl exited with code 0
    Completed,
    /// spotdl ran but exited with a failure code (None when killed by a signal)
    Failed(Option<i32>),
    /// The user cancelled; the process tree was killed
    Cancelled,
    /// The executable could not be located
    NotFound(String),
    /// Anything else that went wrong while configuring or streaming
    Errored(String),
}

/// Represents the current state of the (single) download
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    /// Nothing has run yet
    #[default]
    Idle,
    /// spotdl is running
    Running,
    /// The last attempt finished
    Finished(Outcome),
}

impl DownloadStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, DownloadStatus::Running)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Idle => Ok(()),
            DownloadStatus::Running => f.write_str("Downloading..."),
            DownloadStatus::Finished(Outcome::Completed) => f.write_str("Download completed."),
            DownloadStatus::Finished(Outcome::Failed(Some(code))) => {
                write!(f, "Download failed. (exit code {code})")
            }
            DownloadStatus::Finished(Outcome::Failed(None)) => f.write_str("Download failed."),
            DownloadStatus::Finished(Outcome::Cancelled) => f.write_str("Download cancelled."),
            DownloadStatus::Finished(Outcome::NotFound(_)) => f.write_str("spotdl not found."),
            DownloadStatus::Finished(Outcome::Errored(_)) => f.write_str("Download error."),
        }
    }
}

/// Messages sent from the download worker to the UI thread, in order.
/// `Finished` is always the last one for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// One raw output line, newline included
    Line(String),
    Finished(Outcome),
}
