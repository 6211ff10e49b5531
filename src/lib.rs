//! Audio Relay - A small HTTP service that turns a YouTube link into an MP3 download
//!
//! This library validates the incoming link, runs yt-dlp against it under a deadline,
//! streams the produced file back to the client and removes the temporary artifact
//! no matter how the response ends.

pub mod cli;
pub mod config;
pub mod download;
pub mod extractors;
pub mod server;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use download::{CleanupToken, DownloadService, PreparedDownload};
pub use extractors::{AudioExtractor, ExtractionOptions};

/// Result type used for application plumbing
pub type Result<T> = anyhow::Result<T>;

/// Failures of a single download, from validation through streaming
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("Invalid or missing YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Extraction blocked by a copyright claim: {0}")]
    CopyrightBlocked(String),

    #[error("Video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Extraction produced an empty file")]
    EmptyArtifact,

    #[error("Failed to stream audio file: {0}")]
    StreamError(#[source] std::io::Error),

    #[error("Extraction failed: {0}")]
    Unknown(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}
