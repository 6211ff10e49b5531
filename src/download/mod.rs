//! Download lifecycle: validate, allocate, extract under a deadline, hand the
//! artifact to the streamer, and make sure it is removed afterwards.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod cleanup;
pub mod reaper;
pub mod stream;

pub use cleanup::{CleanupGuard, CleanupOutcome, CleanupToken};
pub use reaper::{spawn_reaper, sweep, SweepReport};
pub use stream::{artifact_response, ArtifactStream};

use crate::extractors::{validate_url, AudioExtractor, ExtractionOptions, AUDIO_FORMAT};
use crate::utils::{format_duration, format_file_size};
use crate::DownloadError;

/// A reserved, not yet created, artifact path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedPath {
    pub path: PathBuf,

    /// Milliseconds since the epoch at allocation
    pub timestamp: i64,
}

/// Reserve a unique artifact path in `dir`.
///
/// The name combines a millisecond timestamp with a random token. The file is
/// not created here; yt-dlp creates it.
pub fn allocate_output_path(dir: &Path) -> AllocatedPath {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let token = uuid::Uuid::new_v4().simple().to_string();
    let filename = format!("audio_{}_{}.{}", timestamp, &token[..8], AUDIO_FORMAT);

    AllocatedPath {
        path: dir.join(filename),
        timestamp,
    }
}

/// One extraction: a source link and the single artifact path it owns
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub source_url: String,
    pub output_path: PathBuf,
    pub options: ExtractionOptions,
    pub deadline: Duration,
    pub timestamp: i64,
}

/// A verified, non-empty artifact ready to stream
#[derive(Debug)]
pub struct PreparedDownload {
    pub path: PathBuf,
    pub size: u64,

    /// Filename offered to the client
    pub download_name: String,

    pub cleanup: CleanupToken,
}

/// Turns links into audio artifacts on local storage
pub struct DownloadService {
    downloads_dir: PathBuf,
    extractor: Arc<dyn AudioExtractor>,
    options: ExtractionOptions,
    deadline: Duration,
}

impl DownloadService {
    pub fn new(
        downloads_dir: impl Into<PathBuf>,
        extractor: Arc<dyn AudioExtractor>,
        options: ExtractionOptions,
        deadline: Duration,
    ) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            extractor,
            options,
            deadline,
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn extractor(&self) -> &dyn AudioExtractor {
        self.extractor.as_ref()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Validate the link and build a job for it. Nothing touches disk yet.
    pub fn plan(&self, raw_url: Option<&str>) -> Result<ExtractionJob, DownloadError> {
        let url = match raw_url.map(str::trim) {
            Some(url) if validate_url(url) => url,
            other => {
                return Err(DownloadError::InvalidUrl(
                    other.unwrap_or_default().to_string(),
                ))
            }
        };

        let allocated = allocate_output_path(&self.downloads_dir);
        Ok(ExtractionJob {
            source_url: url.to_string(),
            output_path: allocated.path,
            options: self.options.clone(),
            deadline: self.deadline,
            timestamp: allocated.timestamp,
        })
    }

    /// Run the whole extraction half of a request.
    ///
    /// On any failure the partial artifact is removed before the error returns,
    /// and dropping the returned future early removes it as well.
    pub async fn prepare(&self, raw_url: Option<&str>) -> Result<PreparedDownload, DownloadError> {
        let job = self.plan(raw_url)?;
        let guard = CleanupGuard::new(CleanupToken::arm(&job.output_path));

        match self.run(&job).await {
            Ok(size) => Ok(PreparedDownload {
                download_name: format!("youtube_audio_{}.{}", job.timestamp, AUDIO_FORMAT),
                path: job.output_path,
                size,
                cleanup: guard.release(),
            }),
            Err(e) => {
                if guard.fire() == CleanupOutcome::Removed {
                    tracing::info!("Cleaned up partial file after error");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job: &ExtractionJob) -> Result<u64, DownloadError> {
        tracing::info!(
            url = %job.source_url,
            extractor = self.extractor.name(),
            "Starting download process"
        );
        let started = Instant::now();

        // Whichever settles first wins. Losing the race drops the extraction
        // future; the child is killed best-effort and not waited for.
        tokio::select! {
            result = self.extractor.extract(&job.source_url, &job.output_path, &job.options) => result?,
            _ = tokio::time::sleep(job.deadline) => {
                tracing::warn!(url = %job.source_url, deadline = ?job.deadline, "Download timed out");
                return Err(DownloadError::Timeout(job.deadline));
            }
        }

        let size = match tokio::fs::metadata(&job.output_path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(DownloadError::Io(e)),
        };
        if size == 0 {
            return Err(DownloadError::EmptyArtifact);
        }

        tracing::info!(
            elapsed = %format_duration(started.elapsed().as_secs_f64()),
            size = %format_file_size(size),
            "Download completed successfully"
        );
        Ok(size)
    }
}
