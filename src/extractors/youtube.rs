use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{classify_failure, AudioExtractor, ExtractionOptions};
use crate::DownloadError;

/// YouTube audio extractor using yt-dlp
pub struct YtDlpExtractor {
    yt_dlp_path: String,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::with_path("yt-dlp")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.yt_dlp_path
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        self.version().await.is_some()
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        url: &str,
        output_path: &Path,
        options: &ExtractionOptions,
    ) -> Result<(), DownloadError> {
        let args = options.to_args(url, output_path);
        tracing::debug!(tool = %self.yt_dlp_path, ?args, "Executing yt-dlp");

        // Dropping this future (deadline hit) sends a kill; tokio reaps the
        // child in the background and nobody waits for it.
        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DownloadError::Unknown(format!("failed to launch {}: {}", self.yt_dlp_path, e)))?;

        if options.verbose {
            tracing::debug!(stdout = %String::from_utf8_lossy(&output.stdout), "yt-dlp output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(status = %output.status, stderr = %stderr.trim(), "yt-dlp failed");
            return Err(classify_failure(&stderr));
        }

        Ok(())
    }

    async fn version(&self) -> Option<String> {
        let output = Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let extractor = YtDlpExtractor::with_path("definitely-not-a-real-yt-dlp-binary");
        assert!(!extractor.check_availability().await);
        assert_eq!(extractor.version().await, None);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_extraction() {
        let dir = tempfile::TempDir::new().unwrap();
        let extractor = YtDlpExtractor::with_path("definitely-not-a-real-yt-dlp-binary");
        let result = extractor
            .extract(
                "https://youtu.be/dQw4w9WgXcQ",
                &dir.path().join("out.mp3"),
                &ExtractionOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(DownloadError::Unknown(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_output_is_classified() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-yt-dlp");
        fs_err::write(
            &script,
            "#!/bin/sh\necho 'ERROR: [youtube] dQw4w9WgXcQ: Video unavailable' >&2\nexit 1\n",
        )
        .unwrap();
        fs_err::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let extractor = YtDlpExtractor::with_path(script.to_string_lossy());
        let result = extractor
            .extract(
                "https://youtu.be/dQw4w9WgXcQ",
                &dir.path().join("out.mp3"),
                &ExtractionOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(DownloadError::VideoUnavailable(_))));
    }
}
