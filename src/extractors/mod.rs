use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::Path;

pub mod youtube;

use crate::DownloadError;

/// Output container produced by every extraction
pub const AUDIO_FORMAT: &str = "mp3";

/// MIME type of [`AUDIO_FORMAT`]
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Watch links, short links and shorts, each carrying an 11 character video id.
static YOUTUBE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com/(watch\?v=|shorts/)|youtu\.be/)[A-Za-z0-9_-]{11}([?&].*)?$",
    )
    .expect("YouTube URL pattern is valid")
});

/// Check that the input looks like a YouTube video link.
///
/// Purely syntactic; nothing is fetched.
pub fn validate_url(url: &str) -> bool {
    !url.is_empty() && YOUTUBE_URL.is_match(url)
}

/// Options handed to the extraction tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Keep only the audio track
    pub extract_audio: bool,

    /// Target audio container
    pub audio_format: String,

    /// 0 (best) to 9 (worst)
    pub audio_quality: u8,

    pub no_warnings: bool,

    pub prefer_free_formats: bool,

    /// Skip TLS certificate validation
    pub no_check_certificate: bool,

    /// Verbose tool output, only with debug enabled
    pub verbose: bool,
}

impl ExtractionOptions {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Render the options as command line arguments for yt-dlp
    pub fn to_args(&self, url: &str, output_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        args.push("--output".into());
        args.push(output_template(output_path));

        if self.extract_audio {
            args.push("--extract-audio".into());
            args.push("--audio-format".into());
            args.push(self.audio_format.clone().into());
            args.push("--audio-quality".into());
            args.push(self.audio_quality.to_string().into());
        }
        if self.no_warnings {
            args.push("--no-warnings".into());
        }
        if self.prefer_free_formats {
            args.push("--prefer-free-formats".into());
        }
        if self.no_check_certificate {
            args.push("--no-check-certificates".into());
        }
        if self.verbose {
            args.push("--verbose".into());
        }

        args.push("--no-playlist".into());
        args.push(url.into());
        args
    }
}

/// yt-dlp names intermediate downloads after the template and converts into
/// `<stem>.<audio format>`, so the final file lands exactly on `output_path`.
fn output_template(output_path: &Path) -> OsString {
    output_path.with_extension("%(ext)s").into_os_string()
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            extract_audio: true,
            audio_format: AUDIO_FORMAT.to_string(),
            audio_quality: 0,
            no_warnings: true,
            prefer_free_formats: true,
            no_check_certificate: true,
            verbose: false,
        }
    }
}

/// Something that can turn a video link into an audio file on disk
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the audio for `url` to `output_path`.
    ///
    /// Failures come back already classified.
    async fn extract(
        &self,
        url: &str,
        output_path: &Path,
        options: &ExtractionOptions,
    ) -> Result<(), DownloadError>;

    /// Version string of the underlying tool, if it can be determined
    async fn version(&self) -> Option<String>;

    /// Get the name of this extractor
    fn name(&self) -> &'static str;
}

/// Substrings in the tool's error text, checked in order.
///
/// This is best-effort: yt-dlp reports failures as free text, so a change in
/// its wording moves an error into the `Unknown` bucket.
const FAILURE_PATTERNS: &[(&str, FailureKind)] = &[
    ("COPYRIGHT_CLAIM", FailureKind::CopyrightBlocked),
    ("copyright", FailureKind::CopyrightBlocked),
    ("Video unavailable", FailureKind::VideoUnavailable),
    ("Private video", FailureKind::VideoUnavailable),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    CopyrightBlocked,
    VideoUnavailable,
}

/// Map the tool's failure message to a download error
pub fn classify_failure(message: &str) -> DownloadError {
    let detail = summarize(message);
    match FAILURE_PATTERNS
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, kind)| *kind)
    {
        Some(FailureKind::CopyrightBlocked) => DownloadError::CopyrightBlocked(detail),
        Some(FailureKind::VideoUnavailable) => DownloadError::VideoUnavailable(detail),
        None => DownloadError::Unknown(detail),
    }
}

/// Last non-empty line of the tool output, which is where yt-dlp puts its ERROR line
fn summarize(message: &str) -> String {
    message
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_accepts_youtube_links() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/shorts/aBcD_eF-123",
        ] {
            assert!(validate_url(url), "expected {url} to be accepted");
        }
    }

    #[test]
    fn test_rejects_other_input() {
        for url in [
            "",
            "https://example.com/video",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQextra",
            "https://vimeo.com/123456789",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/playlist?list=PL1234567890",
            "https://youtu.be/dQw4w9WgXc!",
            " https://youtu.be/dQw4w9WgXcQ",
        ] {
            assert!(!validate_url(url), "expected {url:?} to be rejected");
        }
    }

    #[test]
    fn test_default_args() {
        let args = ExtractionOptions::default()
            .to_args("https://youtu.be/dQw4w9WgXcQ", &PathBuf::from("/tmp/a.mp3"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..2], ["--output", "/tmp/a.%(ext)s"]);
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--audio-quality", "0"]));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.contains(&"--verbose".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_verbose_only_when_requested() {
        let args = ExtractionOptions::new(true)
            .to_args("https://youtu.be/dQw4w9WgXcQ", &PathBuf::from("/tmp/a.mp3"));
        assert!(args.iter().any(|a| a == "--verbose"));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            DownloadError::VideoUnavailable(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Private video. Sign in"),
            DownloadError::VideoUnavailable(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: COPYRIGHT_CLAIM on this content"),
            DownloadError::CopyrightBlocked(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: unable to download webpage: timed out"),
            DownloadError::Unknown(_)
        ));
    }

    #[test]
    fn test_classify_keeps_last_line() {
        let err = classify_failure("[youtube] abc: Downloading webpage\nERROR: something broke\n\n");
        match err {
            DownloadError::Unknown(detail) => assert_eq!(detail, "ERROR: something broke"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
