use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a call to [`CleanupToken::fire`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// This call removed the file
    Removed,
    /// This call won, but the file was not there
    AlreadyGone,
    /// This call won, but removal failed; the reaper will retry later
    Failed,
    /// An earlier call already ran the cleanup
    AlreadyFired,
}

impl CleanupOutcome {
    /// Whether this call was the one that performed the cleanup attempt
    pub fn won(self) -> bool {
        !matches!(self, CleanupOutcome::AlreadyFired)
    }
}

/// One-shot removal of a temporary artifact.
///
/// Clones share the same flag, so whichever holder fires first performs the
/// single delete attempt and every later call is a no-op.
#[derive(Debug, Clone)]
pub struct CleanupToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    fired: AtomicBool,
}

impl CleanupToken {
    /// Arm cleanup for `path`
    pub fn arm(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                fired: AtomicBool::new(false),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Remove the file, and any `<stem>.*` sibling yt-dlp left behind
    /// (`.webm.part`, `.ytdl`, pre-conversion media), if no other holder has
    /// done so yet.
    ///
    /// Synchronous so it can run from `Drop`. Errors are logged, never returned.
    pub fn fire(&self) -> CleanupOutcome {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CleanupOutcome::AlreadyFired;
        }

        let main = remove(&self.inner.path);
        let siblings = self.remove_siblings();

        match main {
            CleanupOutcome::AlreadyGone if siblings > 0 => CleanupOutcome::Removed,
            outcome => outcome,
        }
    }

    fn remove_siblings(&self) -> usize {
        let path = &self.inner.path;
        let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
            return 0;
        };
        let prefix = format!("{}.", stem.to_string_lossy());

        let entries = match fs_err::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "Error listing partial files");
                return 0;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .filter(|entry| remove(&entry.path()) == CleanupOutcome::Removed)
            .count()
    }
}

fn remove(path: &Path) -> CleanupOutcome {
    match fs_err::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Temporary file removed");
            CleanupOutcome::Removed
        }
        Err(e) if e.kind() == ErrorKind::NotFound => CleanupOutcome::AlreadyGone,
        Err(e) => {
            tracing::warn!(error = %e, "Error removing temporary file");
            CleanupOutcome::Failed
        }
    }
}

/// Fires its token when dropped unless released first.
///
/// Covers the window between arming and handing the artifact to the
/// streamer, including the request future being dropped mid-extraction.
#[derive(Debug)]
pub struct CleanupGuard {
    token: CleanupToken,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(token: CleanupToken) -> Self {
        Self { token, armed: true }
    }

    pub fn fire(&self) -> CleanupOutcome {
        self.token.fire()
    }

    /// Stop guarding and hand the token to the next owner
    pub fn release(mut self) -> CleanupToken {
        self.armed = false;
        self.token.clone()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.fire();
        }
    }
}
