use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Counts from one pass over the downloads directory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Remove every file in `dir` last modified more than `retention` ago.
///
/// A file that cannot be inspected or removed is logged and skipped; only
/// failing to list the directory itself is an error.
pub async fn sweep(dir: &Path, retention: Duration) -> std::io::Result<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                // the listing cannot be resumed past a failed read
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to read directory entry during cleanup");
                report.failed += 1;
                break;
            }
        };
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat file during cleanup");
                report.failed += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        report.scanned += 1;

        let age = match metadata.modified().map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            // modified in the future or unsupported: leave it alone
            _ => continue,
        };
        if age <= retention {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                report.removed += 1;
                tracing::info!(file = %entry.file_name().to_string_lossy(), "Cleaned up old file");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                report.failed += 1;
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove old file");
            }
        }
    }

    Ok(report)
}

/// Run [`sweep`] every `every`, starting one period from now
pub fn spawn_reaper(dir: PathBuf, every: Duration, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep(&dir, retention).await {
                Ok(report) => tracing::debug!(?report, "Periodic cleanup finished"),
                Err(e) => tracing::warn!(error = %e, "Periodic cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn write_aged(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        fs_err::write(&path, b"audio").unwrap();
        let mtime = FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(&path, mtime).unwrap();
        path
    }

    #[tokio::test]
    async fn test_only_expired_files_are_removed() {
        let dir = TempDir::new().unwrap();
        let fresh = write_aged(dir.path(), "fresh.mp3", Duration::from_secs(10 * 60));
        let stale = write_aged(dir.path(), "stale.mp3", Duration::from_secs(2 * 60 * 60));

        let report = sweep(dir.path(), Duration::from_secs(60 * 60)).await.unwrap();

        assert!(fresh.exists());
        assert!(!stale.exists());
        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_directories_are_skipped() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs_err::create_dir(&nested).unwrap();
        filetime::set_file_mtime(
            &nested,
            FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3 * 60 * 60)),
        )
        .unwrap();

        let report = sweep(dir.path(), Duration::from_secs(60 * 60)).await.unwrap();

        assert!(nested.exists());
        assert_eq!(report.scanned, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_removal_failure_is_counted_and_sweep_continues() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_aged(dir.path(), "locked.mp3", Duration::from_secs(2 * 60 * 60));
        write_aged(dir.path(), "stale.mp3", Duration::from_secs(2 * 60 * 60));
        fs_err::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        // permission bits are not enforced for privileged users
        if fs_err::write(dir.path().join("write-check"), b"").is_ok() {
            fs_err::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = sweep(dir.path(), Duration::from_secs(60 * 60)).await.unwrap();
        fs_err::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 0,
                failed: 2
            }
        );
        assert!(dir.path().join("locked.mp3").exists());
        assert!(dir.path().join("stale.mp3").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_sweep() {
        let dir = TempDir::new().unwrap();
        let report = sweep(&dir.path().join("absent"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_reaper_runs_on_interval() {
        let dir = TempDir::new().unwrap();
        let stale = write_aged(dir.path(), "stale.mp3", Duration::from_secs(2 * 60 * 60));
        let fresh = write_aged(dir.path(), "fresh.mp3", Duration::ZERO);

        let handle = spawn_reaper(
            dir.path().to_path_buf(),
            Duration::from_millis(50),
            Duration::from_secs(60 * 60),
        );

        for _ in 0..100 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
