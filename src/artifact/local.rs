//! Local capture directory helpers

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Object key for a capture uploaded on behalf of `project_id`
pub fn artifact_key(project_id: &str, taken_at: OffsetDateTime) -> String {
    let millis = taken_at.unix_timestamp_nanos() / 1_000_000;
    format!("screenshots/{}/{}.png", project_id, millis)
}

/// File name the relay asks the target to write for a command
pub fn capture_file_name(command_short_id: &str, taken_at: OffsetDateTime) -> String {
    format!("relay_{}_{}.png", command_short_id, taken_at.unix_timestamp())
}

/// Most recently modified regular file directly inside `dir`
pub async fn latest_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let candidate = (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), entry.path());
        if newest.as_ref().map_or(true, |best| candidate > *best) {
            newest = Some(candidate);
        }
    }

    newest.map(|(_, path)| path)
}

/// Wait until `path` exists with a non-zero size that holds across two checks
///
/// Returns false if that does not happen within `timeout`.
pub async fn wait_for_artifact(path: &Path, poll: Duration, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut last_size: Option<u64> = None;

    loop {
        let size = tokio::fs::metadata(path)
            .await
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len());

        match (last_size, size) {
            (Some(prev), Some(now)) if now > 0 && prev == now => return true,
            _ => last_size = size,
        }

        if Instant::now() >= deadline {
            debug!("Capture {} not stable after {:?}", path.display(), timeout);
            return false;
        }
        sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_artifact_key() {
        let ts = time::macros::datetime!(2024-05-01 12:00:00.250 UTC);
        assert_eq!(artifact_key("p1", ts), "screenshots/p1/1714564800250.png");
    }

    #[test]
    fn test_capture_file_name() {
        let ts = time::macros::datetime!(2024-05-01 12:00:00 UTC);
        assert_eq!(capture_file_name("c1", ts), "relay_c1_1714564800.png");
    }

    #[tokio::test]
    async fn test_latest_file_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.png");
        let new = dir.path().join("new.png");
        fs::write(&old, b"a").unwrap();
        fs::write(&new, b"b").unwrap();

        let past = SystemTime::now() - Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(latest_file(dir.path()).await, Some(new));
    }

    #[tokio::test]
    async fn test_latest_file_empty_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_file(dir.path()).await, None);
        assert_eq!(latest_file(&dir.path().join("missing")).await, None);
    }

    #[tokio::test]
    async fn test_wait_for_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, b"png-bytes").unwrap();

        assert!(wait_for_artifact(&path, Duration::from_millis(10), Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_wait_for_file_written_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.png");

        let writer_path = path.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let mut f = fs::File::create(&writer_path).unwrap();
            f.write_all(b"png-bytes").unwrap();
        });

        assert!(wait_for_artifact(&path, Duration::from_millis(10), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_times_out_on_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(!wait_for_artifact(&missing, Duration::from_millis(10), Duration::from_millis(50)).await);

        let empty = dir.path().join("empty.png");
        fs::write(&empty, b"").unwrap();
        assert!(!wait_for_artifact(&empty, Duration::from_millis(10), Duration::from_millis(50)).await);
    }
}
