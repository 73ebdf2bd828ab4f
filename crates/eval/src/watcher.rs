//! Watches the IDS log directory and reports files the rules care about.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;

/// Default IDS log directory.
pub const DEFAULT_IDS_DIR: &str = "/var/log/snort";

/// Files in the IDS directory whose changes are reported.
pub const DEFAULT_IDS_PATTERN: &str = r"^.*/rips\.";

/// Stops watching when dropped.
pub struct IdsWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl IdsWatcher {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Paths in `event` that should be reported.
fn interesting<'e>(event: &'e Event, pattern: &'e Regex) -> impl Iterator<Item = &'e PathBuf> + 'e {
    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    event
        .paths
        .iter()
        .filter(move |p| relevant && pattern.is_match(&p.to_string_lossy()))
}

/// Watch `dir` recursively, sending changed files matching `pattern` to
/// `tx`. Paths are dropped, with a warning, while the channel is full.
pub fn watch(dir: &Path, pattern: Regex, tx: mpsc::Sender<PathBuf>) -> Result<IdsWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in interesting(&event, &pattern) {
                    if let Err(e) = tx.try_send(path.clone()) {
                        tracing::warn!(path = %path.display(), error = %e, "ids path dropped");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch error"),
        },
        notify::Config::default(),
    )?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    tracing::info!(dir = %dir.display(), "watching ids logs");
    Ok(IdsWatcher {
        _watcher: watcher,
        dir: dir.to_path_buf(),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::time::Duration;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_matching_writes_are_reported() {
        let re = Regex::new(DEFAULT_IDS_PATTERN).unwrap();
        let created = event(EventKind::Create(CreateKind::File), "/var/log/snort/rips.alert");
        assert_eq!(interesting(&created, &re).count(), 1);
        let modified = event(EventKind::Modify(ModifyKind::Any), "/var/log/snort/eth0/rips.log");
        assert_eq!(interesting(&modified, &re).count(), 1);
        let other = event(EventKind::Modify(ModifyKind::Any), "/var/log/snort/alert");
        assert_eq!(interesting(&other, &re).count(), 0);
        let removed = event(EventKind::Remove(RemoveKind::File), "/var/log/snort/rips.alert");
        assert_eq!(interesting(&removed, &re).count(), 0);
    }

    #[tokio::test]
    async fn reports_files_written_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let watcher = watch(dir.path(), Regex::new(DEFAULT_IDS_PATTERN).unwrap(), tx).unwrap();
        assert_eq!(watcher.dir(), dir.path());

        std::fs::write(dir.path().join("ignored.log"), "x").unwrap();
        std::fs::write(dir.path().join("rips.alert"), "Portscan\n").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no watch event")
            .unwrap();
        assert!(got.ends_with("rips.alert"), "{}", got.display());
    }
}
