//! Cross-process notifications through a watched file.
//!
//! A broadcaster replaces the signal file with two lines: the notification
//! name and a fresh token. Listeners watch the file's directory and post the
//! name to their [`NotificationCenter`] once per new token, so the several
//! filesystem events a single write produces count as one notification.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{NotificationCenter, NotificationName};

const DEFAULT_FILE_NAME: &str = "offcuts-cam.signal";

/// Location of a signal file shared by broadcasters and listeners.
#[derive(Debug, Clone)]
pub struct SignalFile {
    path: PathBuf,
}

impl Default for SignalFile {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl SignalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Signal file in the system temporary directory.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes `name` to every listener of this file.
    pub fn broadcast(&self, name: NotificationName) -> Result<()> {
        let parent = parent_dir(&self.path)?;
        fs::create_dir_all(&parent).with_context(|| format!("creating {}", parent.display()))?;

        let token = Uuid::new_v4();
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, format!("{}\n{}\n", name.as_str(), token))
            .with_context(|| format!("writing {}", staging.display()))?;
        fs::rename(&staging, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;

        info!("Broadcast '{}' via {}", name, self.path.display());
        Ok(())
    }

    /// Starts a listener thread that forwards new signals to `center`.
    ///
    /// A signal already present when listening starts is not replayed.
    pub fn listen(&self, center: NotificationCenter) -> Result<SignalListener> {
        let parent = parent_dir(&self.path)?;
        fs::create_dir_all(&parent).with_context(|| format!("creating {}", parent.display()))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| anyhow!("signal path {} has no file name", self.path.display()))?
            .to_os_string();

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())
            .context("creating signal file watcher")?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {}", parent.display()))?;

        let mut reader = SignalReader {
            path: self.path.clone(),
            last_token: None,
        };
        reader.last_token = reader.read().map(|signal| signal.token);

        let handle = thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || reader.run(rx, &file_name, &center))
            .context("spawning signal listener thread")?;

        info!("Listening for notifications on {}", self.path.display());
        Ok(SignalListener {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }
}

fn parent_dir(path: &Path) -> Result<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        Some(_) => Ok(PathBuf::from(".")),
        None => Err(anyhow!("signal path {} has no parent directory", path.display())),
    }
}

/// One signal as stored in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signal {
    name: String,
    token: String,
}

fn parse_signal(contents: &str) -> Option<Signal> {
    let mut lines = contents.lines();
    let name = lines.next()?.to_string();
    let token = lines.next()?.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(Signal { name, token })
}

struct SignalReader {
    path: PathBuf,
    last_token: Option<String>,
}

impl SignalReader {
    fn read(&self) -> Option<Signal> {
        let contents = fs::read_to_string(&self.path).ok()?;
        parse_signal(&contents)
    }

    fn run(&mut self, rx: Receiver<notify::Result<Event>>, file_name: &std::ffi::OsStr, center: &NotificationCenter) {
        // Ends when the watcher, and with it the sender, is dropped.
        for res in rx {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Signal file watch error: {}", e);
                    continue;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            if !event.paths.iter().any(|p| p.file_name() == Some(file_name)) {
                continue;
            }

            let Some(signal) = self.read() else {
                continue;
            };
            if self.last_token.as_deref() == Some(signal.token.as_str()) {
                continue;
            }
            debug!("Received signal '{}' ({})", signal.name, signal.token);
            self.last_token = Some(signal.token);
            center.post_named(&signal.name);
        }
        debug!("Signal listener stopped");
    }
}

/// A running signal file listener. Dropping it stops the listener thread.
pub struct SignalListener {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        drop(self.watcher.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Signal listener thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_parse_signal() {
        let signal = parse_signal("change active image\nabc\n").unwrap();
        assert_eq!(signal.name, "change active image");
        assert_eq!(signal.token, "abc");

        assert!(parse_signal("").is_none());
        assert!(parse_signal("change active image\n").is_none());
    }

    #[test]
    fn test_broadcast_writes_name_and_token() {
        let dir = tempfile::tempdir().unwrap();
        let file = SignalFile::new(dir.path().join("cam.signal"));

        file.broadcast(NotificationName::ChangeImage).unwrap();
        let first = parse_signal(&fs::read_to_string(file.path()).unwrap()).unwrap();
        file.broadcast(NotificationName::ChangeImage).unwrap();
        let second = parse_signal(&fs::read_to_string(file.path()).unwrap()).unwrap();

        assert_eq!(first.name, "change active image");
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_listener_posts_each_broadcast_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = SignalFile::new(dir.path().join("cam.signal"));
        let center = NotificationCenter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let _sub = center.add_observer(Uuid::new_v4(), NotificationName::ChangeImage, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let listener = file.listen(center.clone()).unwrap();
        file.broadcast(NotificationName::ChangeImage).unwrap();
        assert!(wait_for(&count, 1), "first broadcast never arrived");

        file.broadcast(NotificationName::ChangeImage).unwrap();
        assert!(wait_for(&count, 2), "second broadcast never arrived");

        thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop(listener);
    }

    #[test]
    fn test_existing_signal_is_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let file = SignalFile::new(dir.path().join("cam.signal"));
        file.broadcast(NotificationName::ChangeImage).unwrap();

        let center = NotificationCenter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let _sub = center.add_observer(Uuid::new_v4(), NotificationName::ChangeImage, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let _listener = file.listen(center).unwrap();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
