//! Debounced file system observation.
//!
//! A [`DebouncedWatcher`] owns one notify watcher on a directory (or on the
//! parent of a single file), an event loop task, and a [`Debouncer`] holding
//! at most one pending timer per grouping key.
//!
//! ```text
//! notify thread ──try_send──▶ event loop ──key_of──▶ Debouncer ──sleep──▶ on_change
//!                             (tokio task)           (DashMap)            (blocking pool)
//! ```
//!
//! The first event for a key wins: later events for a key that is already
//! pending are dropped, and the callback receives the path captured when the
//! timer was created. The key is released before the callback runs, so an
//! event arriving during or after the callback schedules a fresh update.

use std::fmt::Debug;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::PresenceError;

/// Capacity of the channel between the notify thread and the event loop.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Bounds for a grouping key.
pub trait DebounceKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> DebounceKey for T {}

/// Callback invoked once per debounce window with the first captured path.
pub type ChangeHandler = Arc<dyn Fn(&Path) -> anyhow::Result<()> + Send + Sync>;

/// Keyed one-shot timers with first-event-wins semantics.
pub struct Debouncer<K: DebounceKey> {
    delay: Duration,
    on_change: ChangeHandler,
    pending: Arc<DashMap<K, JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<K: DebounceKey> Debouncer<K> {
    pub fn new(delay: Duration, on_change: ChangeHandler) -> Self {
        Self {
            delay,
            on_change,
            pending: Arc::new(DashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Schedule `on_change(path)` after the delay unless `key` is already
    /// pending. Returns whether a new timer was created.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, key: K, path: PathBuf) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let pending = self.pending.clone();
                let on_change = self.on_change.clone();
                let delay = self.delay;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    pending.remove(&key);
                    fire(on_change, key, path).await;
                });
                slot.insert(handle);
                true
            }
        }
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Abort every pending timer without running its callback. Idempotent;
    /// callbacks that already started run to completion.
    pub fn cancel_all(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

async fn fire<K: DebounceKey>(on_change: ChangeHandler, key: K, path: PathBuf) {
    debug!(?key, path = %path.display(), "Debounced update firing");
    let path_for_log = path.clone();
    match tokio::task::spawn_blocking(move || on_change(&path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(?key, path = %path_for_log.display(), error = %e, "Change handler failed");
        }
        Err(e) => {
            error!(?key, path = %path_for_log.display(), "Change handler panicked: {}", e);
        }
    }
}

/// A notify watcher whose events are coalesced per key by a [`Debouncer`].
pub struct DebouncedWatcher<K: DebounceKey> {
    target: PathBuf,
    debouncer: Arc<Debouncer<K>>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<K: DebounceKey> DebouncedWatcher<K> {
    /// Watch the direct children of `dir`. Events whose path maps to `None`
    /// under `key_of` are ignored.
    ///
    /// Must be called from within a tokio runtime.
    pub fn observe_directory<G, F>(
        dir: &Path,
        delay: Duration,
        key_of: G,
        on_change: F,
    ) -> Result<Self, PresenceError>
    where
        G: Fn(&Path) -> Option<K> + Send + Sync + 'static,
        F: Fn(&Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        Self::observe(dir.clone(), dir, key_of, Arc::new(on_change), delay)
    }

    fn observe<G>(
        target: PathBuf,
        watch_path: PathBuf,
        key_of: G,
        on_change: ChangeHandler,
        delay: Duration,
    ) -> Result<Self, PresenceError>
    where
        G: Fn(&Path) -> Option<K> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(EVENT_CHANNEL_CAPACITY);
        let dropped_events = Arc::new(AtomicU64::new(0));
        let dropped_counter = dropped_events.clone();
        let target_for_log = target.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(res) {
                let count = dropped_counter.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % 100 == 0 {
                    warn!(
                        path = %target_for_log.display(),
                        dropped_total = count,
                        "Watcher channel full, event dropped"
                    );
                }
            }
        })
        .map_err(|source| PresenceError::Watch {
            path: watch_path.clone(),
            source,
        })?;

        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|source| PresenceError::Watch {
                path: watch_path.clone(),
                source,
            })?;

        let debouncer = Arc::new(Debouncer::new(delay, on_change));
        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        let event_loop = tokio::spawn(run_event_loop(
            target.clone(),
            rx,
            key_of,
            debouncer.clone(),
            cancel.clone(),
            closed.clone(),
        ));

        debug!(path = %target.display(), delay_ms = delay.as_millis() as u64, "Watching for changes");

        Ok(Self {
            target,
            debouncer,
            cancel,
            closed,
            dropped_events,
            watcher: Mutex::new(Some(watcher)),
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Number of keys with a timer waiting to fire.
    pub fn pending(&self) -> usize {
        self.debouncer.pending()
    }

    /// Events lost because the event loop fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop watching: the event loop exits, pending timers are aborted without
    /// firing, and the OS watch handle is released. Safe to call repeatedly.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.debouncer.cancel_all();
        if let Some(handle) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(path = %self.target.display(), "Watcher closed");
    }
}

impl DebouncedWatcher<()> {
    /// Watch a single file. Its parent directory is observed and events are
    /// filtered by file name, so the file may be replaced atomically.
    ///
    /// Must be called from within a tokio runtime.
    pub fn observe_file<F>(file: &Path, delay: Duration, on_change: F) -> Result<Self, PresenceError>
    where
        F: Fn(&Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let file = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        let (parent, name) = match (file.parent(), file.file_name()) {
            (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_os_string()),
            _ => return Err(PresenceError::config(&file, "not a file path")),
        };
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent
        };
        let key_of = move |path: &Path| (path.file_name() == Some(name.as_os_str())).then_some(());
        Self::observe(file, parent, key_of, Arc::new(on_change), delay)
    }
}

impl<K: DebounceKey> Drop for DebouncedWatcher<K> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_event_loop<K, G>(
    target: PathBuf,
    mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
    key_of: G,
    debouncer: Arc<Debouncer<K>>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
) where
    K: DebounceKey,
    G: Fn(&Path) -> Option<K>,
{
    loop {
        let res = tokio::select! {
            _ = cancel.cancelled() => return,
            res = rx.recv() => res,
        };

        let event = match res {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                if !closed.load(Ordering::Acquire) {
                    warn!(path = %target.display(), error = %e, "Watcher stopped unexpectedly");
                }
                return;
            }
            None => {
                if !closed.load(Ordering::Acquire) {
                    warn!(path = %target.display(), "Watcher stopped unexpectedly: event source closed");
                }
                return;
            }
        };

        if event.need_rescan() {
            debug!(path = %target.display(), "Ignoring overflow notification");
            continue;
        }
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            continue;
        }

        for path in event.paths {
            let Some(key) = key_of(&path) else {
                continue;
            };
            if debouncer.schedule(key.clone(), path.clone()) {
                debug!(?key, path = %path.display(), "Scheduled debounced update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn channel_handler() -> (ChangeHandler, mpsc::UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: ChangeHandler = Arc::new(move |path: &Path| -> anyhow::Result<()> {
            let _ = tx.send(path.to_path_buf());
            Ok(())
        });
        (handler, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_wins_within_window() {
        let (handler, mut rx) = channel_handler();
        let debouncer = Debouncer::new(Duration::from_secs(30), handler);

        assert!(debouncer.schedule("a", PathBuf::from("/d/first.dat")));
        assert!(!debouncer.schedule("a", PathBuf::from("/d/second.dat")));
        assert!(!debouncer.schedule("a", PathBuf::from("/d/third.dat")));
        assert_eq!(debouncer.pending(), 1);

        assert_eq!(rx.recv().await, Some(PathBuf::from("/d/first.dat")));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_fire_independently() {
        let (handler, mut rx) = channel_handler();
        let debouncer = Debouncer::new(Duration::from_secs(1), handler);

        assert!(debouncer.schedule(1, PathBuf::from("/d/one")));
        assert!(debouncer.schedule(2, PathBuf::from("/d/two")));

        let mut fired = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        fired.sort();
        assert_eq!(fired, vec![PathBuf::from("/d/one"), PathBuf::from("/d/two")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_releases_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: ChangeHandler = Arc::new(move |_: &Path| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("decode failed")
        });
        let debouncer = Debouncer::new(Duration::from_millis(100), handler);

        assert!(debouncer.schedule("k", PathBuf::from("/d/x")));
        tokio::time::sleep(Duration::from_secs(1)).await;
        while debouncer.pending() > 0 || calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(debouncer.schedule("k", PathBuf::from("/d/x")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending_callbacks() {
        let (handler, mut rx) = channel_handler();
        let debouncer = Debouncer::new(Duration::from_secs(10), handler);

        assert!(debouncer.schedule("a", PathBuf::from("/d/a")));
        debouncer.cancel_all();
        debouncer.cancel_all();
        assert_eq!(debouncer.pending(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        assert!(!debouncer.schedule("b", PathBuf::from("/d/b")));
    }

    #[tokio::test]
    async fn test_directory_burst_collapses_to_one_callback() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DebouncedWatcher::observe_directory(
            dir.path(),
            Duration::from_millis(300),
            |path: &Path| {
                let name = path.file_name()?.to_str()?;
                name.strip_suffix(".dat").map(str::to_string)
            },
            move |path: &Path| {
                let _ = tx.send(path.to_path_buf());
                Ok(())
            },
        )
        .unwrap();

        let file = dir.path().join("alice.dat");
        std::fs::write(&file, b"one").unwrap();
        std::fs::write(&file, b"two").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), b"x").unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.file_name(), file.file_name());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(rx.try_recv().is_err());
        watcher.close();
    }

    #[tokio::test]
    async fn test_single_file_target_ignores_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("usercache.json");
        std::fs::write(&file, b"[]").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DebouncedWatcher::observe_file(&file, Duration::from_millis(200), move |path: &Path| {
            let _ = tx.send(path.to_path_buf());
            Ok(())
        })
        .unwrap();

        std::fs::write(dir.path().join("other.json"), b"{}").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&file, b"[ ]").unwrap();
        let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.file_name(), file.file_name());
        watcher.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_cancels_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DebouncedWatcher::observe_directory(
            dir.path(),
            Duration::from_millis(500),
            |_: &Path| Some(()),
            move |path: &Path| {
                let _ = tx.send(path.to_path_buf());
                Ok(())
            },
        )
        .unwrap();

        std::fs::write(dir.path().join("a.dat"), b"x").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while watcher.pending() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(watcher.pending(), 1);

        watcher.close();
        watcher.close();
        assert!(watcher.is_closed());
        assert_eq!(watcher.pending(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_watch_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DebouncedWatcher::observe_directory(
            &dir.path().join("absent"),
            Duration::from_millis(10),
            |_: &Path| Some(()),
            |_: &Path| Ok(()),
        );
        assert!(matches!(result, Err(PresenceError::Watch { .. })));
    }
}
