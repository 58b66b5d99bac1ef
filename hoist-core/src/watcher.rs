use crate::config::AgentConfig;
use crate::queue::UploadQueue;
use crate::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Continuous filesystem-event source: a `notify` watcher whose callback
/// forwards raw events into a channel, drained by a task that turns
/// create/write events on regular files into queue entries.
///
/// The watcher owns no file state; deciding whether a file actually needs
/// uploading is entirely the processor's job.
pub struct WatchService {
    watcher: RecommendedWatcher,
    events: Option<mpsc::UnboundedReceiver<Event>>,
    queue: Arc<UploadQueue>,
    config: Arc<AgentConfig>,
}

impl WatchService {
    pub fn new(queue: Arc<UploadQueue>, config: Arc<AgentConfig>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!("watch error: {e}"),
            },
            notify::Config::default(),
        )?;

        Ok(Self {
            watcher,
            events: Some(rx),
            queue,
            config,
        })
    }

    /// Register every configured root (recursively) and spawn the event
    /// loop. May be called once.
    pub fn start(&mut self) -> Result<()> {
        for watch in &self.config.watches {
            self.watcher
                .watch(&watch.local_path, RecursiveMode::Recursive)?;
            info!(path = %watch.local_path.display(), "watching");
        }

        if let Some(events) = self.events.take() {
            let queue = self.queue.clone();
            let config = self.config.clone();
            tokio::spawn(event_loop(events, queue, config));
        }
        Ok(())
    }
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<Event>,
    queue: Arc<UploadQueue>,
    config: Arc<AgentConfig>,
) {
    while let Some(event) = events.recv().await {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }
        for path in &event.paths {
            // The file may already be gone; a later event will re-surface it.
            let Ok(meta) = tokio::fs::metadata(path).await else {
                continue;
            };
            // New directories are covered by the recursive watch; they
            // never become queue entries themselves.
            if meta.is_dir() {
                continue;
            }
            let Some(remote_path) = config.remote_path_for(path) else {
                continue;
            };
            if config.is_excluded(&remote_path) {
                continue;
            }
            if queue.enqueue(path.clone(), remote_path) {
                debug!(path = %path.display(), "queued from watch event");
            }
        }
    }
}
