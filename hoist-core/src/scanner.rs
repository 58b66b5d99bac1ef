use crate::config::{AgentConfig, WatchRoot};
use crate::queue::UploadQueue;
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// One-shot walk of the configured roots at startup. Only runs when
/// `scan.upload_existing` is set; files already catalogued at their
/// current mtime are weeded out later by the processor, not here.
pub struct Scanner {
    queue: Arc<UploadQueue>,
    config: Arc<AgentConfig>,
}

impl Scanner {
    pub fn new(queue: Arc<UploadQueue>, config: Arc<AgentConfig>) -> Self {
        Self { queue, config }
    }

    pub fn scan(&self) {
        if !self.config.scan.upload_existing {
            debug!("upload_existing disabled, skipping initial scan");
            return;
        }
        for watch in &self.config.watches {
            self.scan_root(watch);
        }
    }

    fn scan_root(&self, watch: &WatchRoot) {
        let mut enqueued = 0usize;
        // Unreadable entries are skipped; a later watcher event or restart
        // will surface anything missed here.
        for entry in WalkDir::new(&watch.local_path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(remote_path) = self.config.remote_path_for(entry.path()) else {
                continue;
            };
            if self.config.is_excluded(&remote_path) {
                continue;
            }
            if self.queue.enqueue(entry.path().to_path_buf(), remote_path) {
                enqueued += 1;
            }
        }
        info!(
            root = %watch.local_path.display(),
            enqueued,
            "initial scan complete"
        );
    }
}
