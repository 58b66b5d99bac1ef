use crate::catalog::Catalog;
use crate::config::AgentConfig;
use crate::queue::{QueueEntry, UploadQueue};
use crate::uploader::Uploader;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(100);
const MAX_TRACKED_FAILURES: usize = 10;

/// The single queue consumer. For each entry it checks the catalogue for
/// staleness, applies the stability debounce, uploads with bounded
/// retries, and records the outcome. Exhausted uploads land in a bounded
/// failure list that the restart controller inspects once a day.
pub struct Processor {
    queue: Arc<UploadQueue>,
    catalog: Catalog,
    uploader: Uploader,
    config: Arc<AgentConfig>,
    max_size_bytes: u64,
    debounce: Duration,
    failed: Mutex<Vec<PathBuf>>,
    stopping: AtomicBool,
    drained: CancellationToken,
}

impl Processor {
    pub fn new(
        queue: Arc<UploadQueue>,
        catalog: Catalog,
        uploader: Uploader,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self {
            queue,
            catalog,
            uploader,
            max_size_bytes: config.max_size_bytes(),
            debounce: Duration::from_secs(config.stability.debounce_seconds),
            config,
            failed: Mutex::new(Vec::new()),
            stopping: AtomicBool::new(false),
            drained: CancellationToken::new(),
        }
    }

    /// Consume the queue until [`stop`](Self::stop) is observed. The stop
    /// flag is polled between entries; the current entry, including its
    /// sleeps, always runs to completion.
    pub async fn run(&self) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let Some(entry) = self.queue.dequeue() else {
                sleep(IDLE_POLL).await;
                continue;
            };
            self.process_entry(entry).await;
        }
        self.drained.cancel();
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Resolves once [`run`](Self::run) has returned.
    pub async fn wait_drained(&self) {
        self.drained.cancelled().await;
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_lock().is_empty()
    }

    /// Sample of paths whose upload exhausted retries this process
    /// lifetime (at most [`MAX_TRACKED_FAILURES`]).
    pub fn failed_files(&self) -> Vec<PathBuf> {
        self.failed_lock().clone()
    }

    fn record_failure(&self, path: &Path) {
        let mut failed = self.failed_lock();
        if failed.len() < MAX_TRACKED_FAILURES {
            failed.push(path.to_path_buf());
        }
    }

    fn failed_lock(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn process_entry(&self, mut entry: QueueEntry) {
        // Vanished files are dropped without noise; a later event or the
        // next scan re-surfaces them.
        let Ok(meta) = tokio::fs::metadata(&entry.local_path).await else {
            return;
        };
        let size = meta.len();
        let mtime = mtime_secs(&meta);

        let record = match self.catalog.get(&entry.local_path).await {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %entry.local_path.display(), "catalogue lookup failed: {e}");
                return;
            }
        };

        // Already handled at this version.
        if let Some(record) = &record {
            if record.mtime == mtime {
                return;
            }
        }

        if size > self.max_size_bytes {
            info!(
                path = %entry.local_path.display(),
                size,
                "skipping file over size limit"
            );
            self.write_catalog(
                record.is_some(),
                &entry,
                size as i64,
                mtime,
                Some("file_too_large"),
            )
            .await;
            return;
        }

        sleep(self.debounce).await;

        let Ok(meta2) = tokio::fs::metadata(&entry.local_path).await else {
            return;
        };
        if mtime_secs(&meta2) != mtime || meta2.len() != size {
            entry.attempts += 1;
            if entry.attempts >= self.config.stability.max_attempts {
                warn!(
                    path = %entry.local_path.display(),
                    attempts = entry.attempts,
                    "giving up on unstable file"
                );
                return;
            }
            debug!(
                path = %entry.local_path.display(),
                attempts = entry.attempts,
                "file still changing, re-queued"
            );
            self.queue.enqueue_with_attempts(
                entry.local_path,
                entry.remote_path,
                entry.attempts,
            );
            return;
        }

        let mut last_error = None;
        for attempt in 0..self.config.upload.retry_attempts {
            if attempt > 0 {
                sleep(Duration::from_secs(self.config.upload.retry_delay_seconds)).await;
            }
            match self
                .uploader
                .upload(&entry.local_path, &entry.remote_path)
                .await
            {
                Ok(_) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(
                        path = %entry.local_path.display(),
                        attempt = attempt + 1,
                        "upload attempt failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }
        if let Some(e) = last_error {
            error!(
                path = %entry.local_path.display(),
                attempts = self.config.upload.retry_attempts,
                "upload failed after all retries: {e}"
            );
            self.record_failure(&entry.local_path);
            return;
        }

        let Ok(meta3) = tokio::fs::metadata(&entry.local_path).await else {
            return;
        };
        if mtime_secs(&meta3) != mtime {
            // Changed mid-upload: the uploaded bytes are stale, so no
            // success row; the fresh version goes around again.
            self.queue.enqueue(entry.local_path, entry.remote_path);
            return;
        }

        // Bookkeeping records the version observed before the debounce,
        // which is the version that went over the wire.
        self.write_catalog(record.is_some(), &entry, size as i64, mtime, None)
            .await;
        info!(
            path = %entry.local_path.display(),
            remote = %entry.remote_path,
            "uploaded"
        );
    }

    async fn write_catalog(
        &self,
        exists: bool,
        entry: &QueueEntry,
        size: i64,
        mtime: i64,
        skip_reason: Option<&str>,
    ) {
        let result = if exists {
            self.catalog
                .update(&entry.local_path, &entry.remote_path, size, mtime, skip_reason)
                .await
        } else {
            self.catalog
                .insert(&entry.local_path, &entry.remote_path, size, mtime, skip_reason)
                .await
        };
        // A lost write costs one harmless re-upload on the next event.
        if let Err(e) = result {
            warn!(path = %entry.local_path.display(), "catalogue write failed: {e}");
        }
    }
}

fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
