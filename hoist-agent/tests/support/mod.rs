#![allow(dead_code)]

use hoist_core::{
    AgentConfig, Catalog, Processor, Scanner, UploadQueue, Uploader, WatchService,
};
use hoist_server::{AppState, ClientEntry, LocalStorage};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const API_KEY: &str = "test-api-key";
pub const CLIENT_ID: &str = "test-client";

pub struct EnvOptions {
    pub upload_existing: bool,
    pub exclude_patterns: Vec<String>,
    pub max_file_size_mb: u64,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            upload_existing: false,
            exclude_patterns: Vec::new(),
            max_file_size_mb: 100,
        }
    }
}

/// One agent pipeline wired against an in-process receiver on an
/// ephemeral port, everything rooted in a scratch directory.
pub struct TestEnv {
    pub tmp: TempDir,
    pub watch_dir: PathBuf,
    pub storage: LocalStorage,
    pub config: Arc<AgentConfig>,
    pub queue: Arc<UploadQueue>,
    pub catalog: Catalog,
    pub processor: Arc<Processor>,
}

impl TestEnv {
    pub async fn new(options: EnvOptions) -> Self {
        let tmp = TempDir::new().unwrap();
        let watch_dir = tmp.path().join("watch");
        let storage_dir = tmp.path().join("storage");
        std::fs::create_dir_all(&watch_dir).unwrap();
        std::fs::create_dir_all(&storage_dir).unwrap();

        let storage = LocalStorage::new(&storage_dir, "backups");
        let state = AppState::new(
            Arc::new(storage.clone()),
            [ClientEntry {
                id: CLIENT_ID.to_string(),
                api_key: API_KEY.to_string(),
            }],
            100,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(hoist_server::serve(listener, state));

        let db_path = tmp.path().join("catalog.db");
        let excludes = options
            .exclude_patterns
            .iter()
            .map(|p| format!("{p:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        let config_toml = format!(
            r#"
exclude_patterns = [{excludes}]

[server]
url = "http://{addr}"
api_key = "{API_KEY}"

[database]
path = {db_path:?}

[[watches]]
local_path = {watch_dir:?}
remote_prefix = "uploads/"

[scan]
upload_existing = {upload_existing}

[stability]
debounce_seconds = 1
max_attempts = 10

[upload]
retry_attempts = 3
retry_delay_seconds = 1
max_file_size_mb = {max_file_size_mb}
"#,
            upload_existing = options.upload_existing,
            max_file_size_mb = options.max_file_size_mb,
        );
        let config = Arc::new(AgentConfig::from_toml_str(&config_toml).unwrap());

        let catalog = Catalog::open(&db_path).await.unwrap();
        let queue = Arc::new(UploadQueue::new());
        let uploader = Uploader::new(&config.server.url, &config.server.api_key);
        let processor = Arc::new(Processor::new(
            queue.clone(),
            catalog.clone(),
            uploader,
            config.clone(),
        ));

        Self {
            tmp,
            watch_dir,
            storage,
            config,
            queue,
            catalog,
            processor,
        }
    }

    pub fn start_processor(&self) {
        let processor = self.processor.clone();
        tokio::spawn(async move { processor.run().await });
    }

    /// The returned service must be kept alive for the duration of the
    /// test or the OS watches are dropped.
    pub fn start_watcher(&self) -> WatchService {
        let mut watcher = WatchService::new(self.queue.clone(), self.config.clone()).unwrap();
        watcher.start().unwrap();
        watcher
    }

    pub fn scan(&self) {
        Scanner::new(self.queue.clone(), self.config.clone()).scan();
    }

    /// On-disk location the receiver stores `remote_path` at for the test
    /// client.
    pub fn stored_path(&self, remote_path: &str) -> PathBuf {
        self.storage.object_path(CLIENT_ID, remote_path)
    }

    pub async fn wait_for_uploads(&self, files: &[PathBuf], timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let mut all_done = true;
            for path in files {
                let rec = self.catalog.get(path).await.unwrap();
                if !rec.is_some_and(|r| r.uploaded_at.is_some()) {
                    all_done = false;
                    break;
                }
            }
            if all_done {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for uploads of {files:?}"
            );
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

pub fn write_random_file(dir: &Path, name: &str, size: usize) -> (PathBuf, String) {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, &data).unwrap();
    (path, sha256_hex(&data))
}

pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn hash_file(path: &Path) -> String {
    sha256_hex(&std::fs::read(path).unwrap())
}

pub fn mtime_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
