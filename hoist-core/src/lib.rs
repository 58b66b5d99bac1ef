//! # Hoist Core
//!
//! Sender pipeline for the hoist one-way file synchronisation agent.
//!
//! A long-running agent observes configured directory trees and pushes new
//! or changed regular files to a remote receiver under a deterministic
//! remote path. The pipeline is:
//!
//! - **Discovery**: a one-shot [`Scanner`] walk at startup plus a
//!   continuous [`WatchService`] bridging OS change notifications.
//! - **Queue**: a FIFO with a membership set ([`UploadQueue`]) so a path
//!   has at most one live entry.
//! - **Processor**: the single consumer ([`Processor`]); applies a
//!   stability debounce, uploads with bounded retries, and records the
//!   outcome in the [`Catalog`].
//! - **Restart controller**: a daily check ([`restart`]) that exits the
//!   process when uploads were dropped, so a supervisor restart rescans.

pub mod catalog;
pub mod config;
pub mod error;
pub mod processor;
pub mod queue;
pub mod restart;
pub mod scanner;
pub mod uploader;
pub mod watcher;

pub use catalog::{Catalog, FileRecord};
pub use config::AgentConfig;
pub use error::{Result, SyncError};
pub use processor::Processor;
pub use queue::{QueueEntry, UploadQueue};
pub use scanner::Scanner;
pub use uploader::{UploadResponse, Uploader};
pub use watcher::WatchService;
