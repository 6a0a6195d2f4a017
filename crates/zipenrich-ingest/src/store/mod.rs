//! Remote file store access
//!
//! - [`RemoteSession`]: the raw protocol operations of one authenticated session
//! - [`FtpSession`]: the FTP implementation (via `suppaftp`)
//! - [`RemoteStoreClient`]: retry policy, directory handling, filtered listing
//!   and output naming on top of any session

pub mod client;
pub mod ftp;
pub mod session;

pub use client::RemoteStoreClient;
pub use ftp::FtpSession;
pub use session::RemoteSession;

use std::fmt::Display;
use thiserror::Error;

/// Result type for remote store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("{op} failed for {path}: {reason}")]
    Operation {
        op: &'static str,
        path: String,
        reason: String,
    },

    #[error("Remote session is already closed")]
    Closed,
}

impl StoreError {
    pub fn connect(address: impl Into<String>, reason: impl Display) -> Self {
        Self::Connect {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn operation(op: &'static str, path: impl Into<String>, reason: impl Display) -> Self {
        Self::Operation {
            op,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// One remote file found by listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub directory: String,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
        }
    }

    /// Full remote path of the entry
    pub fn path(&self) -> String {
        join_remote(&self.directory, &self.name)
    }
}

/// Join a remote directory and a file name with exactly one separator
pub fn join_remote(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", directory.trim_end_matches('/'), name)
}

/// Last path segment; some servers answer NLST with full paths
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
