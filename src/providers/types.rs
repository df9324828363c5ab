//! Shared types for drive providers
//!
//! This module contains the value types exchanged with a drive backend:
//! remote file references, listing pages, creation descriptors, byte ranges,
//! transfer strategies and the provider error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Id of the drive's top-level folder
pub const ROOT_FOLDER_ID: &str = "root";

/// MIME type that marks a remote node as a folder
pub const FOLDER_MIME_TYPE: &str = "application/vnd.huawei-apps.folder";

/// Sort key passed with every listing query
pub const ORDER_BY_FILE_NAME: &str = "fileName";

/// Escape a node id for embedding between single quotes in a listing query
pub fn escape_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Reference to one remote node (folder or file)
///
/// Identity is the `id`. An empty id means the backend never assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRef {
    pub id: String,
    /// Display name shown in listings
    pub file_name: String,
    pub mime_type: String,
    /// Parent folder ids; zero or one element in practice
    #[serde(default)]
    pub parent_folder: Vec<String>,
    /// Size in bytes, when the backend reported it
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteFileRef {
    /// The sentinel reference for the drive root
    pub fn root() -> Self {
        Self {
            id: ROOT_FOLDER_ID.to_string(),
            file_name: String::new(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parent_folder: Vec::new(),
            size: None,
            modified: None,
        }
    }

    /// Create a folder reference
    pub fn folder(id: &str, name: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            file_name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parent_folder: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
            size: None,
            modified: None,
        }
    }

    /// Create a file reference
    pub fn file(id: &str, name: &str, mime_type: &str, size: u64, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            file_name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent_folder: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
            size: Some(size),
            modified: None,
        }
    }

    /// The id, or `None` when the backend never assigned one
    pub fn remote_id(&self) -> Option<&str> {
        let id = self.id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_FOLDER_ID
    }

    /// First recorded parent id, the folder to return to on "back"
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_folder.first().map(String::as_str)
    }

    /// Copy of this reference with its parent chain replaced by `[parent_id]`
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_folder = vec![parent_id.to_string()];
        self
    }
}

/// One page of a listing call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Vec<RemoteFileRef>,
    /// Continuation token; empty or absent means no further pages
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A listing request: query filter, sort key and optional cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: String,
    pub order_by: String,
    pub cursor: Option<String>,
}

/// Metadata for a node about to be created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_name: String,
    pub mime_type: String,
    pub parent_folder: Vec<String>,
    #[serde(default)]
    pub app_settings: HashMap<String, String>,
}

impl FileDescriptor {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// How content moves between the client and the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Single request, no chunking
    Direct,
    /// Chunked / ranged / resumable transfer
    Resumable,
}

impl TransferStrategy {
    /// `Direct` when `size < direct_max_size`, `Resumable` otherwise
    pub fn for_size(size: u64, direct_max_size: u64) -> Self {
        if size < direct_max_size {
            TransferStrategy::Direct
        } else {
            TransferStrategy::Resumable
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::Direct => write!(f, "direct"),
            TransferStrategy::Resumable => write!(f, "resumable"),
        }
    }
}

/// Inclusive byte range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering a whole object of `size` bytes.
    ///
    /// Returns `None` for an empty object: `[0, size - 1]` has no valid
    /// representation when `size == 0`, so no content request is made.
    pub fn covering(size: u64) -> Option<Self> {
        if size == 0 {
            None
        } else {
            Some(Self { start: 0, end: size - 1 })
        }
    }

    /// Number of bytes covered; zero when `end < start`
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Progress callback: `(bytes_done, bytes_total)`
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Local content attached to a create call
pub struct UploadContent {
    pub path: PathBuf,
    pub size: u64,
    pub strategy: TransferStrategy,
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadContent")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
