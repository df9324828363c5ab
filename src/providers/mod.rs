//! Drive Providers Module
//!
//! This module provides the abstraction layer between the navigation /
//! transfer orchestration and a concrete cloud-drive backend.
//! All backends implement the `DriveClient` trait; a `DriveFactory` builds a
//! client bound to a signed-in `AuthSession`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              DriveClient Trait              │
//! │  list_files, get_metadata, create, content  │
//! └─────────────────────────────────────────────┘
//!                      │
//!            ┌─────────┴─────────┐
//!            ▼                   ▼
//!      ┌────────────┐     ┌────────────┐
//!      │ LocalDrive │     │ MockDrive  │
//!      └────────────┘     └────────────┘
//! ```

pub mod types;
pub mod local;
#[cfg(test)]
pub(crate) mod mock;

pub use types::*;
pub use local::{LocalDrive, LocalDriveFactory};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWrite;

use crate::auth::AuthSession;

/// Unified drive client trait
///
/// Every call may suspend; implementations are shared between background
/// tasks and therefore take `&self`.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// Display name for this backend instance
    fn display_name(&self) -> String;

    /// Execute one page of a listing query
    async fn list_files(&self, request: &ListRequest) -> Result<FileList, ProviderError>;

    /// Point lookup of a single node's metadata.
    ///
    /// `fields` is a comma separated projection (`"*"` for everything).
    async fn get_metadata(&self, id: &str, fields: &str) -> Result<RemoteFileRef, ProviderError>;

    /// Create a file or folder, optionally with content
    async fn create_file(
        &self,
        descriptor: &FileDescriptor,
        content: Option<UploadContent>,
    ) -> Result<RemoteFileRef, ProviderError>;

    /// Stream the bytes of `range` into `sink`. Returns the number of bytes written.
    async fn download_content(
        &self,
        id: &str,
        range: ByteRange,
        strategy: TransferStrategy,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        on_progress: Option<ProgressCallback>,
    ) -> Result<u64, ProviderError>;
}

/// Builds drive clients for a signed-in session
pub trait DriveFactory: Send + Sync {
    fn connect(&self, session: Arc<AuthSession>) -> Result<Arc<dyn DriveClient>, ProviderError>;
}
