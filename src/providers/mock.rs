//! Scripted in-memory drive used by unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::local::parse_query;
use super::{
    ByteRange, DriveClient, FileDescriptor, FileList, ListRequest, ProgressCallback,
    ProviderError, RemoteFileRef, TransferStrategy, UploadContent, FOLDER_MIME_TYPE,
};

/// Every call the mock received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { query: String, cursor: Option<String> },
    GetMetadata { id: String, fields: String },
    Create { descriptor: FileDescriptor, strategy: Option<TransferStrategy> },
    Download { id: String, range: ByteRange, strategy: TransferStrategy },
}

#[derive(Default)]
pub struct MockDrive {
    nodes: Mutex<Vec<RemoteFileRef>>,
    /// Scripted listing responses, served before falling back to `nodes`
    scripted_pages: Mutex<VecDeque<Result<FileList, ProviderError>>>,
    calls: Mutex<Vec<Call>>,
    /// Listing failures keyed by `(parent id, folders?)`
    failing_listings: Mutex<Vec<(String, bool)>>,
    /// Artificial listing latency keyed by parent id
    listing_delay: Mutex<HashMap<String, Duration>>,
    fail_create: Mutex<Option<String>>,
    fail_download: Mutex<Option<String>>,
    /// Number of progress steps reported per transfer
    progress_steps: u64,
    next_id: Mutex<u64>,
}

impl MockDrive {
    pub fn new() -> Self {
        Self {
            progress_steps: 4,
            ..Default::default()
        }
    }

    /// Tree from the end-to-end scenario: root with folder "Docs" (f1) and file "a.txt" (g1)
    pub fn with_docs_tree() -> Self {
        let drive = Self::new();
        drive.add(RemoteFileRef::folder("f1", "Docs", Some("root")));
        drive.add(RemoteFileRef::file("g1", "a.txt", "text/plain", 100, Some("root")));
        drive
    }

    pub fn add(&self, node: RemoteFileRef) {
        self.nodes.lock().unwrap().push(node);
    }

    pub fn push_page(&self, page: Result<FileList, ProviderError>) {
        self.scripted_pages.lock().unwrap().push_back(page);
    }

    pub fn fail_listing(&self, parent_id: &str, folders: bool) {
        self.failing_listings
            .lock()
            .unwrap()
            .push((parent_id.to_string(), folders));
    }

    pub fn delay_listing(&self, parent_id: &str, delay: Duration) {
        self.listing_delay
            .lock()
            .unwrap()
            .insert(parent_id.to_string(), delay);
    }

    pub fn fail_create(&self, message: &str) {
        *self.fail_create.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_download(&self, message: &str) {
        *self.fail_download.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn node(&self, id: &str) -> Option<RemoteFileRef> {
        self.nodes.lock().unwrap().iter().find(|n| n.id == id).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn report(&self, on_progress: &Option<ProgressCallback>, total: u64) {
        if let Some(cb) = on_progress {
            for step in 0..=self.progress_steps {
                cb(total * step / self.progress_steps, total);
            }
        }
    }
}

#[async_trait]
impl DriveClient for MockDrive {
    fn display_name(&self) -> String {
        "Mock drive".to_string()
    }

    async fn list_files(&self, request: &ListRequest) -> Result<FileList, ProviderError> {
        self.record(Call::List {
            query: request.query.clone(),
            cursor: request.cursor.clone(),
        });

        let scripted = self.scripted_pages.lock().unwrap().pop_front();
        if let Some(page) = scripted {
            return page;
        }

        let query = parse_query(&request.query)?;
        let wants_folders = !query.negate && query.mime_type == FOLDER_MIME_TYPE;

        let delay = self.listing_delay.lock().unwrap().get(&query.parent_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_listings
            .lock()
            .unwrap()
            .contains(&(query.parent_id.clone(), wants_folders));
        if failing {
            return Err(ProviderError::NetworkError("listing unavailable".to_string()));
        }

        let mut files: Vec<RemoteFileRef> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.parent_id() == Some(query.parent_id.as_str()) && query.matches(n))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(FileList {
            files,
            next_cursor: None,
        })
    }

    async fn get_metadata(&self, id: &str, fields: &str) -> Result<RemoteFileRef, ProviderError> {
        self.record(Call::GetMetadata {
            id: id.to_string(),
            fields: fields.to_string(),
        });
        if id == super::ROOT_FOLDER_ID {
            return Ok(RemoteFileRef::root());
        }
        self.node(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn create_file(
        &self,
        descriptor: &FileDescriptor,
        content: Option<UploadContent>,
    ) -> Result<RemoteFileRef, ProviderError> {
        self.record(Call::Create {
            descriptor: descriptor.clone(),
            strategy: content.as_ref().map(|c| c.strategy),
        });
        let failure = self.fail_create.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(ProviderError::NetworkError(message));
        }

        let size = content.as_ref().map(|c| c.size);
        if let Some(upload) = &content {
            self.report(&upload.on_progress, upload.size);
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("new-{}", *next)
        };
        let created = RemoteFileRef {
            id,
            file_name: descriptor.file_name.clone(),
            mime_type: descriptor.mime_type.clone(),
            parent_folder: descriptor.parent_folder.clone(),
            size,
            modified: None,
        };
        self.add(created.clone());
        Ok(created)
    }

    async fn download_content(
        &self,
        id: &str,
        range: ByteRange,
        strategy: TransferStrategy,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        on_progress: Option<ProgressCallback>,
    ) -> Result<u64, ProviderError> {
        self.record(Call::Download {
            id: id.to_string(),
            range,
            strategy,
        });
        let failure = self.fail_download.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(ProviderError::NetworkError(message));
        }
        let total = range.len();
        sink.write_all(&vec![b'x'; total as usize]).await?;
        self.report(&on_progress, total);
        Ok(total)
    }
}
