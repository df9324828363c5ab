//! Local Directory Drive Provider
//!
//! Implements `DriveClient` over a directory tree so the orchestration layer
//! can run without a remote account. Node ids are root-relative paths using
//! `/` separators and always start with `./`, so an entry literally named
//! `root` never collides with the root directory's id `root`.
//!
//! Listing queries use the same grammar the page fetcher emits:
//! `'<parent id>' in parentFolder and mimeType='<mime>'` (or `!=`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::{
    ByteRange, DriveClient, DriveFactory, FileDescriptor, FileList, ListRequest, ProgressCallback,
    ProviderError, RemoteFileRef, TransferStrategy, UploadContent, FOLDER_MIME_TYPE,
    ORDER_BY_FILE_NAME, ROOT_FOLDER_ID,
};
use crate::auth::AuthSession;

/// Default number of entries per listing page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Chunk size for resumable transfers
const CHUNK_SIZE: usize = 256 * 1024;

/// MIME type for files whose extension is unknown
const OCTET_STREAM: &str = "application/octet-stream";

// ─── Query grammar ──────────────────────────────────────────────────────────

/// A parsed listing filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub parent_id: String,
    pub mime_type: String,
    /// `true` for `mimeType!=`, `false` for `mimeType=`
    pub negate: bool,
}

impl ParsedQuery {
    pub fn matches(&self, entry: &RemoteFileRef) -> bool {
        (entry.mime_type == self.mime_type) != self.negate
    }
}

fn query_regex() -> &'static Regex {
    static QUERY_RE: OnceLock<Regex> = OnceLock::new();
    QUERY_RE.get_or_init(|| {
        Regex::new(
            r"^'(?P<parent>(?:[^'\\]|\\.)*)' in parentFolder and mimeType(?P<op>!=|=)'(?P<mime>[^']*)'$",
        )
        .expect("listing query pattern is valid")
    })
}

fn unescape_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a listing query into its parent id and MIME predicate
pub fn parse_query(query: &str) -> Result<ParsedQuery, ProviderError> {
    let caps = query_regex()
        .captures(query.trim())
        .ok_or_else(|| ProviderError::InvalidQuery(query.to_string()))?;
    Ok(ParsedQuery {
        parent_id: unescape_id(&caps["parent"]),
        mime_type: caps["mime"].to_string(),
        negate: &caps["op"] == "!=",
    })
}

// ─── Path mapping ───────────────────────────────────────────────────────────

/// Validate a node id. Rejects absolute paths, `..` traversal and null bytes.
fn validate_id(id: &str) -> Result<(), ProviderError> {
    if id.contains('\0') {
        return Err(ProviderError::InvalidPath("id contains null bytes".to_string()));
    }
    for component in Path::new(id).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(ProviderError::InvalidPath(id.to_string())),
        }
    }
    Ok(())
}

/// Validate a single name for a new node
fn validate_name(name: &str) -> Result<(), ProviderError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(ProviderError::InvalidPath(format!("invalid name '{}'", name)));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(ProviderError::InvalidPath(format!("invalid name '{}'", name)));
    }
    Ok(())
}

/// Prefix shared by every non-root node id
const CHILD_ID_PREFIX: &str = "./";

fn join_id(parent_id: &str, name: &str) -> String {
    if parent_id == ROOT_FOLDER_ID {
        format!("{}{}", CHILD_ID_PREFIX, name)
    } else {
        format!("{}/{}", parent_id, name)
    }
}

fn parent_of(id: &str) -> String {
    match id.rfind('/') {
        Some(pos) if pos + 1 > CHILD_ID_PREFIX.len() => id[..pos].to_string(),
        _ => ROOT_FOLDER_ID.to_string(),
    }
}

/// Keep only the requested fields of a reference (`"*"` keeps everything)
fn project(mut entry: RemoteFileRef, fields: &str) -> RemoteFileRef {
    if fields.trim() == "*" || fields.trim().is_empty() {
        return entry;
    }
    let wanted: Vec<&str> = fields.split(',').map(str::trim).collect();
    if !wanted.contains(&"fileName") {
        entry.file_name.clear();
    }
    if !wanted.contains(&"mimeType") {
        entry.mime_type.clear();
    }
    if !wanted.contains(&"parentFolder") {
        entry.parent_folder.clear();
    }
    if !wanted.contains(&"size") {
        entry.size = None;
    }
    if !wanted.contains(&"editedTime") {
        entry.modified = None;
    }
    entry
}

// ─── Provider ───────────────────────────────────────────────────────────────

/// Directory-backed drive
pub struct LocalDrive {
    root: PathBuf,
    session: Arc<AuthSession>,
    page_size: usize,
}

impl LocalDrive {
    pub fn new(root: PathBuf, session: Arc<AuthSession>) -> Self {
        Self {
            root,
            session,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every call requires a signed-in session
    async fn ensure_authorized(&self) -> Result<(), ProviderError> {
        if self.session.access_token().await.is_none() {
            return Err(ProviderError::AuthenticationFailed("no active session".to_string()));
        }
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, ProviderError> {
        if id == ROOT_FOLDER_ID {
            return Ok(self.root.clone());
        }
        let relative = id
            .strip_prefix(CHILD_ID_PREFIX)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        validate_id(relative)?;
        Ok(self.root.join(relative))
    }

    async fn entry_ref(&self, id: &str) -> Result<RemoteFileRef, ProviderError> {
        let path = self.resolve(id)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProviderError::NotFound(id.to_string()),
            _ => ProviderError::IoError(e),
        })?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        if id == ROOT_FOLDER_ID {
            return Ok(RemoteFileRef {
                modified,
                ..RemoteFileRef::root()
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (mime_type, size) = if metadata.is_dir() {
            (FOLDER_MIME_TYPE.to_string(), None)
        } else {
            let mime = mime_guess::from_path(&path)
                .first_raw()
                .unwrap_or(OCTET_STREAM)
                .to_string();
            (mime, Some(metadata.len()))
        };

        Ok(RemoteFileRef {
            id: id.to_string(),
            file_name,
            mime_type,
            parent_folder: vec![parent_of(id)],
            size,
            modified,
        })
    }

    async fn children(&self, parent_id: &str) -> Result<Vec<RemoteFileRef>, ProviderError> {
        let dir = self.resolve(parent_id)?;
        let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProviderError::NotFound(parent_id.to_string()),
            _ => ProviderError::IoError(e),
        })?;

        let mut entries = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            let id = join_id(parent_id, &name);
            entries.push(self.entry_ref(&id).await?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl DriveClient for LocalDrive {
    fn display_name(&self) -> String {
        format!("Local drive ({})", self.root.display())
    }

    async fn list_files(&self, request: &ListRequest) -> Result<FileList, ProviderError> {
        self.ensure_authorized().await?;
        let query = parse_query(&request.query)?;
        if !request.order_by.is_empty() && request.order_by != ORDER_BY_FILE_NAME {
            return Err(ProviderError::NotSupported(format!("orderBy={}", request.order_by)));
        }

        let offset = match request.cursor.as_deref() {
            None | Some("") => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| ProviderError::InvalidQuery(format!("bad cursor '{}'", cursor)))?,
        };

        let mut matching: Vec<RemoteFileRef> = self
            .children(&query.parent_id)
            .await?
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();
        matching.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        if offset > matching.len() {
            return Err(ProviderError::InvalidQuery(format!(
                "cursor {} is past the end of the listing",
                offset
            )));
        }
        let end = offset.saturating_add(self.page_size).min(matching.len());
        let files = matching[offset..end].to_vec();
        let next_cursor = if end < matching.len() {
            Some(end.to_string())
        } else {
            None
        };

        debug!(
            "Listed {} entries of '{}' (offset {}, more: {})",
            files.len(),
            query.parent_id,
            offset,
            next_cursor.is_some()
        );
        Ok(FileList { files, next_cursor })
    }

    async fn get_metadata(&self, id: &str, fields: &str) -> Result<RemoteFileRef, ProviderError> {
        self.ensure_authorized().await?;
        let entry = self.entry_ref(id).await?;
        Ok(project(entry, fields))
    }

    async fn create_file(
        &self,
        descriptor: &FileDescriptor,
        content: Option<UploadContent>,
    ) -> Result<RemoteFileRef, ProviderError> {
        self.ensure_authorized().await?;
        validate_name(&descriptor.file_name)?;

        let parent_id = descriptor
            .parent_folder
            .first()
            .map(String::as_str)
            .unwrap_or(ROOT_FOLDER_ID);
        let parent_dir = self.resolve(parent_id)?;
        if !tokio::fs::metadata(&parent_dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(ProviderError::NotFound(parent_id.to_string()));
        }

        let id = join_id(parent_id, &descriptor.file_name);
        let target = self.resolve(&id)?;
        // Never replace an existing entry
        if tokio::fs::symlink_metadata(&target).await.is_ok() {
            return Err(ProviderError::AlreadyExists(descriptor.file_name.clone()));
        }

        if descriptor.is_folder() {
            tokio::fs::create_dir(&target).await?;
            info!("Created folder {}", id);
            return self.entry_ref(&id).await;
        }

        match content {
            Some(upload) => copy_with_progress(&upload, &target).await?,
            None => {
                tokio::fs::File::create(&target).await?;
            }
        }
        info!("Created file {}", id);

        let mut created = self.entry_ref(&id).await?;
        if !descriptor.mime_type.is_empty() {
            created.mime_type = descriptor.mime_type.clone();
        }
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
        self.ensure_authorized().await?;
        let path = self.resolve(id)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProviderError::NotFound(id.to_string()),
            _ => ProviderError::IoError(e),
        })?;

        let len = file.metadata().await?.len();
        if range.end >= len {
            return Err(ProviderError::Other(format!(
                "Requested range not satisfiable: {} of {} bytes",
                range, len
            )));
        }

        file.seek(std::io::SeekFrom::Start(range.start)).await?;
        let total = range.len();
        let report = |done: u64| {
            if let Some(cb) = &on_progress {
                cb(done, total);
            }
        };
        report(0);

        match strategy {
            TransferStrategy::Direct => {
                let mut buf = vec![0u8; total as usize];
                file.read_exact(&mut buf).await?;
                sink.write_all(&buf).await?;
                report(total);
            }
            TransferStrategy::Resumable => {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let mut done = 0u64;
                while done < total {
                    let want = ((total - done) as usize).min(CHUNK_SIZE);
                    file.read_exact(&mut buf[..want]).await?;
                    sink.write_all(&buf[..want]).await?;
                    done += want as u64;
                    report(done);
                }
            }
        }
        sink.flush().await?;

        debug!("Downloaded {} ({}, {})", id, range, strategy);
        Ok(total)
    }
}

/// Copy upload content to `target`, reporting progress per chunk
async fn copy_with_progress(upload: &UploadContent, target: &Path) -> Result<(), ProviderError> {
    let report = |done: u64| {
        if let Some(cb) = &upload.on_progress {
            cb(done, upload.size);
        }
    };
    report(0);

    match upload.strategy {
        TransferStrategy::Direct => {
            let bytes = tokio::fs::read(&upload.path).await?;
            tokio::fs::write(target, &bytes).await?;
            report(upload.size);
        }
        TransferStrategy::Resumable => {
            let mut source = tokio::fs::File::open(&upload.path).await?;
            let mut dest = tokio::fs::File::create(target).await?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            let mut done = 0u64;
            loop {
                let n = source.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                dest.write_all(&buf[..n]).await?;
                done += n as u64;
                report(done.min(upload.size));
            }
            dest.flush().await?;
        }
    }
    Ok(())
}

/// Builds `LocalDrive` clients rooted at a fixed directory
pub struct LocalDriveFactory {
    root: PathBuf,
    page_size: usize,
}

impl LocalDriveFactory {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl DriveFactory for LocalDriveFactory {
    fn connect(&self, session: Arc<AuthSession>) -> Result<Arc<dyn DriveClient>, ProviderError> {
        if !self.root.is_dir() {
            return Err(ProviderError::NotFound(self.root.display().to_string()));
        }
        let drive = LocalDrive::new(self.root.clone(), session).with_page_size(self.page_size);
        info!("Connected to {}", drive.display_name());
        Ok(Arc::new(drive))
    }
}
