//! Upload and download orchestration
//!
//! One transfer at a time is tracked in a `watch` channel. Progress is
//! published both into that state and onto a broadcast stream of fractions,
//! so the producer never knows how the foreground renders it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::DriveError;
use crate::notifier::Notifier;
use crate::providers::{
    ByteRange, DriveClient, FileDescriptor, ProgressCallback, RemoteFileRef, TransferStrategy,
    UploadContent,
};
use crate::storage::{DownloadSink, PickedFile};

/// Files strictly smaller than this are uploaded in a single request
pub const DIRECT_UPLOAD_MAX_SIZE: u64 = 5_000_000;
/// Files strictly smaller than this are downloaded in a single request
pub const DIRECT_DOWNLOAD_MAX_SIZE: u64 = 20_000_000;
/// MIME type used when the extension is not recognised
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File successfully uploaded";
pub const DOWNLOAD_SUCCESS_MESSAGE: &str = "File saved to downloads folder";

const PROGRESS_EVENTS_CAPACITY: usize = 256;

/// Size thresholds for the direct strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub direct_upload_max_size: u64,
    pub direct_download_max_size: u64,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            direct_upload_max_size: DIRECT_UPLOAD_MAX_SIZE,
            direct_download_max_size: DIRECT_DOWNLOAD_MAX_SIZE,
        }
    }
}

impl TransferPolicy {
    pub fn upload_strategy(&self, size: u64) -> TransferStrategy {
        TransferStrategy::for_size(size, self.direct_upload_max_size)
    }

    pub fn download_strategy(&self, size: u64) -> TransferStrategy {
        TransferStrategy::for_size(size, self.direct_download_max_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferResult {
    Pending,
    Success,
    Failure(String),
}

/// The transfer currently shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct TransferState {
    pub kind: TransferKind,
    /// Fraction in `[0, 1]`, absent when nothing is moving
    pub progress: Option<f64>,
    pub result: TransferResult,
}

impl TransferState {
    fn started(kind: TransferKind) -> Self {
        Self {
            kind,
            progress: Some(0.0),
            result: TransferResult::Pending,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.result != TransferResult::Pending
    }
}

/// `done / total` clamped to `[0, 1]`; an empty transfer is complete
fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done as f64 / total as f64).clamp(0.0, 1.0)
}

pub struct TransferCoordinator {
    drive: Arc<dyn DriveClient>,
    policy: TransferPolicy,
    downloads: Arc<dyn DownloadSink>,
    notifier: Arc<dyn Notifier>,
    state: Arc<watch::Sender<Option<TransferState>>>,
    progress_events: broadcast::Sender<f64>,
}

impl TransferCoordinator {
    pub fn new(
        drive: Arc<dyn DriveClient>,
        policy: TransferPolicy,
        downloads: Arc<dyn DownloadSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(None);
        let (progress_events, _) = broadcast::channel(PROGRESS_EVENTS_CAPACITY);
        Self {
            drive,
            policy,
            downloads,
            notifier,
            state: Arc::new(state),
            progress_events,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TransferState>> {
        self.state.subscribe()
    }

    /// Stream of accepted progress fractions, never decreasing within one transfer
    pub fn progress_events(&self) -> broadcast::Receiver<f64> {
        self.progress_events.subscribe()
    }

    pub fn state(&self) -> Option<TransferState> {
        self.state.borrow().clone()
    }

    /// Forget the finished transfer
    pub fn acknowledge(&self) {
        if self.state.send_replace(None).is_some() {
            debug!("Transfer state acknowledged");
        }
    }

    /// Upload a staged local file into `target_folder_id`
    pub async fn upload(&self, file: &PickedFile, target_folder_id: &str) -> TransferState {
        self.begin(TransferKind::Upload);
        info!(
            "Uploading {} ({} bytes) into '{}'",
            file.display_name, file.size, target_folder_id
        );
        let outcome = self
            .run_upload(file, target_folder_id)
            .await
            .map(|created| debug!("Created remote file {} ({})", created.file_name, created.id));
        self.finish(outcome, UPLOAD_SUCCESS_MESSAGE)
    }

    /// Download `remote` into the downloads location
    pub async fn download(&self, remote: &RemoteFileRef) -> TransferState {
        let Some(id) = remote.remote_id() else {
            warn!("Download requested for '{}' without an id", remote.file_name);
            self.begin(TransferKind::Download);
            return self.finish(Err(DriveError::MissingRemoteId), DOWNLOAD_SUCCESS_MESSAGE);
        };

        self.begin(TransferKind::Download);
        let outcome = self
            .run_download(id, remote)
            .await
            .map(|path| info!("Downloaded '{}' to {}", remote.file_name, path.display()));
        self.finish(outcome, DOWNLOAD_SUCCESS_MESSAGE)
    }

    async fn run_upload(
        &self,
        file: &PickedFile,
        target_folder_id: &str,
    ) -> Result<RemoteFileRef, DriveError> {
        let mime_type = mime_guess::from_path(&file.display_name)
            .first_raw()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let descriptor = FileDescriptor {
            file_name: file.display_name.clone(),
            mime_type,
            parent_folder: vec![target_folder_id.to_string()],
            app_settings: HashMap::new(),
        };
        let strategy = self.policy.upload_strategy(file.size);
        debug!("Upload strategy for {}: {}", file.display_name, strategy);

        let content = UploadContent {
            path: file.path.clone(),
            size: file.size,
            strategy,
            on_progress: Some(self.progress_callback()),
        };
        self.drive
            .create_file(&descriptor, Some(content))
            .await
            .map_err(DriveError::TransferFailed)
    }

    async fn run_download(&self, id: &str, remote: &RemoteFileRef) -> Result<PathBuf, DriveError> {
        let metadata = self
            .drive
            .get_metadata(id, "id,size")
            .await
            .map_err(DriveError::TransferFailed)?;
        let size = metadata.size.unwrap_or(0);

        let mut target = self
            .downloads
            .create(&remote.file_name, &remote.mime_type)
            .await?;

        match ByteRange::covering(size) {
            Some(range) => {
                let strategy = self.policy.download_strategy(size);
                debug!("Downloading {} of '{}' ({})", range, id, strategy);
                self.drive
                    .download_content(
                        id,
                        range,
                        strategy,
                        &mut target.file,
                        Some(self.progress_callback()),
                    )
                    .await
                    .map_err(DriveError::TransferFailed)?;
            }
            None => debug!("'{}' is empty, skipping content request", id),
        }

        target.file.flush().await?;
        Ok(target.path)
    }

    fn begin(&self, kind: TransferKind) {
        self.state.send_replace(Some(TransferState::started(kind)));
    }

    /// Record the outcome, notify the user and return the final state
    fn finish(&self, outcome: Result<(), DriveError>, success_message: &str) -> TransferState {
        let result = match outcome {
            Ok(()) => {
                self.publish_progress(1.0);
                self.notifier.notify(success_message);
                TransferResult::Success
            }
            Err(e) => {
                warn!("Transfer failed: {}", e);
                let message = e.user_message();
                self.notifier.notify(&message);
                TransferResult::Failure(message)
            }
        };

        let mut finished = None;
        self.state.send_modify(|state| {
            if let Some(state) = state.as_mut() {
                state.result = result.clone();
                finished = Some(state.clone());
            }
        });
        finished.unwrap_or(TransferState {
            kind: TransferKind::Download,
            progress: None,
            result,
        })
    }

    /// Raise the current fraction to `value` if that moves it forward
    fn publish_progress(&self, value: f64) {
        apply_progress(&self.state, &self.progress_events, value);
    }

    fn progress_callback(&self) -> ProgressCallback {
        let state = Arc::clone(&self.state);
        let events = self.progress_events.clone();
        Box::new(move |done, total| apply_progress(&state, &events, fraction(done, total)))
    }
}

fn apply_progress(
    state: &watch::Sender<Option<TransferState>>,
    events: &broadcast::Sender<f64>,
    value: f64,
) {
    let mut accepted = None;
    state.send_if_modified(|state| match state.as_mut() {
        Some(state) if state.progress.map_or(true, |p| value > p) => {
            state.progress = Some(value);
            accepted = Some(value);
            true
        }
        _ => false,
    });
    if let Some(value) = accepted {
        // no receivers is fine
        let _ = events.send(value);
    }
}
