//! Folder navigation state
//!
//! Holds the current folder and its two child lists in a `watch` channel:
//! background tasks are the only writers, any number of readers observe.
//!
//! Every refetch bumps a generation number. A listing that finishes after a
//! newer navigation already started is dropped instead of overwriting the
//! newer lists.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::DriveError;
use crate::fetcher::{ChildKind, PageFetcher};
use crate::notifier::Notifier;
use crate::providers::{DriveClient, RemoteFileRef};

/// Observable snapshot of the navigator
#[derive(Debug, Clone, PartialEq)]
pub struct FolderView {
    pub current_folder: RemoteFileRef,
    pub folders: Vec<RemoteFileRef>,
    pub files: Vec<RemoteFileRef>,
    /// Incremented on every refetch
    pub generation: u64,
}

impl Default for FolderView {
    fn default() -> Self {
        Self {
            current_folder: RemoteFileRef::root(),
            folders: Vec::new(),
            files: Vec::new(),
            generation: 0,
        }
    }
}

/// What one refetch produced
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Number of folders listed, or why the listing failed
    pub folders: Result<usize, DriveError>,
    pub files: Result<usize, DriveError>,
    /// At least one listing finished after a newer refetch and was dropped
    pub superseded: bool,
}

impl RefreshOutcome {
    pub fn is_complete(&self) -> bool {
        self.folders.is_ok() && self.files.is_ok() && !self.superseded
    }
}

pub struct NavigationState {
    drive: Arc<dyn DriveClient>,
    fetcher: PageFetcher,
    view: watch::Sender<FolderView>,
    notifier: Arc<dyn Notifier>,
}

impl NavigationState {
    /// Navigator positioned at the drive root with empty lists
    pub fn new(drive: Arc<dyn DriveClient>, notifier: Arc<dyn Notifier>) -> Self {
        let (view, _) = watch::channel(FolderView::default());
        Self {
            fetcher: PageFetcher::new(drive.clone()),
            drive,
            view,
            notifier,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FolderView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> FolderView {
        self.view.borrow().clone()
    }

    pub fn current_folder(&self) -> RemoteFileRef {
        self.view.borrow().current_folder.clone()
    }

    pub fn folder_at(&self, index: usize) -> Option<RemoteFileRef> {
        self.view.borrow().folders.get(index).cloned()
    }

    pub fn file_at(&self, index: usize) -> Option<RemoteFileRef> {
        self.view.borrow().files.get(index).cloned()
    }

    /// Enter `target`, remembering the folder we came from as its only parent
    pub async fn descend(&self, target: RemoteFileRef) -> RefreshOutcome {
        debug!("Descending into '{}' ({})", target.file_name, target.id);
        self.navigate(move |view| {
            let previous = view.current_folder.id.clone();
            view.current_folder = target.with_parent(&previous);
        })
        .await
    }

    /// Return to the recorded parent folder.
    ///
    /// Returns `Ok(None)` without any remote call when the current folder has
    /// no recorded parent.
    pub async fn ascend(&self) -> Result<Option<RefreshOutcome>, DriveError> {
        let parent_id = self
            .view
            .borrow()
            .current_folder
            .parent_id()
            .map(str::to_string);
        let Some(parent_id) = parent_id else {
            debug!("Ascend ignored: current folder has no parent");
            return Ok(None);
        };

        let parent = match self.drive.get_metadata(&parent_id, "*").await {
            Ok(parent) => parent,
            Err(e) => {
                let err = DriveError::ListingFailed(e);
                self.notifier.notify(&err.user_message());
                return Err(err);
            }
        };

        debug!("Ascending to '{}' ({})", parent.file_name, parent.id);
        Ok(Some(self.navigate(move |view| view.current_folder = parent).await))
    }

    /// Jump straight to the root sentinel, skipping any parent lookup
    pub async fn move_to_root(&self) -> RefreshOutcome {
        self.navigate(|view| view.current_folder = RemoteFileRef::root())
            .await
    }

    /// Clear both lists and refetch the current folder's children
    pub async fn refresh(&self) -> RefreshOutcome {
        self.navigate(|_| {}).await
    }

    /// Apply `update`, clear the lists, bump the generation and refetch
    async fn navigate(&self, update: impl FnOnce(&mut FolderView)) -> RefreshOutcome {
        let mut target = (0u64, String::new());
        self.view.send_modify(|view| {
            update(view);
            view.folders.clear();
            view.files.clear();
            view.generation += 1;
            target = (view.generation, view.current_folder.id.clone());
        });
        let (generation, folder_id) = target;

        let (folders, files) = tokio::join!(
            self.load(generation, &folder_id, ChildKind::Folders),
            self.load(generation, &folder_id, ChildKind::Files),
        );

        RefreshOutcome {
            superseded: !folders.1 || !files.1,
            folders: folders.0,
            files: files.0,
        }
    }

    /// List one kind of children and publish it if still current.
    /// The flag is `false` when the result was dropped as stale.
    async fn load(
        &self,
        generation: u64,
        folder_id: &str,
        kind: ChildKind,
    ) -> (Result<usize, DriveError>, bool) {
        match self.fetcher.list_children(folder_id, kind).await {
            Ok(children) => {
                let count = children.len();
                let applied = self.view.send_if_modified(|view| {
                    if view.generation != generation {
                        return false;
                    }
                    match kind {
                        ChildKind::Folders => view.folders = children,
                        ChildKind::Files => view.files = children,
                    }
                    true
                });
                if !applied {
                    debug!(
                        "Dropping stale {:?} listing of '{}' (generation {})",
                        kind, folder_id, generation
                    );
                }
                (Ok(count), applied)
            }
            Err(e) => {
                let current = self.view.borrow().generation == generation;
                if current {
                    self.notifier.notify(&e.user_message());
                }
                (Err(e), current)
            }
        }
    }
}
