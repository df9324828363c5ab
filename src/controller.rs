//! Screen controller
//!
//! Maps user intents onto the navigator and the transfer coordinator and
//! keeps track of which screen is showing:
//!
//! ```text
//!   Main ──file picked──▶ Drive(Upload) ──submit──▶ Main
//!   Main ──downloads────▶ Drive(Download) ──file click / submit──▶ Main
//! ```
//!
//! `dispatch` spawns every intent onto the runtime so the caller's loop is
//! never blocked by network or disk work.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::AuthSession;
use crate::error::DriveError;
use crate::navigation::NavigationState;
use crate::notifier::Notifier;
use crate::providers::{
    DriveClient, DriveFactory, FileDescriptor, ProviderError, RemoteFileRef, FOLDER_MIME_TYPE,
};
use crate::storage::{DownloadSink, LocalStorage, PickedFile};
use crate::transfer::{TransferCoordinator, TransferPolicy};

pub const SIGN_IN_SUCCESS_MESSAGE: &str = "Successfully authorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Main,
    Drive(DriveMode),
}

/// Everything the user can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    SignIn,
    /// A document was chosen in the picker
    FilePicked {
        path: PathBuf,
        display_name: Option<String>,
    },
    /// Open the drive to pick something to download
    OpenDownloads,
    FolderClicked(usize),
    BackClicked,
    MoveToRoot,
    /// Upload the picked file into the current folder
    Submit,
    CreateFolder(String),
    /// Download the file at this row
    FileClicked(usize),
    /// The user dismissed the transfer result
    ActionDone,
    RefreshToken,
    /// Leave the session: wipe local caches and sign out
    Exit,
}

/// Per-session services, built once sign-in succeeds
pub struct DriveServices {
    drive: Arc<dyn DriveClient>,
    navigation: NavigationState,
    transfers: TransferCoordinator,
}

impl DriveServices {
    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }
}

struct Inner {
    session: Arc<AuthSession>,
    factory: Arc<dyn DriveFactory>,
    notifier: Arc<dyn Notifier>,
    storage: LocalStorage,
    downloads: Arc<dyn DownloadSink>,
    policy: TransferPolicy,
    services: RwLock<Option<Arc<DriveServices>>>,
    screen: watch::Sender<Screen>,
    pending_upload: Mutex<Option<PickedFile>>,
}

#[derive(Clone)]
pub struct ScreenController {
    inner: Arc<Inner>,
}

impl ScreenController {
    pub fn new(
        session: Arc<AuthSession>,
        factory: Arc<dyn DriveFactory>,
        notifier: Arc<dyn Notifier>,
        storage: LocalStorage,
        downloads: Arc<dyn DownloadSink>,
        policy: TransferPolicy,
    ) -> Self {
        let (screen, _) = watch::channel(Screen::Main);
        Self {
            inner: Arc::new(Inner {
                session,
                factory,
                notifier,
                storage,
                downloads,
                policy,
                services: RwLock::new(None),
                screen,
                pending_upload: Mutex::new(None),
            }),
        }
    }

    pub fn screen(&self) -> Screen {
        *self.inner.screen.borrow()
    }

    pub fn subscribe_screen(&self) -> watch::Receiver<Screen> {
        self.inner.screen.subscribe()
    }

    /// Services of the signed-in session, if any
    pub async fn services(&self) -> Option<Arc<DriveServices>> {
        self.inner.services.read().await.clone()
    }

    pub async fn pending_upload(&self) -> Option<PickedFile> {
        self.inner.pending_upload.lock().await.clone()
    }

    /// Run `intent` on a background task
    pub fn dispatch(&self, intent: UserIntent) -> JoinHandle<Result<(), DriveError>> {
        let this = self.clone();
        tokio::spawn(async move { this.handle(intent).await })
    }

    /// Run `intent` to completion.
    ///
    /// Failures have already been reported through the notifier when this
    /// returns `Err`; transfer failures are recorded in the transfer state
    /// instead and return `Ok`.
    pub async fn handle(&self, intent: UserIntent) -> Result<(), DriveError> {
        debug!("Handling {:?} on {:?}", intent, self.screen());
        match intent {
            UserIntent::SignIn => self.sign_in().await,
            UserIntent::FilePicked { path, display_name } => {
                self.file_picked(path, display_name).await
            }
            UserIntent::OpenDownloads => {
                let services = self.require_services().await?;
                self.set_screen(Screen::Drive(DriveMode::Download));
                services.navigation.refresh().await;
                Ok(())
            }
            UserIntent::FolderClicked(index) => {
                let services = self.require_services().await?;
                let folder = services
                    .navigation
                    .folder_at(index)
                    .ok_or(DriveError::InvalidSelection(index))?;
                services.navigation.descend(folder).await;
                Ok(())
            }
            UserIntent::BackClicked => {
                let services = self.require_services().await?;
                services.navigation.ascend().await?;
                Ok(())
            }
            UserIntent::MoveToRoot => {
                let services = self.require_services().await?;
                services.navigation.move_to_root().await;
                Ok(())
            }
            UserIntent::Submit => self.submit().await,
            UserIntent::CreateFolder(name) => self.create_folder(&name).await,
            UserIntent::FileClicked(index) => self.file_clicked(index).await,
            UserIntent::ActionDone => {
                let services = self.require_services().await?;
                services.transfers.acknowledge();
                services.navigation.refresh().await;
                Ok(())
            }
            UserIntent::RefreshToken => {
                let result = self.inner.session.refresh_access_token().await;
                if let Err(e) = &result {
                    self.inner.notifier.notify(&e.user_message());
                }
                result
            }
            UserIntent::Exit => self.exit().await,
        }
    }

    // ─── Intents ────────────────────────────────────────────────────────────

    async fn sign_in(&self) -> Result<(), DriveError> {
        let result = self.connect().await;
        match &result {
            Ok(()) => self.inner.notifier.notify(SIGN_IN_SUCCESS_MESSAGE),
            Err(e) => self.inner.notifier.notify(&e.user_message()),
        }
        result
    }

    async fn connect(&self) -> Result<(), DriveError> {
        self.inner.session.sign_in().await?;
        let drive = self
            .inner
            .factory
            .connect(self.inner.session.clone())
            .map_err(|e| DriveError::AuthFailed(e.to_string()))?;

        let services = DriveServices {
            navigation: NavigationState::new(drive.clone(), self.inner.notifier.clone()),
            transfers: TransferCoordinator::new(
                drive.clone(),
                self.inner.policy,
                self.inner.downloads.clone(),
                self.inner.notifier.clone(),
            ),
            drive,
        };
        *self.inner.services.write().await = Some(Arc::new(services));
        Ok(())
    }

    async fn file_picked(&self, path: PathBuf, display_name: Option<String>) -> Result<(), DriveError> {
        let services = self.require_services().await?;
        let picked = match self
            .inner
            .storage
            .stage_picked_file(&path, display_name.as_deref())
            .await
        {
            Ok(picked) => picked,
            Err(e) => {
                let err = DriveError::Storage(e);
                self.inner.notifier.notify(&err.user_message());
                return Err(err);
            }
        };
        info!("Picked {} ({} bytes)", picked.display_name, picked.size);
        *self.inner.pending_upload.lock().await = Some(picked);

        self.set_screen(Screen::Drive(DriveMode::Upload));
        services.navigation.refresh().await;
        Ok(())
    }

    async fn submit(&self) -> Result<(), DriveError> {
        let services = self.require_services().await?;
        match self.screen() {
            Screen::Drive(DriveMode::Upload) => {
                let picked = self
                    .inner
                    .pending_upload
                    .lock()
                    .await
                    .take()
                    .ok_or(DriveError::NothingPicked)?;
                let target = services.navigation.current_folder();
                services.transfers.upload(&picked, &target.id).await;
                self.set_screen(Screen::Main);
                services.navigation.refresh().await;
                Ok(())
            }
            Screen::Drive(DriveMode::Download) => {
                self.set_screen(Screen::Main);
                Ok(())
            }
            Screen::Main => {
                debug!("Submit ignored on the main screen");
                Ok(())
            }
        }
    }

    async fn file_clicked(&self, index: usize) -> Result<(), DriveError> {
        let services = self.require_services().await?;
        if self.screen() != Screen::Drive(DriveMode::Download) {
            debug!("File click ignored outside download mode");
            return Ok(());
        }
        let file = services
            .navigation
            .file_at(index)
            .ok_or(DriveError::InvalidSelection(index))?;
        services.transfers.download(&file).await;
        self.set_screen(Screen::Main);
        services.navigation.refresh().await;
        Ok(())
    }

    async fn create_folder(&self, name: &str) -> Result<(), DriveError> {
        let services = self.require_services().await?;
        let parent = services.navigation.current_folder();
        let result = create_folder_in(services.drive.as_ref(), &parent, name).await;
        match &result {
            Ok(created) => {
                self.inner
                    .notifier
                    .notify(&format!("folder \"{}\" successfully created", created.file_name));
                services.navigation.refresh().await;
            }
            Err(e) => self.inner.notifier.notify(&e.user_message()),
        }
        result.map(|_| ())
    }

    async fn exit(&self) -> Result<(), DriveError> {
        let purged = self.inner.storage.purge().await;
        *self.inner.pending_upload.lock().await = None;
        *self.inner.services.write().await = None;
        self.inner.session.sign_out().await;
        self.set_screen(Screen::Main);
        match purged {
            Ok(count) => {
                debug!("Exit removed {} cached entries", count);
                Ok(())
            }
            Err(e) => {
                warn!("Cache purge failed on exit: {}", e);
                Err(DriveError::Storage(e))
            }
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    async fn require_services(&self) -> Result<Arc<DriveServices>, DriveError> {
        match self.services().await {
            Some(services) => Ok(services),
            None => {
                let err = DriveError::NotSignedIn;
                self.inner.notifier.notify(&err.user_message());
                Err(err)
            }
        }
    }

    fn set_screen(&self, screen: Screen) {
        let previous = self.inner.screen.send_replace(screen);
        if previous != screen {
            debug!("Screen {:?} -> {:?}", previous, screen);
        }
    }
}

/// Create a folder named `name` under `parent`
pub async fn create_folder_in(
    drive: &dyn DriveClient,
    parent: &RemoteFileRef,
    name: &str,
) -> Result<RemoteFileRef, DriveError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DriveError::CreateFolderFailed(ProviderError::InvalidPath(
            "folder name is empty".to_string(),
        )));
    }
    let descriptor = FileDescriptor {
        file_name: name.to_string(),
        mime_type: FOLDER_MIME_TYPE.to_string(),
        parent_folder: vec![parent.id.clone()],
        app_settings: HashMap::from([("appProperties".to_string(), "property".to_string())]),
    };
    drive
        .create_file(&descriptor, None)
        .await
        .map_err(DriveError::CreateFolderFailed)
}
