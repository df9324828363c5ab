// DriveKit - Cloud drive navigation and transfer orchestration
// Browse folders, upload and download with progress, one screen at a time

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod navigation;
pub mod notifier;
pub mod providers;
pub mod storage;
pub mod transfer;

pub use auth::{AuthSession, Credential, IdentityProvider, SignInRequest, SignInResult, StaticTokenProvider};
pub use config::DriveKitConfig;
pub use controller::{DriveMode, DriveServices, Screen, ScreenController, UserIntent};
pub use error::DriveError;
pub use fetcher::{ChildKind, PageFetcher};
pub use navigation::{FolderView, NavigationState, RefreshOutcome};
pub use notifier::{ChannelNotifier, Notifier};
pub use providers::{DriveClient, DriveFactory, ProviderError, RemoteFileRef};
pub use storage::{DownloadSink, DownloadsFolder, LocalStorage, PickedFile};
pub use transfer::{
    TransferCoordinator, TransferKind, TransferPolicy, TransferResult, TransferState,
};
