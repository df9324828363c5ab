//! User-facing error taxonomy
//!
//! Remote and local failures are caught where they happen, converted to one
//! of these variants and reported through the notifier; none of them is fatal.

use thiserror::Error;

use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum DriveError {
    /// Sign-in or silent refresh failed; the user has to sign in again
    #[error("Authorization failed: {0}")]
    AuthFailed(String),

    #[error("Not signed in")]
    NotSignedIn,

    /// A listing or point lookup failed
    #[error("Listing failed: {0}")]
    ListingFailed(#[source] ProviderError),

    /// An upload or download failed
    #[error("Transfer failed: {0}")]
    TransferFailed(#[source] ProviderError),

    /// Download of a reference that carries no id; no remote call was made
    #[error("Remote file has no id")]
    MissingRemoteId,

    #[error("Couldn't create folder: {0}")]
    CreateFolderFailed(#[source] ProviderError),

    /// A row index that does not exist in the current listing
    #[error("No entry at position {0}")]
    InvalidSelection(usize),

    #[error("Nothing to upload: no file picked")]
    NothingPicked,

    #[error("Local storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl DriveError {
    /// Short message suitable for the notification channel
    pub fn user_message(&self) -> String {
        match self {
            DriveError::AuthFailed(_) => "Authorization failure. Please try again".to_string(),
            DriveError::NotSignedIn => "Please sign in first".to_string(),
            DriveError::MissingRemoteId => "executeFilesGet error, need to create file.".to_string(),
            DriveError::TransferFailed(e) => format!("transfer exception: {}", e),
            DriveError::CreateFolderFailed(e) => format!("couldn't create folder: {}", e),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            DriveError::MissingRemoteId.user_message(),
            "executeFilesGet error, need to create file."
        );
        let err = DriveError::CreateFolderFailed(ProviderError::AlreadyExists("Docs".to_string()));
        assert_eq!(err.user_message(), "couldn't create folder: Already exists: Docs");
        let err = DriveError::ListingFailed(ProviderError::NetworkError("reset".to_string()));
        assert_eq!(err.user_message(), "Listing failed: Network error: reset");
    }
}
