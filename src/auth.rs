//! Sign-in and credential session
//!
//! The identity provider itself (consent screen, token endpoint) is an
//! external collaborator behind `IdentityProvider`. `AuthSession` owns the
//! resulting credential and is passed explicitly to whatever needs it.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::DriveError;
use crate::providers::ProviderError;

/// Drive scope: files created or opened by this app
pub const SCOPE_DRIVE_FILE: &str = "https://www.huawei.com/auth/drive.file";
/// Drive scope: the app data folder
pub const SCOPE_DRIVE_APPDATA: &str = "https://www.huawei.com/auth/drive.appdata";

/// Launch descriptor handed to the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    pub scopes: Vec<String>,
    pub access_token: bool,
    pub id_token: bool,
}

impl SignInRequest {
    /// Request used for drive access: both drive scopes, access + id token
    pub fn drive() -> Self {
        Self {
            scopes: vec![SCOPE_DRIVE_FILE.to_string(), SCOPE_DRIVE_APPDATA.to_string()],
            access_token: true,
            id_token: true,
        }
    }
}

/// Outcome of an interactive sign-in
pub enum SignInResult {
    Granted {
        union_id: String,
        access_token: SecretString,
    },
    Denied(String),
}

impl fmt::Debug for SignInResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignInResult::Granted { union_id, .. } => f
                .debug_struct("Granted")
                .field("union_id", union_id)
                .field("access_token", &"[REDACTED]")
                .finish(),
            SignInResult::Denied(reason) => f.debug_tuple("Denied").field(reason).finish(),
        }
    }
}

/// Signed-in account credential
#[derive(Clone)]
pub struct Credential {
    pub union_id: String,
    access_token: SecretString,
}

impl Credential {
    /// Build a credential; both the union id and the token must be non-empty
    pub fn new(union_id: &str, access_token: SecretString) -> Result<Self, DriveError> {
        if union_id.trim().is_empty() {
            return Err(DriveError::AuthFailed("missing union id".to_string()));
        }
        if access_token.expose_secret().trim().is_empty() {
            return Err(DriveError::AuthFailed("missing access token".to_string()));
        }
        Ok(Self {
            union_id: union_id.to_string(),
            access_token,
        })
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("union_id", &self.union_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// External identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Launch descriptor for an interactive sign-in
    fn sign_in_request(&self) -> SignInRequest {
        SignInRequest::drive()
    }

    /// Run the interactive sign-in for `request`
    async fn authorize(&self, request: &SignInRequest) -> SignInResult;

    /// Obtain a fresh access token without user interaction
    async fn silent_sign_in(&self) -> Result<SecretString, ProviderError>;
}

/// Explicitly owned credential holder
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    credential: RwLock<Option<Credential>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            credential: RwLock::new(None),
        }
    }

    /// Interactive sign-in. A denied attempt is relaunched once before giving up.
    pub async fn sign_in(&self) -> Result<Credential, DriveError> {
        let request = self.provider.sign_in_request();
        let first = self.provider.authorize(&request).await;
        let result = match first {
            SignInResult::Denied(reason) => {
                warn!("Sign-in denied ({}), retrying once", reason);
                self.provider.authorize(&request).await
            }
            granted => granted,
        };
        self.complete_sign_in(result).await
    }

    /// Turn a sign-in result into the session credential
    pub async fn complete_sign_in(&self, result: SignInResult) -> Result<Credential, DriveError> {
        match result {
            SignInResult::Granted { union_id, access_token } => {
                let credential = Credential::new(&union_id, access_token)?;
                *self.credential.write().await = Some(credential.clone());
                info!("Signed in as {}", credential.union_id);
                Ok(credential)
            }
            SignInResult::Denied(reason) => Err(DriveError::AuthFailed(reason)),
        }
    }

    /// Replace the access token through a silent sign-in.
    ///
    /// The credential lock is not held while the provider runs; readers keep
    /// seeing the old token until the new one is swapped in. A sign-out or a
    /// different account signing in meanwhile discards the refreshed token.
    pub async fn refresh_access_token(&self) -> Result<(), DriveError> {
        let union_id = self
            .credential
            .read()
            .await
            .as_ref()
            .map(|c| c.union_id.clone())
            .ok_or(DriveError::NotSignedIn)?;
        let token = self
            .provider
            .silent_sign_in()
            .await
            .map_err(|e| DriveError::AuthFailed(e.to_string()))?;
        let refreshed = Credential::new(&union_id, token)?;

        let mut guard = self.credential.write().await;
        match guard.as_ref() {
            Some(current) if current.union_id == union_id => {
                *guard = Some(refreshed);
                info!("Access token refreshed");
                Ok(())
            }
            _ => {
                warn!("Session changed during token refresh, discarding new token");
                Err(DriveError::NotSignedIn)
            }
        }
    }

    pub async fn access_token(&self) -> Option<SecretString> {
        self.credential
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.credential.read().await.is_some()
    }

    pub async fn sign_out(&self) {
        if self.credential.write().await.take().is_some() {
            info!("Signed out");
        }
    }
}

/// Identity provider backed by a pre-issued access token
pub struct StaticTokenProvider {
    union_id: String,
    token: Option<SecretString>,
}

impl StaticTokenProvider {
    pub fn new(union_id: &str, token: Option<SecretString>) -> Self {
        Self {
            union_id: union_id.to_string(),
            token,
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authorize(&self, _request: &SignInRequest) -> SignInResult {
        match &self.token {
            Some(token) if !token.expose_secret().is_empty() => SignInResult::Granted {
                union_id: self.union_id.clone(),
                access_token: token.clone(),
            },
            _ => SignInResult::Denied("no access token configured".to_string()),
        }
    }

    async fn silent_sign_in(&self) -> Result<SecretString, ProviderError> {
        self.token
            .clone()
            .ok_or_else(|| ProviderError::AuthenticationFailed("no access token configured".to_string()))
    }
}
