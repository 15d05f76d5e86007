//! Credential registry
//!
//! Credentials are keyed by their globally unique identifier. Counter updates
//! are a read-modify-write under the registry's write lock, so two concurrent
//! authentications of the same credential cannot both pass a stale counter
//! check.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::errors::RegistryError;
use super::types::PasskeyCredential;
use crate::webauthn::{CredentialId, UserHandle};

/// Storage seam for credentials
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// All credentials owned by `user`, oldest first
    ///
    /// # Errors
    /// Returns `Unavailable` if the backing store fails
    async fn find_by_user(
        &self,
        user: &UserHandle,
    ) -> Result<Vec<PasskeyCredential>, RegistryError>;

    /// The credential with this identifier, if registered
    ///
    /// # Errors
    /// Returns `Unavailable` if the backing store fails
    async fn find_by_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<PasskeyCredential>, RegistryError>;

    /// Insert a newly registered credential
    ///
    /// # Errors
    /// Returns `DuplicateCredential` if the identifier is already registered
    async fn insert(&self, credential: PasskeyCredential) -> Result<(), RegistryError>;

    /// Advance the signature counter and stamp `last_used`.
    ///
    /// Fails when `new_counter <= stored` and the stored counter is nonzero;
    /// authenticators without counters report zero forever and are exempt.
    /// A failed update leaves the row untouched.
    ///
    /// # Errors
    /// Returns `CounterRegression` as described, `UnknownCredential` if the
    /// identifier is not registered
    async fn update_counter(
        &self,
        id: &CredentialId,
        new_counter: u32,
    ) -> Result<PasskeyCredential, RegistryError>;
}

/// Counter rule shared by registry implementations
///
/// # Errors
/// Returns `CounterRegression` when a nonzero counter fails to increase
pub fn check_counter(stored: u32, reported: u32) -> Result<(), RegistryError> {
    if stored != 0 && reported <= stored {
        return Err(RegistryError::CounterRegression { stored, reported });
    }
    Ok(())
}

/// In-process credential registry
#[derive(Default)]
pub struct InMemoryCredentialRegistry {
    credentials: RwLock<HashMap<CredentialId, PasskeyCredential>>,
}

impl InMemoryCredentialRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRegistry for InMemoryCredentialRegistry {
    async fn find_by_user(
        &self,
        user: &UserHandle,
    ) -> Result<Vec<PasskeyCredential>, RegistryError> {
        let credentials = self.credentials.read().await;
        let mut owned: Vec<PasskeyCredential> = credentials
            .values()
            .filter(|c| &c.user_handle == user)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.credential_id.cmp(&b.credential_id))
        });
        Ok(owned)
    }

    async fn find_by_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<PasskeyCredential>, RegistryError> {
        Ok(self.credentials.read().await.get(id).cloned())
    }

    async fn insert(&self, credential: PasskeyCredential) -> Result<(), RegistryError> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&credential.credential_id) {
            return Err(RegistryError::DuplicateCredential);
        }
        credentials.insert(credential.credential_id.clone(), credential);
        Ok(())
    }

    async fn update_counter(
        &self,
        id: &CredentialId,
        new_counter: u32,
    ) -> Result<PasskeyCredential, RegistryError> {
        let mut credentials = self.credentials.write().await;
        let credential = credentials
            .get_mut(id)
            .ok_or(RegistryError::UnknownCredential)?;

        check_counter(credential.counter, new_counter)?;

        credential.counter = new_counter;
        credential.last_used = Some(Utc::now());
        Ok(credential.clone())
    }
}
