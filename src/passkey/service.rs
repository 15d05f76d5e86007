//! Passkey ceremony service
//!
//! `PasskeyService` ties the relying party settings to the two shared stores.
//! The ceremony halves live in `registration` and `authentication`; this
//! module holds construction and the helpers both use.

use std::future::Future;
use std::sync::Arc;

use super::challenge_store::{ChallengeStore, InMemoryChallengeStore};
use super::credential_registry::{CredentialRegistry, InMemoryCredentialRegistry};
use super::settings::PasskeySettings;
use crate::utils::logging::CeremonyLog;
use crate::webauthn::{CeremonyError, ExpectedBinding, UserHandle};

/// Relying party ceremony service
pub struct PasskeyService {
    pub(super) settings: PasskeySettings,
    pub(super) challenges: Arc<dyn ChallengeStore>,
    pub(super) credentials: Arc<dyn CredentialRegistry>,
}

impl PasskeyService {
    /// Create a service backed by in-memory stores
    ///
    /// # Errors
    /// Returns `Configuration` if the settings fail validation
    pub fn new(settings: PasskeySettings) -> Result<Self, CeremonyError> {
        let challenges = Arc::new(InMemoryChallengeStore::new(
            settings.challenge_ttl(),
            settings.challenge_length,
        ));
        let credentials = Arc::new(InMemoryCredentialRegistry::new());
        Self::with_stores(settings, challenges, credentials)
    }

    /// Create a service over caller-provided stores
    ///
    /// # Errors
    /// Returns `Configuration` if the settings fail validation
    pub fn with_stores(
        settings: PasskeySettings,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRegistry>,
    ) -> Result<Self, CeremonyError> {
        settings.validate()?;
        Ok(Self {
            settings,
            challenges,
            credentials,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &PasskeySettings {
        &self.settings
    }

    #[must_use]
    pub fn challenges(&self) -> &Arc<dyn ChallengeStore> {
        &self.challenges
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialRegistry> {
        &self.credentials
    }

    /// Generate a user handle of the configured length for a new account
    ///
    /// # Errors
    /// Returns `Storage` if the system random source fails
    pub fn generate_user_handle(&self) -> Result<UserHandle, CeremonyError> {
        UserHandle::generate(self.settings.user_handle_length)
    }

    /// Run a ceremony future under the configured ceremony timeout.
    ///
    /// A timed-out ceremony leaves no state behind other than an unconsumed
    /// challenge, which expires on its own.
    ///
    /// # Errors
    /// Returns `Timeout` if the deadline passes, otherwise the ceremony's own result
    pub async fn with_deadline<T, F>(&self, ceremony: F) -> Result<T, CeremonyError>
    where
        F: Future<Output = Result<T, CeremonyError>>,
    {
        match tokio::time::timeout(self.settings.ceremony_timeout(), ceremony).await {
            Ok(result) => result,
            Err(_) => Err(CeremonyError::Timeout),
        }
    }

    /// Drop expired challenge rows
    pub async fn purge_expired_challenges(&self) -> usize {
        let purged = self.challenges.purge_expired().await;
        CeremonyLog::log_challenges_purged(purged);
        purged
    }

    pub(super) fn expected_binding<'a>(&'a self, challenge: &'a [u8]) -> ExpectedBinding<'a> {
        ExpectedBinding {
            challenge,
            origin: &self.settings.rp_origin,
            rp_id: &self.settings.rp_id,
            user_verification: self.settings.user_verification,
            allow_cross_origin: self.settings.allow_cross_origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = PasskeySettings {
            rp_id: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            PasskeyService::new(settings),
            Err(CeremonyError::Configuration(_))
        ));
    }

    #[test]
    fn test_generated_user_handles_are_unique() {
        let service = PasskeyService::new(PasskeySettings::default()).unwrap();
        let a = service.generate_user_handle().unwrap();
        let b = service.generate_user_handle().unwrap();
        assert_eq!(a.as_bytes().len(), 32);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_anonymous_starts_do_not_accumulate_stale_challenges() {
        let store = Arc::new(InMemoryChallengeStore::new(chrono::Duration::seconds(60), 32));
        let service = PasskeyService::with_stores(
            PasskeySettings::default(),
            store.clone(),
            Arc::new(InMemoryCredentialRegistry::new()),
        )
        .unwrap();

        for _ in 0..1000 {
            service.start_authentication(None).await.unwrap();
        }
        let stale = store
            .issue_at(None, chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1001);

        service.start_authentication(None).await.unwrap();

        assert_eq!(store.len().await, 1001);
        assert_eq!(
            store.consume(&stale.value).await,
            Err(crate::passkey::ChallengeError::NotFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_maps_to_timeout() {
        let service = PasskeyService::new(PasskeySettings::default()).unwrap();

        let result: Result<(), CeremonyError> = service
            .with_deadline(async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(CeremonyError::Timeout));

        let result = service.with_deadline(async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
