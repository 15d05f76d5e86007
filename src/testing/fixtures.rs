//! Test fixtures providing pre-built test objects
//!
//! Settings for a production-shaped relying party, services over fresh
//! in-memory stores, and a helper that runs a complete registration.

use crate::passkey::{PasskeyService, PasskeySettings, RegistrationResult, UserIdentity};
use crate::webauthn::{CoseAlgorithm, UserHandle};

use super::authenticator::SoftAuthenticator;
use super::constants::{TEST_ORIGIN, TEST_RP_ID, TEST_RP_NAME};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Relying party settings for `example.com`
    #[must_use]
    pub fn settings() -> PasskeySettings {
        PasskeySettings {
            rp_id: TEST_RP_ID.to_string(),
            rp_name: TEST_RP_NAME.to_string(),
            rp_origin: TEST_ORIGIN.to_string(),
            ..Default::default()
        }
    }

    /// Service over empty in-memory stores
    ///
    /// # Panics
    /// Panics if the fixture settings fail validation
    #[must_use]
    pub fn service() -> PasskeyService {
        Self::service_with(Self::settings())
    }

    /// Service over empty in-memory stores with custom settings
    ///
    /// # Panics
    /// Panics if `settings` fail validation
    #[must_use]
    pub fn service_with(settings: PasskeySettings) -> PasskeyService {
        PasskeyService::new(settings).expect("valid fixture settings")
    }

    /// A user with a fresh random handle
    ///
    /// # Panics
    /// Panics if the system random source fails
    #[must_use]
    pub fn user(name: &str) -> UserIdentity {
        let handle = UserHandle::generate(32).expect("random user handle");
        UserIdentity::new(handle, name, name)
    }

    /// Run a complete registration of a new `algorithm` authenticator for `user`
    ///
    /// # Panics
    /// Panics if any step of the ceremony fails
    pub async fn register(
        service: &PasskeyService,
        user: &UserIdentity,
        algorithm: CoseAlgorithm,
    ) -> (SoftAuthenticator, RegistrationResult) {
        let authenticator = SoftAuthenticator::new(algorithm);
        Self::register_authenticator(service, user, authenticator).await
    }

    /// Run a complete registration with a pre-configured authenticator
    ///
    /// # Panics
    /// Panics if any step of the ceremony fails
    pub async fn register_authenticator(
        service: &PasskeyService,
        user: &UserIdentity,
        mut authenticator: SoftAuthenticator,
    ) -> (SoftAuthenticator, RegistrationResult) {
        let (options, mut pending) = service
            .start_registration(user)
            .await
            .expect("start registration");
        let response = authenticator.register(&options, &service.settings().rp_origin);
        let result = service
            .finish_registration(&mut pending, &response)
            .await
            .expect("finish registration");
        (authenticator, result)
    }
}
