//! Testing utilities for passkey ceremonies
//!
//! Available to unit tests and, behind the `testing` feature, to integration
//! tests.
//!
//! - [`authenticator`] - A software authenticator producing signed responses
//! - [`fixtures`] - Pre-built settings, services and registrations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passkey_ceremony::testing::{SoftAuthenticator, TestFixtures};
//! use passkey_ceremony::webauthn::CoseAlgorithm;
//!
//! let service = TestFixtures::service();
//! let alice = TestFixtures::user("alice");
//! let (mut authenticator, registered) =
//!     TestFixtures::register(&service, &alice, CoseAlgorithm::Es256).await;
//!
//! let (options, mut pending) = service
//!     .start_authentication(Some(&alice.handle))
//!     .await
//!     .unwrap();
//! let response = authenticator.assert(&options, &service.settings().rp_origin);
//! let result = service.finish_authentication(&mut pending, &response).await.unwrap();
//! assert_eq!(result.credential_id, registered.credential.credential_id);
//! ```

pub mod authenticator;
pub mod fixtures;

// Re-export commonly used items for convenience
pub use authenticator::{tamper, SoftAttestation, SoftAuthenticator};
pub use fixtures::TestFixtures;

/// Common test constants
pub mod constants {
    /// Relying party ID used by fixtures
    pub const TEST_RP_ID: &str = "example.com";

    /// Relying party display name used by fixtures
    pub const TEST_RP_NAME: &str = "Example";

    /// Origin the fixture relying party is served from
    pub const TEST_ORIGIN: &str = "https://example.com";
}
