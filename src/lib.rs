#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey-ceremony crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod passkey;
pub mod settings;
pub mod utils;
pub mod webauthn;

// Software authenticator and fixtures, for unit and integration tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use passkey::{
    AuthenticationResult, CeremonyOutcome, CeremonyPhase, PasskeyCredential, PasskeyService,
    PasskeySettings, PendingAuthentication, PendingRegistration, RegistrationResult,
    UserIdentity,
};
pub use settings::{init_logging, Settings};
pub use webauthn::CeremonyError;
