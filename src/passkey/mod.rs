//! Passkey ceremonies
//!
//! This module drives the registration and authentication ceremonies on top of
//! the `WebAuthn` verification engine, owning the two pieces of shared state:
//! single-use challenges and the credential registry.

// Core settings
mod settings;
pub use settings::PasskeySettings;

// Shared state
pub mod challenge_store;
pub mod credential_registry;
mod errors;
pub use challenge_store::{ChallengeStore, InMemoryChallengeStore};
pub use credential_registry::{CredentialRegistry, InMemoryCredentialRegistry};
pub use errors::{ChallengeError, RegistryError};

// Service layer
mod authentication;
mod registration;
mod service;
mod types;
pub use service::PasskeyService;
pub use types::*;
