//! `WebAuthn` verification engine
//!
//! This module provides the protocol-level pieces independent of any ceremony
//! state: option and response types, CBOR/COSE decoding, signature
//! verification and attestation policy. It implements the W3C `WebAuthn`
//! relying-party checks using standard cryptography libraries.

pub mod attestation;
pub mod cbor;
pub mod crypto;
pub mod encoding;
mod errors;
pub mod types;
pub mod verifier;

// Re-exports for public use
pub use attestation::{AttestationPolicy, AttestationType};
pub use cbor::CredentialPublicKey;
pub use errors::CeremonyError;
pub use types::*;
pub use verifier::{ExpectedBinding, VerifiedAssertion, VerifiedRegistration};
