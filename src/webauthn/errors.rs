//! Ceremony error taxonomy
//!
//! Every rejected path through a registration or authentication ceremony ends
//! in exactly one of these values. None of them are retried: the caller has to
//! restart the ceremony from option issuance.

use thiserror::Error;

use super::types::CoseAlgorithm;

/// Reasons a ceremony attempt is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CeremonyError {
    /// The challenge outlived its validity window
    #[error("Challenge expired")]
    ChallengeExpired,

    /// The challenge was already used by an earlier attempt
    #[error("Challenge already consumed")]
    ChallengeAlreadyConsumed,

    /// The challenge was never issued by this store (or was purged)
    #[error("Challenge not found")]
    ChallengeNotFound,

    /// Client data carried a different challenge than the one issued
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    /// Client data carried `webauthn.create` where `webauthn.get` was expected, or vice versa
    #[error("Client data type mismatch: expected {expected}, got {actual}")]
    ClientDataTypeMismatch { expected: String, actual: String },

    /// Client data origin is not exactly the configured origin
    #[error("Origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    /// Authenticator data was scoped to another relying party
    #[error("RP ID hash mismatch")]
    RpIdMismatch,

    /// The user-present flag was not set by the authenticator
    #[error("User presence flag not set")]
    UserPresenceMissing,

    /// User verification is required by policy but the flag was not set
    #[error("User verification required but not performed")]
    UserVerificationMissing,

    /// The signature did not verify against the stored public key
    #[error("Signature invalid")]
    SignatureInvalid,

    /// The key or statement algorithm differs from the enrolled or offered one
    #[error("Algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    /// The referenced credential is not registered or not acceptable for this user
    #[error("Unknown credential")]
    UnknownCredential,

    /// The authenticator is already enrolled
    #[error("Duplicate credential")]
    DuplicateCredential,

    /// The authenticator reported a counter that did not advance
    #[error("Counter regression: stored {stored}, reported {reported}")]
    CounterRegression { stored: u32, reported: u32 },

    /// The attestation statement is not acceptable under the configured policy
    #[error("Attestation rejected: {0}")]
    AttestationRejected(String),

    /// The response could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid relying-party configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The ceremony did not finish inside its deadline
    #[error("Ceremony timed out")]
    Timeout,
}

impl CeremonyError {
    /// Whether this failure points at a possibly compromised or cloned credential,
    /// or at a response crafted for another relying party.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::CounterRegression { .. }
                | Self::SignatureInvalid
                | Self::AlgorithmMismatch { .. }
                | Self::UnknownCredential
                | Self::OriginMismatch { .. }
                | Self::RpIdMismatch
        )
    }

    /// Short machine-readable reason code, stable across releases
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChallengeExpired => "challenge_expired",
            Self::ChallengeAlreadyConsumed => "challenge_already_consumed",
            Self::ChallengeNotFound => "challenge_not_found",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::ClientDataTypeMismatch { .. } => "client_data_type_mismatch",
            Self::OriginMismatch { .. } => "origin_mismatch",
            Self::RpIdMismatch => "rp_id_mismatch",
            Self::UserPresenceMissing => "user_presence_missing",
            Self::UserVerificationMissing => "user_verification_missing",
            Self::SignatureInvalid => "signature_invalid",
            Self::AlgorithmMismatch { .. } => "algorithm_mismatch",
            Self::UnknownCredential => "unknown_credential",
            Self::DuplicateCredential => "duplicate_credential",
            Self::CounterRegression { .. } => "counter_regression",
            Self::AttestationRejected(_) => "attestation_rejected",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Configuration(_) => "configuration",
            Self::Storage(_) => "storage",
            Self::Timeout => "timeout",
        }
    }

    pub(crate) fn algorithm_mismatch(expected: CoseAlgorithm, actual: CoseAlgorithm) -> Self {
        Self::AlgorithmMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}
