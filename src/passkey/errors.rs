//! Error types for the challenge store and credential registry

use thiserror::Error;

use crate::webauthn::CeremonyError;

/// Challenge store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("Challenge expired")]
    Expired,
    #[error("Challenge not found")]
    NotFound,
    #[error("Challenge already consumed")]
    AlreadyConsumed,
    #[error("Challenge store unavailable: {0}")]
    Unavailable(String),
}

/// Credential registry failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate credential")]
    DuplicateCredential,
    #[error("Counter regression: stored {stored}, reported {reported}")]
    CounterRegression { stored: u32, reported: u32 },
    #[error("Unknown credential")]
    UnknownCredential,
    #[error("Credential registry unavailable: {0}")]
    Unavailable(String),
}

impl From<ChallengeError> for CeremonyError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::Expired => Self::ChallengeExpired,
            ChallengeError::NotFound => Self::ChallengeNotFound,
            ChallengeError::AlreadyConsumed => Self::ChallengeAlreadyConsumed,
            ChallengeError::Unavailable(msg) => Self::Storage(msg),
        }
    }
}

impl From<RegistryError> for CeremonyError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateCredential => Self::DuplicateCredential,
            RegistryError::CounterRegression { stored, reported } => {
                Self::CounterRegression { stored, reported }
            }
            RegistryError::UnknownCredential => Self::UnknownCredential,
            RegistryError::Unavailable(msg) => Self::Storage(msg),
        }
    }
}
