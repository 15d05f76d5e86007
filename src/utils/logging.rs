// Centralized ceremony logging so every outcome is reported the same way
use log::{debug, error, info, warn};

use crate::passkey::CeremonyOutcome;
use crate::webauthn::{CeremonyError, CredentialId, UserHandle};

/// Which half of the protocol a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }
}

pub struct CeremonyLog;

impl CeremonyLog {
    /// Log that options were handed to the browser
    pub fn log_options_issued(kind: CeremonyKind, user: Option<&UserHandle>, credentials: usize) {
        match user {
            Some(user) => info!(
                "🔑 Issued {} options for user {} ({} credential(s) listed)",
                kind.as_str(),
                user,
                credentials
            ),
            None => info!("🔑 Issued discoverable {} options", kind.as_str()),
        }
    }

    /// Log a successful registration
    pub fn log_registered(user: &UserHandle, credential_id: &CredentialId, algorithm: &str) {
        info!(
            "✅ Registered credential {} ({}) for user {}",
            credential_id, algorithm, user
        );
    }

    /// Log a successful authentication
    pub fn log_authenticated(user: &UserHandle, credential_id: &CredentialId, counter: u32) {
        info!(
            "✅ Authenticated user {} with credential {} (counter {})",
            user, credential_id, counter
        );
    }

    /// Log a rejected ceremony.
    ///
    /// Counter regressions point at a cloned authenticator and go to `error!`;
    /// other security events go to `warn!`; benign failures such as an expired
    /// challenge stay at `info!`.
    pub fn log_rejected(kind: CeremonyKind, err: &CeremonyError) {
        match err {
            CeremonyError::CounterRegression { stored, reported } => error!(
                "🚨 Possible cloned authenticator: {} counter went from {} to {}",
                kind.as_str(),
                stored,
                reported
            ),
            err if err.is_security_event() => {
                warn!("⚠️  {} rejected ({}): {}", kind.as_str(), err.code(), err);
            }
            err => info!("❌ {} rejected ({}): {}", kind.as_str(), err.code(), err),
        }
    }

    /// Log the audit record of a finished ceremony
    pub fn log_outcome(kind: CeremonyKind, outcome: &CeremonyOutcome) {
        if let Ok(json) = serde_json::to_string(outcome) {
            debug!("{} outcome: {}", kind.as_str(), json);
        }
    }

    /// Log expired challenge cleanup
    pub fn log_challenges_purged(count: usize) {
        if count > 0 {
            debug!("Purged {} expired challenge(s)", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CeremonyKind::Registration.as_str(), "registration");
        assert_eq!(CeremonyKind::Authentication.as_str(), "authentication");
    }

    #[test]
    fn test_logging_without_logger_installed() {
        CeremonyLog::log_rejected(
            CeremonyKind::Authentication,
            &CeremonyError::CounterRegression {
                stored: 2,
                reported: 1,
            },
        );
        CeremonyLog::log_rejected(CeremonyKind::Authentication, &CeremonyError::SignatureInvalid);
        CeremonyLog::log_rejected(CeremonyKind::Registration, &CeremonyError::ChallengeExpired);
        CeremonyLog::log_outcome(
            CeremonyKind::Registration,
            &CeremonyOutcome::rejected(&CeremonyError::ChallengeExpired),
        );
    }
}
