//! Passkey ceremony data types
//!
//! Persisted rows (challenges, credentials), the per-ceremony state the caller
//! keeps between issuing options and receiving the response, and the results
//! handed back for audit logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webauthn::encoding;
use crate::webauthn::{
    AttestationType, AuthenticatorTransport, CeremonyError, CoseAlgorithm, CredentialId,
    CredentialPublicKey, PublicKeyCredentialDescriptor, PublicKeyCredentialType, UserHandle,
};

/// The identity a registration ceremony enrols a credential for
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub handle: UserHandle,
    pub name: String,         // Username or email
    pub display_name: String, // Shown by the authenticator UI
}

impl UserIdentity {
    #[must_use]
    pub fn new(handle: UserHandle, name: &str, display_name: &str) -> Self {
        Self {
            handle,
            name: name.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Single-use challenge row
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    #[serde(with = "encoding::base64url")]
    pub value: Vec<u8>,
    pub scope: Option<UserHandle>, // None for usernameless flows
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Challenge {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Base64URL form, as embedded in ceremony options
    #[must_use]
    pub fn encoded(&self) -> String {
        encoding::encode(&self.value)
    }
}

/// Credential row stored by the registry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PasskeyCredential {
    pub credential_id: CredentialId,
    pub user_handle: UserHandle,
    pub public_key: CredentialPublicKey,
    #[serde(with = "encoding::base64url")]
    pub cose_key: Vec<u8>, // COSE key as enrolled
    pub algorithm: CoseAlgorithm,
    pub counter: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl PasskeyCredential {
    /// Descriptor for allow/exclude lists
    #[must_use]
    pub fn descriptor(&self) -> PublicKeyCredentialDescriptor {
        PublicKeyCredentialDescriptor {
            r#type: PublicKeyCredentialType::PublicKey,
            id: self.credential_id.clone(),
            transports: self.transports.clone(),
        }
    }
}

/// Per-ceremony state machine
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyPhase {
    #[default]
    Started,
    OptionsIssued,
    ResponseReceived,
    Verified,
    Rejected,
}

impl CeremonyPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }
}

/// Registration state kept by the caller between start and finish
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PendingRegistration {
    #[serde(with = "encoding::base64url")]
    pub challenge: Vec<u8>,
    pub user: UserIdentity,
    pub offered_algorithms: Vec<CoseAlgorithm>,
    pub phase: CeremonyPhase,
    pub created_at: DateTime<Utc>,
}

/// Authentication state kept by the caller between start and finish
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PendingAuthentication {
    #[serde(with = "encoding::base64url")]
    pub challenge: Vec<u8>,
    pub user: Option<UserHandle>, // None for discoverable flows
    pub allowed_credentials: Vec<CredentialId>,
    pub phase: CeremonyPhase,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthentication {
    #[must_use]
    pub fn is_discoverable(&self) -> bool {
        self.user.is_none()
    }
}

/// Successful registration
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationResult {
    pub credential: PasskeyCredential,
    pub attestation_type: AttestationType,
}

/// Successful authentication
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub credential_id: CredentialId,
    pub user_handle: UserHandle,
    pub counter: u32, // Updated signature counter
    pub user_verified: bool,
    pub authenticated_at: DateTime<Utc>,
}

/// Tagged outcome of a finished ceremony, for the caller's audit log
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CeremonyOutcome {
    Verified {
        credential_id: CredentialId,
        counter: u32,
    },
    Rejected {
        reason: String,
        detail: String,
        security_event: bool,
    },
}

impl CeremonyOutcome {
    #[must_use]
    pub fn rejected(err: &CeremonyError) -> Self {
        Self::Rejected {
            reason: err.code().to_string(),
            detail: err.to_string(),
            security_event: err.is_security_event(),
        }
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

impl From<&Result<RegistrationResult, CeremonyError>> for CeremonyOutcome {
    fn from(result: &Result<RegistrationResult, CeremonyError>) -> Self {
        match result {
            Ok(registered) => Self::Verified {
                credential_id: registered.credential.credential_id.clone(),
                counter: registered.credential.counter,
            },
            Err(err) => Self::rejected(err),
        }
    }
}

impl From<&Result<AuthenticationResult, CeremonyError>> for CeremonyOutcome {
    fn from(result: &Result<AuthenticationResult, CeremonyError>) -> Self {
        match result {
            Ok(authenticated) => Self::Verified {
                credential_id: authenticated.credential_id.clone(),
                counter: authenticated.counter,
            },
            Err(err) => Self::rejected(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_outcome_serializes_reason_code() {
        let outcome = CeremonyOutcome::rejected(&CeremonyError::CounterRegression {
            stored: 4,
            reported: 3,
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "counter_regression");
        assert_eq!(json["security_event"], true);
    }

    #[test]
    fn test_verified_outcome_from_authentication() {
        let result: Result<AuthenticationResult, CeremonyError> = Ok(AuthenticationResult {
            credential_id: CredentialId(vec![1, 2, 3]),
            user_handle: UserHandle(vec![9; 32]),
            counter: 7,
            user_verified: true,
            authenticated_at: Utc::now(),
        });

        let outcome = CeremonyOutcome::from(&result);
        assert!(outcome.is_verified());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"status": "verified", "credential_id": "AQID", "counter": 7})
        );
    }

    #[test]
    fn test_terminal_phases() {
        assert!(CeremonyPhase::Verified.is_terminal());
        assert!(CeremonyPhase::Rejected.is_terminal());
        assert!(!CeremonyPhase::OptionsIssued.is_terminal());
    }
}
