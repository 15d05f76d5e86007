//! Registration ceremony
//!
//! `start_registration` issues a user-scoped challenge and the creation
//! options; `finish_registration` consumes that challenge, verifies the
//! attestation response and commits the new credential. Nothing is written
//! to the registry unless every check passes.

use chrono::Utc;

use super::service::PasskeyService;
use super::types::{
    CeremonyOutcome, CeremonyPhase, PasskeyCredential, PendingRegistration, RegistrationResult,
    UserIdentity,
};
use crate::utils::logging::{CeremonyKind, CeremonyLog};
use crate::webauthn::verifier;
use crate::webauthn::{
    AuthenticatorSelectionCriteria, AuthenticatorTransport, CeremonyError, CoseAlgorithm,
    CredentialId, PublicKeyCredentialParameters, PublicKeyCredentialType, RegistrationOptions,
    RegistrationResponse, RelyingParty, ResidentKeyRequirement, UserEntity,
};

// Upper bound on user.id imposed by the platform API
const MAX_USER_ID_LENGTH: usize = 64;

impl PasskeyService {
    /// Begin registering a credential for `user`
    ///
    /// The user's existing credentials are listed in `excludeCredentials` so an
    /// authenticator already enrolled for this account declines to enrol twice.
    ///
    /// # Errors
    /// Returns `Configuration` for an empty or oversized user handle, `Storage`
    /// if either store fails
    pub async fn start_registration(
        &self,
        user: &UserIdentity,
    ) -> Result<(RegistrationOptions, PendingRegistration), CeremonyError> {
        let handle_len = user.handle.as_bytes().len();
        if handle_len == 0 || handle_len > MAX_USER_ID_LENGTH {
            return Err(CeremonyError::Configuration(format!(
                "User handle must be 1 to {MAX_USER_ID_LENGTH} bytes, got {handle_len}"
            )));
        }

        let existing = self.credentials.find_by_user(&user.handle).await?;
        let challenge = self.challenges.issue(Some(user.handle.clone())).await?;
        let offered_algorithms = CoseAlgorithm::PREFERRED.to_vec();

        let options = RegistrationOptions {
            challenge: challenge.encoded(),
            rp: RelyingParty {
                id: self.settings.rp_id.clone(),
                name: self.settings.rp_name.clone(),
            },
            user: UserEntity {
                id: user.handle.clone(),
                name: user.name.clone(),
                display_name: user.display_name.clone(),
            },
            public_key_params: offered_algorithms
                .iter()
                .map(|&alg| PublicKeyCredentialParameters {
                    r#type: PublicKeyCredentialType::PublicKey,
                    alg,
                })
                .collect(),
            timeout: self.settings.timeout_millis(),
            attestation: self.settings.attestation,
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment,
                resident_key: self.settings.resident_key,
                require_resident_key: self.settings.resident_key
                    == ResidentKeyRequirement::Required,
                user_verification: self.settings.user_verification,
            },
            exclude_credentials: existing.iter().map(PasskeyCredential::descriptor).collect(),
        };

        let pending = PendingRegistration {
            challenge: challenge.value,
            user: user.clone(),
            offered_algorithms,
            phase: CeremonyPhase::OptionsIssued,
            created_at: challenge.issued_at,
        };

        CeremonyLog::log_options_issued(
            CeremonyKind::Registration,
            Some(&user.handle),
            options.exclude_credentials.len(),
        );
        Ok((options, pending))
    }

    /// Complete a registration ceremony with the browser's attestation response
    ///
    /// The challenge is consumed before anything else is checked, so a
    /// response can be submitted at most once whether or not it verifies.
    /// `pending.phase` ends as `Verified` or `Rejected`.
    ///
    /// # Errors
    /// Returns the specific `CeremonyError` of the first failed check;
    /// `DuplicateCredential` if the credential is already enrolled
    pub async fn finish_registration(
        &self,
        pending: &mut PendingRegistration,
        response: &RegistrationResponse,
    ) -> Result<RegistrationResult, CeremonyError> {
        pending.phase = CeremonyPhase::ResponseReceived;

        let result = self.verify_and_commit_registration(pending, response).await;

        match &result {
            Ok(registered) => {
                pending.phase = CeremonyPhase::Verified;
                CeremonyLog::log_registered(
                    &registered.credential.user_handle,
                    &registered.credential.credential_id,
                    &registered.credential.algorithm.to_string(),
                );
            }
            Err(err) => {
                pending.phase = CeremonyPhase::Rejected;
                CeremonyLog::log_rejected(CeremonyKind::Registration, err);
            }
        }
        CeremonyLog::log_outcome(CeremonyKind::Registration, &CeremonyOutcome::from(&result));

        result
    }

    async fn verify_and_commit_registration(
        &self,
        pending: &PendingRegistration,
        response: &RegistrationResponse,
    ) -> Result<RegistrationResult, CeremonyError> {
        let challenge = self.challenges.consume(&pending.challenge).await?;
        if challenge.scope.as_ref() != Some(&pending.user.handle) {
            return Err(CeremonyError::ChallengeMismatch);
        }

        let verified = verifier::verify_registration(
            response,
            &self.expected_binding(&pending.challenge),
            &pending.offered_algorithms,
            &self.settings.attestation_policy,
        )?;

        let credential = PasskeyCredential {
            credential_id: CredentialId(verified.credential_id),
            user_handle: pending.user.handle.clone(),
            algorithm: verified.public_key.algorithm(),
            public_key: verified.public_key,
            cose_key: verified.cose_key,
            counter: verified.sign_count,
            transports: parse_transports(&response.response.transports),
            backup_eligible: verified.backup_eligible,
            backup_state: verified.backup_state,
            created_at: Utc::now(),
            last_used: None,
        };

        self.credentials.insert(credential.clone()).await?;

        Ok(RegistrationResult {
            credential,
            attestation_type: verified.attestation_type,
        })
    }
}

/// Keep recognised transports in reported order, without repeats
fn parse_transports(reported: &[String]) -> Vec<AuthenticatorTransport> {
    let mut transports = Vec::new();
    for transport in reported.iter().filter_map(|t| t.parse::<AuthenticatorTransport>().ok()) {
        if !transports.contains(&transport) {
            transports.push(transport);
        }
    }
    transports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passkey::PasskeySettings;
    use crate::webauthn::UserHandle;

    fn service() -> PasskeyService {
        PasskeyService::new(PasskeySettings::default()).unwrap()
    }

    fn alice() -> UserIdentity {
        UserIdentity::new(UserHandle(vec![0xA1; 32]), "alice", "Alice")
    }

    #[test]
    fn test_parse_transports_drops_unknown_and_repeats() {
        let reported = vec![
            "internal".to_string(),
            "smoke-signal".to_string(),
            "hybrid".to_string(),
            "internal".to_string(),
        ];
        assert_eq!(
            parse_transports(&reported),
            vec![AuthenticatorTransport::Internal, AuthenticatorTransport::Hybrid]
        );
    }

    #[tokio::test]
    async fn test_start_registration_options() {
        let service = service();
        let (options, pending) = service.start_registration(&alice()).await.unwrap();

        assert_eq!(options.rp.id, "localhost");
        assert_eq!(options.user.id, alice().handle);
        assert_eq!(options.timeout, 60_000);
        assert!(options.exclude_credentials.is_empty());
        assert_eq!(
            options
                .public_key_params
                .iter()
                .map(|p| p.alg)
                .collect::<Vec<_>>(),
            vec![CoseAlgorithm::EdDsa, CoseAlgorithm::Es256, CoseAlgorithm::Rs256]
        );
        assert_eq!(pending.phase, CeremonyPhase::OptionsIssued);
        assert_eq!(crate::webauthn::encoding::encode(&pending.challenge), options.challenge);

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["pubKeyCredParams"][0]["alg"], -8);
        assert_eq!(json["authenticatorSelection"]["residentKey"], "preferred");
        assert_eq!(json["user"]["displayName"], "Alice");
    }

    #[tokio::test]
    async fn test_oversized_user_handle_rejected() {
        let user = UserIdentity::new(UserHandle(vec![1; 65]), "bob", "Bob");
        assert!(matches!(
            service().start_registration(&user).await,
            Err(CeremonyError::Configuration(_))
        ));
    }
}
