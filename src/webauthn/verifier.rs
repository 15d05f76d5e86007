//! `WebAuthn` response verification
//!
//! Shared by both ceremonies. Checks run in a fixed order so the reported
//! reason is deterministic: client data type, challenge, origin, RP ID hash,
//! authenticator flags, then attestation (registration) or signature
//! (authentication).

use super::attestation::{self, AttestationPolicy, AttestationType};
use super::cbor::{self, AuthenticatorData, CredentialPublicKey};
use super::crypto;
use super::encoding;
use super::errors::CeremonyError;
use super::types::{
    AuthenticationResponse, CollectedClientData, CoseAlgorithm, RegistrationResponse,
    UserVerificationRequirement,
};

const TYPE_CREATE: &str = "webauthn.create";
const TYPE_GET: &str = "webauthn.get";

/// What a response has to be bound to
#[derive(Debug, Clone)]
pub struct ExpectedBinding<'a> {
    pub challenge: &'a [u8],
    pub origin: &'a str,
    pub rp_id: &'a str,
    pub user_verification: UserVerificationRequirement,
    pub allow_cross_origin: bool,
}

/// Output of a verified attestation response
#[derive(Debug, Clone)]
pub struct VerifiedRegistration {
    pub credential_id: Vec<u8>,
    pub public_key: CredentialPublicKey,
    pub cose_key: Vec<u8>,
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub user_verified: bool,
    pub attestation_type: AttestationType,
}

/// Output of a verified assertion response
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub user_verified: bool,
}

/// Verify an attestation (registration) response
///
/// # Errors
/// Returns the first failed check as a specific `CeremonyError`
pub fn verify_registration(
    response: &RegistrationResponse,
    expected: &ExpectedBinding<'_>,
    offered_algorithms: &[CoseAlgorithm],
    policy: &AttestationPolicy,
) -> Result<VerifiedRegistration, CeremonyError> {
    let client_data_bytes = encoding::decode("client data", &response.response.client_data_json)?;
    verify_client_data(&client_data_bytes, TYPE_CREATE, expected)?;

    let attestation_bytes =
        encoding::decode("attestation object", &response.response.attestation_object)?;
    let attestation = cbor::parse_attestation_object(&attestation_bytes)?;
    let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
    verify_auth_data(&auth_data, expected)?;

    let Some(attested) = auth_data.attested_credential.as_ref() else {
        return Err(CeremonyError::malformed("No attested credential data"));
    };

    // rawId is what the browser reports; it must name the attested credential
    let raw_id = encoding::decode("raw id", &response.raw_id)?;
    if raw_id != attested.credential_id {
        return Err(CeremonyError::malformed(
            "Credential ID does not match attested credential data",
        ));
    }

    let algorithm = attested.public_key.algorithm();
    if !offered_algorithms.contains(&algorithm) {
        return Err(CeremonyError::AlgorithmMismatch {
            expected: offered_algorithms
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            actual: algorithm.to_string(),
        });
    }

    let client_data_hash = crypto::sha256(&client_data_bytes);
    let attestation_type = attestation::verify_attestation_statement(
        &attestation,
        &attested.public_key,
        &client_data_hash,
        policy,
    )?;

    Ok(VerifiedRegistration {
        credential_id: attested.credential_id.clone(),
        public_key: attested.public_key.clone(),
        cose_key: attested.cose_key.clone(),
        sign_count: auth_data.sign_count,
        backup_eligible: auth_data.backup_eligible(),
        backup_state: auth_data.backup_state(),
        user_verified: auth_data.user_verified(),
        attestation_type,
    })
}

/// Verify an assertion (authentication) response against a stored key
///
/// `enrolled_algorithm` is the algorithm recorded at registration; key
/// material for any other algorithm is refused before signature checking.
///
/// # Errors
/// Returns the first failed check as a specific `CeremonyError`
pub fn verify_assertion(
    response: &AuthenticationResponse,
    expected: &ExpectedBinding<'_>,
    public_key: &CredentialPublicKey,
    enrolled_algorithm: CoseAlgorithm,
) -> Result<VerifiedAssertion, CeremonyError> {
    let client_data_bytes = encoding::decode("client data", &response.response.client_data_json)?;
    verify_client_data(&client_data_bytes, TYPE_GET, expected)?;

    let auth_data_bytes =
        encoding::decode("authenticator data", &response.response.authenticator_data)?;
    let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
    verify_auth_data(&auth_data, expected)?;

    if public_key.algorithm() != enrolled_algorithm {
        return Err(CeremonyError::algorithm_mismatch(
            enrolled_algorithm,
            public_key.algorithm(),
        ));
    }

    let signature = encoding::decode("signature", &response.response.signature)?;

    // Concatenate authenticator data and client data hash to create message
    let client_data_hash = crypto::sha256(&client_data_bytes);
    let mut signed = Vec::with_capacity(auth_data_bytes.len() + client_data_hash.len());
    signed.extend_from_slice(&auth_data_bytes);
    signed.extend_from_slice(&client_data_hash);

    crypto::verify_signature(public_key, &signed, &signature)?;

    Ok(VerifiedAssertion {
        sign_count: auth_data.sign_count,
        backup_eligible: auth_data.backup_eligible(),
        backup_state: auth_data.backup_state(),
        user_verified: auth_data.user_verified(),
    })
}

/// Verify client data JSON: type, then challenge, then origin
fn verify_client_data(
    client_data_bytes: &[u8],
    expected_type: &str,
    expected: &ExpectedBinding<'_>,
) -> Result<CollectedClientData, CeremonyError> {
    let client_data: CollectedClientData = serde_json::from_slice(client_data_bytes)
        .map_err(|_| CeremonyError::malformed("Invalid client data JSON"))?;

    if client_data.r#type != expected_type {
        return Err(CeremonyError::ClientDataTypeMismatch {
            expected: expected_type.to_string(),
            actual: client_data.r#type,
        });
    }

    // Compare decoded bytes, not strings, so padding variants do not matter
    let challenge = encoding::decode("challenge", &client_data.challenge)
        .map_err(|_| CeremonyError::ChallengeMismatch)?;
    if challenge != expected.challenge {
        return Err(CeremonyError::ChallengeMismatch);
    }

    // Exact equality only; no prefix, suffix or case folding
    if client_data.origin != expected.origin {
        return Err(CeremonyError::OriginMismatch {
            expected: expected.origin.to_string(),
            actual: client_data.origin,
        });
    }

    if client_data.cross_origin == Some(true) && !expected.allow_cross_origin {
        return Err(CeremonyError::OriginMismatch {
            expected: expected.origin.to_string(),
            actual: format!("{} (cross-origin)", client_data.origin),
        });
    }

    Ok(client_data)
}

/// Verify RP ID hash and the user presence / verification flags
fn verify_auth_data(
    auth_data: &AuthenticatorData,
    expected: &ExpectedBinding<'_>,
) -> Result<(), CeremonyError> {
    if auth_data.rp_id_hash != crypto::sha256(expected.rp_id.as_bytes()) {
        return Err(CeremonyError::RpIdMismatch);
    }

    if !auth_data.user_present() {
        return Err(CeremonyError::UserPresenceMissing);
    }

    if expected.user_verification == UserVerificationRequirement::Required
        && !auth_data.user_verified()
    {
        return Err(CeremonyError::UserVerificationMissing);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::constants::TEST_ORIGIN;
    use crate::testing::{SoftAuthenticator, TestFixtures};
    use crate::webauthn::cbor::flags;
    use crate::webauthn::types::AuthenticationOptions;

    fn binding(challenge: &[u8]) -> ExpectedBinding<'_> {
        ExpectedBinding {
            challenge,
            origin: "https://example.com",
            rp_id: "example.com",
            user_verification: UserVerificationRequirement::Preferred,
            allow_cross_origin: false,
        }
    }

    fn client_data(r#type: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": r#type,
            "challenge": encoding::encode(challenge),
            "origin": origin,
        }))
        .unwrap()
    }

    #[test]
    fn test_client_data_accepts_exact_binding() {
        let data = client_data(TYPE_GET, b"challenge-bytes!", "https://example.com");
        assert!(verify_client_data(&data, TYPE_GET, &binding(b"challenge-bytes!")).is_ok());
    }

    #[test]
    fn test_client_data_type_checked() {
        let data = client_data(TYPE_CREATE, b"challenge-bytes!", "https://example.com");
        assert!(matches!(
            verify_client_data(&data, TYPE_GET, &binding(b"challenge-bytes!")),
            Err(CeremonyError::ClientDataTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_challenge_checked_before_origin() {
        let data = client_data(TYPE_GET, b"other-challenge!", "https://evil.example");
        assert_eq!(
            verify_client_data(&data, TYPE_GET, &binding(b"challenge-bytes!")).unwrap_err(),
            CeremonyError::ChallengeMismatch
        );
    }

    #[test]
    fn test_origin_prefix_and_suffix_variants_rejected() {
        for origin in [
            "https://example.com.evil.net",
            "https://example.co",
            "https://example.com/",
            "http://example.com",
            "https://EXAMPLE.com",
        ] {
            let data = client_data(TYPE_GET, b"challenge-bytes!", origin);
            assert!(
                matches!(
                    verify_client_data(&data, TYPE_GET, &binding(b"challenge-bytes!")),
                    Err(CeremonyError::OriginMismatch { .. })
                ),
                "origin {origin} should be rejected"
            );
        }
    }

    #[test]
    fn test_cross_origin_rejected_unless_allowed() {
        let data = serde_json::to_vec(&serde_json::json!({
            "type": TYPE_GET,
            "challenge": encoding::encode(b"challenge-bytes!"),
            "origin": "https://example.com",
            "crossOrigin": true,
        }))
        .unwrap();

        let mut expected = binding(b"challenge-bytes!");
        assert!(matches!(
            verify_client_data(&data, TYPE_GET, &expected),
            Err(CeremonyError::OriginMismatch { .. })
        ));

        expected.allow_cross_origin = true;
        assert!(verify_client_data(&data, TYPE_GET, &expected).is_ok());
    }

    #[test]
    fn test_auth_data_checks() {
        let mut auth_data = AuthenticatorData {
            rp_id_hash: crypto::sha256(b"example.com"),
            flags: flags::USER_PRESENT,
            sign_count: 0,
            attested_credential: None,
        };
        let mut expected = binding(b"c");
        assert!(verify_auth_data(&auth_data, &expected).is_ok());

        expected.user_verification = UserVerificationRequirement::Required;
        assert_eq!(
            verify_auth_data(&auth_data, &expected),
            Err(CeremonyError::UserVerificationMissing)
        );

        auth_data.flags = 0;
        assert_eq!(
            verify_auth_data(&auth_data, &expected),
            Err(CeremonyError::UserPresenceMissing)
        );

        auth_data.rp_id_hash = crypto::sha256(b"example.org");
        assert_eq!(
            verify_auth_data(&auth_data, &expected),
            Err(CeremonyError::RpIdMismatch)
        );
    }

    #[test]
    fn test_assertion_refuses_key_of_other_algorithm() {
        let challenge = b"challenge-bytes!";
        let options = AuthenticationOptions {
            challenge: encoding::encode(challenge),
            timeout: 60_000,
            rp_id: "example.com".to_string(),
            allow_credentials: vec![],
            user_verification: UserVerificationRequirement::Preferred,
        };
        let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);
        let response = authenticator.assert(&options, TEST_ORIGIN);

        assert_eq!(
            verify_assertion(
                &response,
                &binding(challenge),
                authenticator.public_key(),
                CoseAlgorithm::EdDsa,
            )
            .unwrap_err(),
            CeremonyError::AlgorithmMismatch {
                expected: CoseAlgorithm::EdDsa.to_string(),
                actual: CoseAlgorithm::Es256.to_string(),
            }
        );

        let verified = verify_assertion(
            &response,
            &binding(challenge),
            authenticator.public_key(),
            CoseAlgorithm::Es256,
        )
        .unwrap();
        assert_eq!(verified.sign_count, 1);
    }

    #[tokio::test]
    async fn test_registration_refuses_algorithm_not_offered() {
        let service = TestFixtures::service();
        let (options, _) = service
            .start_registration(&TestFixtures::user("alice"))
            .await
            .unwrap();
        let challenge = encoding::decode("challenge", &options.challenge).unwrap();
        let response = SoftAuthenticator::new(CoseAlgorithm::Es256).register(&options, TEST_ORIGIN);
        let policy = AttestationPolicy::default();

        let result = verify_registration(
            &response,
            &binding(&challenge),
            &[CoseAlgorithm::EdDsa, CoseAlgorithm::Rs256],
            &policy,
        );
        assert!(matches!(
            result,
            Err(CeremonyError::AlgorithmMismatch { ref actual, .. })
                if *actual == CoseAlgorithm::Es256.to_string()
        ));

        let verified = verify_registration(
            &response,
            &binding(&challenge),
            &[CoseAlgorithm::Es256],
            &policy,
        )
        .unwrap();
        assert_eq!(verified.public_key.algorithm(), CoseAlgorithm::Es256);
    }
}
