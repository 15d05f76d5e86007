//! `WebAuthn` attestation processing
//!
//! This module checks attestation statements against the configured policy.
//! Accepting `none` attestation means trusting the authenticator's key without
//! any proof of its make or model; it is listed explicitly in the policy rather
//! than implied.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use super::cbor::{self, AttestationObject, CredentialPublicKey};
use super::crypto;
use super::errors::CeremonyError;
use super::types::{AttestationFormat, CoseAlgorithm};

/// Which attestation formats registration accepts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationPolicy {
    pub accepted_formats: Vec<AttestationFormat>,
}

impl Default for AttestationPolicy {
    fn default() -> Self {
        Self {
            accepted_formats: vec![AttestationFormat::None, AttestationFormat::Packed],
        }
    }
}

/// How much the relying party learned about the authenticator
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationType {
    /// `none`: no statement at all
    None,
    /// `packed` without a certificate: signed by the credential key itself
    SelfAttestation,
}

/// Verify the attestation statement of a registration response
///
/// # Arguments
/// * `attestation` - The decoded attestation object
/// * `credential_key` - The credential public key from the attested data
/// * `client_data_hash` - SHA-256 of the raw client data JSON
/// * `policy` - The accepted attestation formats
///
/// # Errors
/// Returns `AttestationRejected` for formats outside the policy or malformed
/// statements, `AlgorithmMismatch` when a self-attestation is signed with a
/// different algorithm than the credential key, and `SignatureInvalid` when
/// the statement signature does not verify
pub fn verify_attestation_statement(
    attestation: &AttestationObject,
    credential_key: &CredentialPublicKey,
    client_data_hash: &[u8; 32],
    policy: &AttestationPolicy,
) -> Result<AttestationType, CeremonyError> {
    let format: AttestationFormat = attestation
        .fmt
        .parse()
        .map_err(CeremonyError::AttestationRejected)?;

    if !policy.accepted_formats.contains(&format) {
        return Err(CeremonyError::AttestationRejected(format!(
            "Attestation format {} is not accepted",
            attestation.fmt
        )));
    }

    match format {
        AttestationFormat::None => {
            if !attestation.att_stmt.is_empty() {
                return Err(CeremonyError::AttestationRejected(
                    "none attestation must carry an empty statement".to_string(),
                ));
            }
            Ok(AttestationType::None)
        }
        AttestationFormat::Packed => {
            verify_packed_self_attestation(attestation, credential_key, client_data_hash)
        }
        _ => Err(CeremonyError::AttestationRejected(format!(
            "Attestation format {} is not supported",
            attestation.fmt
        ))),
    }
}

fn verify_packed_self_attestation(
    attestation: &AttestationObject,
    credential_key: &CredentialPublicKey,
    client_data_hash: &[u8; 32],
) -> Result<AttestationType, CeremonyError> {
    let stmt = &attestation.att_stmt;

    // Full attestation needs trust anchors, which this relying party does not carry
    if cbor::text_entry(stmt, "x5c").is_some() {
        return Err(CeremonyError::AttestationRejected(
            "packed attestation with a certificate chain is not supported".to_string(),
        ));
    }

    let alg = cbor::text_entry(stmt, "alg")
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i128::from(i)).ok())
        .ok_or_else(|| {
            CeremonyError::AttestationRejected("packed statement missing alg".to_string())
        })?;
    let alg = CoseAlgorithm::try_from(alg).map_err(CeremonyError::AttestationRejected)?;

    if alg != credential_key.algorithm() {
        return Err(CeremonyError::algorithm_mismatch(credential_key.algorithm(), alg));
    }

    let Some(sig) = cbor::text_entry(stmt, "sig").and_then(Value::as_bytes) else {
        return Err(CeremonyError::AttestationRejected(
            "packed statement missing sig".to_string(),
        ));
    };

    let mut signed = Vec::with_capacity(attestation.auth_data.len() + client_data_hash.len());
    signed.extend_from_slice(&attestation.auth_data);
    signed.extend_from_slice(client_data_hash);

    crypto::verify_signature(credential_key, &signed, sig)?;
    Ok(AttestationType::SelfAttestation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(fmt: &str, att_stmt: Vec<(Value, Value)>) -> AttestationObject {
        AttestationObject {
            fmt: fmt.to_string(),
            att_stmt,
            auth_data: vec![0u8; 37],
        }
    }

    fn key() -> CredentialPublicKey {
        CredentialPublicKey::Es256 {
            x: vec![1; 32],
            y: vec![2; 32],
        }
    }

    #[test]
    fn test_none_attestation_accepted_by_default() {
        let result = verify_attestation_statement(
            &object("none", vec![]),
            &key(),
            &[0; 32],
            &AttestationPolicy::default(),
        );
        assert_eq!(result, Ok(AttestationType::None));
    }

    #[test]
    fn test_none_attestation_rejected_when_not_in_policy() {
        let policy = AttestationPolicy {
            accepted_formats: vec![AttestationFormat::Packed],
        };
        let result =
            verify_attestation_statement(&object("none", vec![]), &key(), &[0; 32], &policy);
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = verify_attestation_statement(
            &object("made-up", vec![]),
            &key(),
            &[0; 32],
            &AttestationPolicy::default(),
        );
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_packed_with_certificate_chain_rejected() {
        let stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![0; 70])),
            (Value::Text("x5c".into()), Value::Array(vec![Value::Bytes(vec![0; 10])])),
        ];
        let result = verify_attestation_statement(
            &object("packed", stmt),
            &key(),
            &[0; 32],
            &AttestationPolicy::default(),
        );
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_packed_with_foreign_algorithm_is_algorithm_mismatch() {
        let stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-257).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![0; 256])),
        ];
        let result = verify_attestation_statement(
            &object("packed", stmt),
            &key(),
            &[0; 32],
            &AttestationPolicy::default(),
        );
        assert_eq!(
            result,
            Err(CeremonyError::algorithm_mismatch(CoseAlgorithm::Es256, CoseAlgorithm::Rs256))
        );
    }
}
