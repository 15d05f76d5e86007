//! `WebAuthn` cryptography operations
//!
//! Random challenge material, SHA-256, and signature verification for the
//! three algorithms offered at registration.

use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use p256::EncodedPoint;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

use super::cbor::CredentialPublicKey;
use super::errors::CeremonyError;

/// Generate `len` bytes from the system CSPRNG
///
/// # Errors
/// Returns `Storage` if the operating system entropy source fails
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CeremonyError> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CeremonyError::Storage("System random source unavailable".to_string()))?;
    Ok(bytes)
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Verify `signature` over `message` with the given credential key.
///
/// ES256 signatures are ASN.1 DER, RS256 are PKCS#1 v1.5, Ed25519 are raw
/// 64-byte signatures, as produced by `WebAuthn` authenticators.
///
/// # Errors
/// Returns `SignatureInvalid` if the signature does not verify, and
/// `MalformedResponse` if the stored key material itself is unusable
pub fn verify_signature(
    key: &CredentialPublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CeremonyError> {
    match key {
        CredentialPublicKey::Ed25519 { x } => {
            signature::UnparsedPublicKey::new(&signature::ED25519, x)
                .verify(message, signature)
                .map_err(|_| CeremonyError::SignatureInvalid)
        }
        CredentialPublicKey::Es256 { x, y } => verify_es256(x, y, message, signature),
        CredentialPublicKey::Rs256 { n, e } => verify_rs256(n, e, message, signature),
    }
}

fn verify_es256(x: &[u8], y: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CeremonyError> {
    // Uncompressed SEC1 point: 0x04 || x || y
    let mut point_bytes = Vec::with_capacity(1 + x.len() + y.len());
    point_bytes.push(0x04);
    point_bytes.extend_from_slice(x);
    point_bytes.extend_from_slice(y);

    let encoded_point = EncodedPoint::from_bytes(&point_bytes)
        .map_err(|e| CeremonyError::malformed(format!("Invalid EC point: {e}")))?;
    let verifying_key = EcdsaVerifyingKey::from_encoded_point(&encoded_point)
        .map_err(|e| CeremonyError::malformed(format!("Invalid ECDSA key: {e}")))?;

    let signature =
        EcdsaSignature::from_der(signature).map_err(|_| CeremonyError::SignatureInvalid)?;

    // The verifier hashes the message with SHA-256 itself
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CeremonyError::SignatureInvalid)
}

fn verify_rs256(n: &[u8], e: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CeremonyError> {
    use rsa::signature::Verifier;

    let rsa_key = RsaPublicKey::new(rsa::BigUint::from_bytes_be(n), rsa::BigUint::from_bytes_be(e))
        .map_err(|e| CeremonyError::malformed(format!("Invalid RSA key: {e}")))?;
    let verifying_key = RsaVerifyingKey::<Sha256>::new(rsa_key);
    let signature = RsaSignature::try_from(signature).map_err(|_| CeremonyError::SignatureInvalid)?;

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CeremonyError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

    fn es256_key_pair() -> (EcdsaKeyPair, CredentialPublicKey) {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .unwrap();
        let point = pair.public_key().as_ref();
        let key = CredentialPublicKey::Es256 {
            x: point[1..33].to_vec(),
            y: point[33..65].to_vec(),
        };
        (pair, key)
    }

    #[test]
    fn test_random_bytes_have_requested_length() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_es256_signature_verifies() {
        let (pair, key) = es256_key_pair();
        let sig = pair.sign(&SystemRandom::new(), b"signed data").unwrap();

        assert!(verify_signature(&key, b"signed data", sig.as_ref()).is_ok());
        assert_eq!(
            verify_signature(&key, b"other data", sig.as_ref()),
            Err(CeremonyError::SignatureInvalid)
        );
    }

    #[test]
    fn test_ed25519_signature_verifies() {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let key = CredentialPublicKey::Ed25519 {
            x: pair.public_key().as_ref().to_vec(),
        };
        let sig = pair.sign(b"signed data");

        assert!(verify_signature(&key, b"signed data", sig.as_ref()).is_ok());
        let mut tampered = sig.as_ref().to_vec();
        tampered[0] ^= 0x01;
        assert_eq!(
            verify_signature(&key, b"signed data", &tampered),
            Err(CeremonyError::SignatureInvalid)
        );
    }

    #[test]
    fn test_signature_from_another_key_is_invalid() {
        let (pair, _) = es256_key_pair();
        let (_, other_key) = es256_key_pair();
        let sig = pair.sign(&SystemRandom::new(), b"signed data").unwrap();

        assert_eq!(
            verify_signature(&other_key, b"signed data", sig.as_ref()),
            Err(CeremonyError::SignatureInvalid)
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc")[..4],
            [0xba, 0x78, 0x16, 0xbf]
        );
    }
}
