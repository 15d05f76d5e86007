//! Software authenticator
//!
//! Produces real attestation and assertion responses, signed with ring keys,
//! for driving both ceremonies end to end without a browser.

use base64::{engine::general_purpose, Engine as _};
use ciborium::value::Value;
use ring::rand::SystemRandom;
use ring::rsa::PublicKeyComponents;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    RSA_PKCS1_SHA256,
};

use crate::webauthn::cbor::{self, flags};
use crate::webauthn::crypto;
use crate::webauthn::encoding;
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, CoseAlgorithm, CredentialId, CredentialPublicKey,
    PublicKeyCredentialType, RegistrationOptions, RegistrationResponse, UserHandle,
};

// 2048-bit test key; ring cannot generate RSA keys
const RSA_TEST_KEY_PKCS8: &str = "\
MIIEvQIBADANBgkqhkiG9w0BAQEFAASCBKcwggSjAgEAAoIBAQDJs3aoSqUyX6z4\
t3I/6V6e83kJf7tOnomF1j18Nu93f9KlVMkbVN5zNpz4WXLMqa60cLNwl4ugi/vv\
wqtCHW9y6kVK5+kUjkG5FQ5FN8jBLyB1ciqDP+bAWsWMiqvb3jU0DmXNygj6o4CA\
vhP9y9DpanmpaNeIy0IiglaGQkPeyQRHlg/NMn3Ouk2ieMRmJozK2FBH8VgXQudf\
GLuzWMF2E3Mp7+eaKbk1hbps+r+bOZsdlfG6jtTDcSdQd6qSK456U6rzPWehJ/YK\
kpZQZ5/p2AnWrwSTm10HpGpy0N7/OChLedHUsGW3JUE/bsGtw81Nu21bzRw1LrRh\
EJ9XIdrjAgMBAAECggEAHB9HCIDb1pGrasQdDFcr56qXsiDai0QkdYIg8XwxWC58\
vqt7HLHxEAxJx4ClNm7kGmlqQ2UFxT0vQ8cXHLFA9DtArQh3oXOSK02Jv1HfTjwV\
YPqpfcI/mIsvZwCApLevIFJvlEk6hkOcq5aU7/pmZtz/GIUzI/H/BxO4H6EGmH2c\
EwrUqZ8nfGcvv2YmPqbvhAuXGkpygbXBCsJKyNq0a07IXymDvlJv1am/Oy72Ww+X\
mWjUyzJ/VdtqHIQMZsEeFCNQ7qAcBSzmO99LBZp326zWI5uxeGqt0hcddW8Jv7FF\
rmW8GsAZBFuTJwPr9629IYzfelZi6ewfSIlLg87HfQKBgQDqhfKGfmd5m8JTLkzq\
7wnJBLxu+Mtx6LFB/hkkR2i3VPxVfnYTkYojZ2oWEeFwcMGpdLeNZHP4Ah5/Ywh1\
EEt55rBCtS6NW/FBCfWyHqNR2NnNiFJZFiKfFdTHUMzb2wXGcZaCw3GGDi5Vo8EA\
mGPgjAU8PBpuarPFzB0QoUTL7wKBgQDcLAw98ejklLokUmoVe2TReXP5PQ/iSIE8\
Pzca1BpdXZ02ITQ89bF4IgdjnKNJ+3HGoFqKfnC+6GKACLfJsRGFICErwbEly224\
RdAJzzD7UN12KVtkl2y3Xf+O1WelxS20/8S6mEPaZOj7XWVqlHq6VUKRPgP5uIVK\
0kqIciO8TQKBgQCQkEz1VsnWDot01t+XGg5AGWlGRpqx9qv9b/JziIkmKX75/GAw\
o9AxDrg4LoF23CqkmEvlHnzV7gh6ocM+1fKQjAEuvZyaiohmfQs05unps/BeX5/T\
Rm/E/KIS0t3U0Gf48V/D71H1PpyVMcHw6f73FZjMjogEdEWosa9g5ugPhQKBgH5O\
srMyvXWssOC3eu5Z/KuDbnnUgvFAwQssBNPaTEm1s8Pi5pH2LVqKwwxtRuvhWRMm\
2OpMwSd0L1XeKnmFoFRr6zusAZF6E7a8Li4Cc8opSPNJpImfqRnEziBF4xEhfigw\
9s5JHdwDOflCSjULeyC8WtTx69vt9GHJJEMEn+WdAoGAU4TXnSqfh/6NnExK8laz\
/aTnt7bpaejIlBwrZoxDo9ZXE97Ye2ShNMxO6y/BzcdGiHyBZuqMUd5iZKcwVBbb\
/AjyqXqYvmfdfNHamodICMudvCBF7mcYAddmGXIefw9pBnUrUAlwM0zpXVhjW187\
C2I699/o2DKvtnYkumd363A=";

const SOFT_AAGUID: [u8; 16] = *b"soft-authentic8r";

enum Signer {
    Ed25519(Ed25519KeyPair),
    Es256(EcdsaKeyPair),
    Rs256(RsaKeyPair),
}

/// Attestation statement the authenticator emits on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftAttestation {
    None,
    PackedSelf,
}

/// In-process authenticator holding one credential
pub struct SoftAuthenticator {
    signer: Signer,
    public_key: CredentialPublicKey,
    credential_id: Vec<u8>,
    user_handle: Option<UserHandle>,
    counter: u32,
    counter_step: u32,
    attestation: SoftAttestation,
    user_verified: bool,
    backup_eligible: bool,
    transports: Vec<String>,
    rng: SystemRandom,
}

impl SoftAuthenticator {
    /// Create an authenticator with a fresh key for `algorithm`
    ///
    /// # Panics
    /// Panics if key generation fails
    #[must_use]
    pub fn new(algorithm: CoseAlgorithm) -> Self {
        let rng = SystemRandom::new();
        let (signer, public_key) = match algorithm {
            CoseAlgorithm::EdDsa => {
                let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate Ed25519 key");
                let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("load Ed25519 key");
                let key = CredentialPublicKey::Ed25519 {
                    x: pair.public_key().as_ref().to_vec(),
                };
                (Signer::Ed25519(pair), key)
            }
            CoseAlgorithm::Es256 => {
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                    .expect("generate P-256 key");
                let pair =
                    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                        .expect("load P-256 key");
                // Uncompressed point: 0x04 || x || y
                let point = pair.public_key().as_ref();
                let key = CredentialPublicKey::Es256 {
                    x: point[1..33].to_vec(),
                    y: point[33..65].to_vec(),
                };
                (Signer::Es256(pair), key)
            }
            CoseAlgorithm::Rs256 => {
                let der = general_purpose::STANDARD
                    .decode(RSA_TEST_KEY_PKCS8)
                    .expect("decode RSA test key");
                let pair = RsaKeyPair::from_pkcs8(&der).expect("load RSA test key");
                let components = PublicKeyComponents::<Vec<u8>>::from(pair.public());
                let key = CredentialPublicKey::Rs256 {
                    n: components.n,
                    e: components.e,
                };
                (Signer::Rs256(pair), key)
            }
        };

        Self {
            signer,
            public_key,
            credential_id: crypto::random_bytes(16).expect("credential id"),
            user_handle: None,
            counter: 0,
            counter_step: 1,
            attestation: SoftAttestation::None,
            user_verified: true,
            backup_eligible: false,
            transports: vec!["internal".to_string(), "hybrid".to_string()],
            rng,
        }
    }

    /// Emit `packed` self-attestation instead of `none`
    #[must_use]
    pub fn with_packed_attestation(mut self) -> Self {
        self.attestation = SoftAttestation::PackedSelf;
        self
    }

    /// Behave like an authenticator without a signature counter
    #[must_use]
    pub fn without_counter(mut self) -> Self {
        self.counter_step = 0;
        self
    }

    /// Report the user-verified flag as unset
    #[must_use]
    pub fn without_user_verification(mut self) -> Self {
        self.user_verified = false;
        self
    }

    /// Report the credential as backup eligible and backed up (synced passkey)
    #[must_use]
    pub fn synced(mut self) -> Self {
        self.backup_eligible = true;
        self
    }

    /// Reuse another authenticator's credential id (for duplicate enrolment)
    #[must_use]
    pub fn with_credential_id(mut self, credential_id: &CredentialId) -> Self {
        self.credential_id = credential_id.as_bytes().to_vec();
        self
    }

    #[must_use]
    pub fn credential_id(&self) -> CredentialId {
        CredentialId(self.credential_id.clone())
    }

    #[must_use]
    pub fn public_key(&self) -> &CredentialPublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        self.public_key.algorithm()
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Overwrite the internal counter, e.g. to model a cloned authenticator
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    /// Answer `navigator.credentials.create()` for the given options
    ///
    /// # Panics
    /// Panics if signing fails
    pub fn register(
        &mut self,
        options: &RegistrationOptions,
        origin: &str,
    ) -> RegistrationResponse {
        self.user_handle = Some(options.user.id.clone());

        let client_data = client_data_json("webauthn.create", &options.challenge, origin);

        let mut attested = Vec::new();
        attested.extend_from_slice(&SOFT_AAGUID);
        let id_len = u16::try_from(self.credential_id.len()).expect("credential id length");
        attested.extend_from_slice(&id_len.to_be_bytes());
        attested.extend_from_slice(&self.credential_id);
        attested.extend_from_slice(&cbor::encode_cose_key(&self.public_key));

        let auth_data = self.authenticator_data(
            &options.rp.id,
            flags::ATTESTED_CREDENTIAL_DATA,
            Some(&attested),
        );

        let att_stmt = match self.attestation {
            SoftAttestation::None => Vec::new(),
            SoftAttestation::PackedSelf => {
                let signature = self.sign(&signed_payload(&auth_data, &client_data));
                vec![
                    (
                        Value::Text("alg".to_string()),
                        Value::Integer(self.algorithm().id().into()),
                    ),
                    (Value::Text("sig".to_string()), Value::Bytes(signature)),
                ]
            }
        };
        let fmt = match self.attestation {
            SoftAttestation::None => "none",
            SoftAttestation::PackedSelf => "packed",
        };

        let attestation_object = Value::Map(vec![
            (Value::Text("fmt".to_string()), Value::Text(fmt.to_string())),
            (Value::Text("attStmt".to_string()), Value::Map(att_stmt)),
            (Value::Text("authData".to_string()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation_object, &mut attestation_bytes)
            .expect("encode attestation object");

        let id = encoding::encode(&self.credential_id);
        RegistrationResponse {
            id: id.clone(),
            raw_id: id,
            response: AuthenticatorAttestationResponse {
                client_data_json: encoding::encode(&client_data),
                attestation_object: encoding::encode(&attestation_bytes),
                transports: self.transports.clone(),
            },
            client_extension_results: None,
            r#type: PublicKeyCredentialType::PublicKey,
        }
    }

    /// Answer `navigator.credentials.get()`, advancing the signature counter
    ///
    /// # Panics
    /// Panics if signing fails
    pub fn assert(
        &mut self,
        options: &AuthenticationOptions,
        origin: &str,
    ) -> AuthenticationResponse {
        self.counter = self.counter.wrapping_add(self.counter_step);

        let client_data = client_data_json("webauthn.get", &options.challenge, origin);
        let auth_data = self.authenticator_data(&options.rp_id, 0, None);
        let signature = self.sign(&signed_payload(&auth_data, &client_data));

        let id = encoding::encode(&self.credential_id);
        AuthenticationResponse {
            id: id.clone(),
            raw_id: id,
            response: AuthenticatorAssertionResponse {
                client_data_json: encoding::encode(&client_data),
                authenticator_data: encoding::encode(&auth_data),
                signature: encoding::encode(&signature),
                user_handle: self
                    .user_handle
                    .as_ref()
                    .map(|h| encoding::encode(h.as_bytes())),
            },
            client_extension_results: None,
            r#type: PublicKeyCredentialType::PublicKey,
        }
    }

    fn authenticator_data(&self, rp_id: &str, extra_flags: u8, attested: Option<&[u8]>) -> Vec<u8> {
        let mut flag_bits = flags::USER_PRESENT | extra_flags;
        if self.user_verified {
            flag_bits |= flags::USER_VERIFIED;
        }
        if self.backup_eligible {
            flag_bits |= flags::BACKUP_ELIGIBLE | flags::BACKUP_STATE;
        }

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&crypto::sha256(rp_id.as_bytes()));
        data.push(flag_bits);
        data.extend_from_slice(&self.counter.to_be_bytes());
        if let Some(attested) = attested {
            data.extend_from_slice(attested);
        }
        data
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.signer {
            Signer::Ed25519(pair) => pair.sign(message).as_ref().to_vec(),
            Signer::Es256(pair) => pair
                .sign(&self.rng, message)
                .expect("ECDSA signing")
                .as_ref()
                .to_vec(),
            Signer::Rs256(pair) => {
                let mut signature = vec![0u8; pair.public().modulus_len()];
                pair.sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
                    .expect("RSA signing");
                signature
            }
        }
    }
}

fn client_data_json(ceremony_type: &str, challenge: &str, origin: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": ceremony_type,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false,
    }))
    .expect("serialize client data")
}

fn signed_payload(auth_data: &[u8], client_data: &[u8]) -> Vec<u8> {
    let mut payload = auth_data.to_vec();
    payload.extend_from_slice(&crypto::sha256(client_data));
    payload
}

/// Flip one bit of a base64url field, e.g. a signature
///
/// # Panics
/// Panics if `field` is not valid base64url
#[must_use]
pub fn tamper(field: &str) -> String {
    let mut bytes = encoding::decode("field", field).expect("base64url field");
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
    encoding::encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_keys_match_algorithm() {
        for alg in CoseAlgorithm::PREFERRED {
            let authenticator = SoftAuthenticator::new(alg);
            assert_eq!(authenticator.algorithm(), alg);
        }
    }

    #[test]
    fn test_signatures_verify_with_engine() {
        for alg in CoseAlgorithm::PREFERRED {
            let authenticator = SoftAuthenticator::new(alg);
            let signature = authenticator.sign(b"payload");
            assert!(
                crypto::verify_signature(authenticator.public_key(), b"payload", &signature).is_ok()
            );
        }
    }

    #[test]
    fn test_rsa_key_exposes_modulus_and_exponent() {
        let authenticator = SoftAuthenticator::new(CoseAlgorithm::Rs256);
        let CredentialPublicKey::Rs256 { n, e } = authenticator.public_key() else {
            panic!("expected an RSA key");
        };

        assert_eq!(n.len(), 256);
        assert_ne!(n[0], 0);
        assert_eq!(e, &vec![0x01, 0x00, 0x01]);
    }
}
