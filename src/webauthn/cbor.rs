//! CBOR processing for `WebAuthn`
//!
//! This module handles the CBOR (Concise Binary Object Representation)
//! processing needed for attestation objects, authenticator data and COSE keys.

use ciborium::de::from_reader;
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use super::errors::CeremonyError;
use super::types::CoseAlgorithm;

/// Authenticator data flag bits
pub mod flags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;
}

// rpIdHash (32) + flags (1) + signCount (4)
const AUTH_DATA_MIN_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

// COSE_Key labels and values (RFC 9052 / RFC 9053)
const COSE_KTY: i128 = 1;
const COSE_ALG: i128 = 3;
const COSE_CRV_OR_N: i128 = -1;
const COSE_X_OR_E: i128 = -2;
const COSE_Y: i128 = -3;
const KTY_OKP: i128 = 1;
const KTY_EC2: i128 = 2;
const KTY_RSA: i128 = 3;
const CRV_P256: i128 = 1;
const CRV_ED25519: i128 = 6;

/// Algorithm-tagged public key material extracted from a COSE key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kty", rename_all = "lowercase")]
pub enum CredentialPublicKey {
    Ed25519 { x: Vec<u8> },
    Es256 { x: Vec<u8>, y: Vec<u8> },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CredentialPublicKey {
    /// The signature algorithm this key material is bound to
    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            Self::Ed25519 { .. } => CoseAlgorithm::EdDsa,
            Self::Es256 { .. } => CoseAlgorithm::Es256,
            Self::Rs256 { .. } => CoseAlgorithm::Rs256,
        }
    }
}

/// Attested credential data carried in registration authenticator data
#[derive(Clone, Debug)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    pub public_key: CredentialPublicKey,
    /// The COSE key exactly as the authenticator encoded it
    pub cose_key: Vec<u8>,
}

/// Parsed authenticator data
#[derive(Clone, Debug)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & flags::USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & flags::USER_VERIFIED != 0
    }

    #[must_use]
    pub fn backup_eligible(&self) -> bool {
        self.flags & flags::BACKUP_ELIGIBLE != 0
    }

    #[must_use]
    pub fn backup_state(&self) -> bool {
        self.flags & flags::BACKUP_STATE != 0
    }

    /// Parse the binary authenticator data structure
    ///
    /// The format is:
    /// - 32 bytes: RP ID hash
    /// - 1 byte: flags
    /// - 4 bytes: signature counter (big-endian)
    /// - variable: attested credential data (if the AT flag is set)
    ///   - 16 bytes: AAGUID
    ///   - 2 bytes: credential ID length (L)
    ///   - L bytes: credential ID
    ///   - variable: COSE public key
    /// - variable: extensions (if the ED flag is set)
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the data is truncated or the COSE key is invalid
    pub fn parse(auth_data: &[u8]) -> Result<Self, CeremonyError> {
        if auth_data.len() < AUTH_DATA_MIN_LEN {
            return Err(CeremonyError::malformed("Auth data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&auth_data[..32]);
        let flags = auth_data[32];
        let sign_count =
            u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);

        let attested_credential = if flags & flags::ATTESTED_CREDENTIAL_DATA == 0 {
            None
        } else {
            Some(parse_attested_credential(&auth_data[AUTH_DATA_MIN_LEN..], flags)?)
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }
}

fn parse_attested_credential(
    data: &[u8],
    flags: u8,
) -> Result<AttestedCredentialData, CeremonyError> {
    if data.len() < AAGUID_LEN + 2 {
        return Err(CeremonyError::malformed(
            "Auth data too short for credential ID length",
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&data[..AAGUID_LEN]);
    let mut pos = AAGUID_LEN;

    let id_len = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
    pos += 2;

    if data.len() < pos + id_len {
        return Err(CeremonyError::malformed("Auth data too short for credential ID"));
    }
    let credential_id = data[pos..pos + id_len].to_vec();
    pos += id_len;

    if data.len() <= pos {
        return Err(CeremonyError::malformed("Auth data too short for public key"));
    }

    // The COSE key is self-delimiting; whatever follows is extension data
    let mut remaining = &data[pos..];
    let before = remaining.len();
    let cose_value: Value = from_reader(&mut remaining)
        .map_err(|_| CeremonyError::malformed("Invalid COSE key format"))?;
    let consumed = before - remaining.len();

    if !remaining.is_empty() && flags & flags::EXTENSION_DATA == 0 {
        return Err(CeremonyError::malformed("Trailing bytes after credential public key"));
    }

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key: parse_cose_key(&cose_value)?,
        cose_key: data[pos..pos + consumed].to_vec(),
    })
}

/// Decoded attestation object
#[derive(Clone, Debug)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: Vec<u8>,
}

/// Parse a CBOR attestation object (`fmt`, `attStmt`, `authData`)
///
/// # Errors
/// Returns `MalformedResponse` if the CBOR is invalid or a member is missing
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, CeremonyError> {
    let attestation: Value = from_reader(bytes)
        .map_err(|_| CeremonyError::malformed("Invalid CBOR attestation format"))?;

    let Some(map) = attestation.as_map() else {
        return Err(CeremonyError::malformed("Attestation object is not a map"));
    };

    let member = |name: &str| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    };

    let Some(fmt) = member("fmt").and_then(Value::as_text) else {
        return Err(CeremonyError::malformed("Missing fmt in attestation"));
    };
    let Some(auth_data) = member("authData").and_then(Value::as_bytes) else {
        return Err(CeremonyError::malformed("Missing authData in attestation"));
    };
    let Some(att_stmt) = member("attStmt").and_then(Value::as_map) else {
        return Err(CeremonyError::malformed("Missing attStmt in attestation"));
    };

    Ok(AttestationObject {
        fmt: fmt.to_string(),
        att_stmt: att_stmt.clone(),
        auth_data: auth_data.clone(),
    })
}

/// Look up an integer label in a CBOR map
pub(crate) fn int_entry(map: &[(Value, Value)], label: i128) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().is_some_and(|i| i128::from(i) == label))
        .map(|(_, v)| v)
}

/// Look up a text label in a CBOR map
pub(crate) fn text_entry<'a>(map: &'a [(Value, Value)], label: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(label))
        .map(|(_, v)| v)
}

fn int_value(value: Option<&Value>) -> Option<i128> {
    value.and_then(Value::as_integer).map(i128::from)
}

fn bytes_value(map: &[(Value, Value)], label: i128, what: &str) -> Result<Vec<u8>, CeremonyError> {
    int_entry(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| CeremonyError::malformed(format!("Missing or invalid {what}")))
}

/// Turn a COSE key into typed key material.
///
/// The key type, curve and declared algorithm have to agree; a key declaring
/// an algorithm its key type cannot produce is an algorithm mismatch.
///
/// # Errors
/// Returns `MalformedResponse` for structurally invalid keys and
/// `AlgorithmMismatch` for inconsistent or unsupported algorithms
pub fn parse_cose_key(value: &Value) -> Result<CredentialPublicKey, CeremonyError> {
    let Some(map) = value.as_map() else {
        return Err(CeremonyError::malformed("COSE key is not a map"));
    };

    let kty = int_value(int_entry(map, COSE_KTY))
        .ok_or_else(|| CeremonyError::malformed("Missing or invalid key type"))?;
    let alg_id = int_value(int_entry(map, COSE_ALG))
        .ok_or_else(|| CeremonyError::malformed("Missing or invalid key algorithm"))?;
    let alg = i64::try_from(alg_id)
        .ok()
        .and_then(|id| CoseAlgorithm::try_from(id).ok())
        .ok_or_else(|| CeremonyError::AlgorithmMismatch {
            expected: "EdDSA, ES256 or RS256".to_string(),
            actual: alg_id.to_string(),
        })?;

    let key = match kty {
        KTY_OKP => {
            if int_value(int_entry(map, COSE_CRV_OR_N)) != Some(CRV_ED25519) {
                return Err(CeremonyError::malformed("Unsupported OKP curve"));
            }
            let x = bytes_value(map, COSE_X_OR_E, "Ed25519 public key")?;
            if x.len() != 32 {
                return Err(CeremonyError::malformed("Ed25519 public key must be 32 bytes"));
            }
            CredentialPublicKey::Ed25519 { x }
        }
        KTY_EC2 => {
            if int_value(int_entry(map, COSE_CRV_OR_N)) != Some(CRV_P256) {
                return Err(CeremonyError::malformed("Unsupported EC2 curve"));
            }
            let x = bytes_value(map, COSE_X_OR_E, "x coordinate")?;
            let y = bytes_value(map, COSE_Y, "y coordinate")?;
            if x.len() != 32 || y.len() != 32 {
                return Err(CeremonyError::malformed("P-256 coordinates must be 32 bytes"));
            }
            CredentialPublicKey::Es256 { x, y }
        }
        KTY_RSA => CredentialPublicKey::Rs256 {
            n: bytes_value(map, COSE_CRV_OR_N, "RSA modulus")?,
            e: bytes_value(map, COSE_X_OR_E, "RSA exponent")?,
        },
        other => {
            return Err(CeremonyError::malformed(format!("Unsupported key type {other}")));
        }
    };

    if key.algorithm() != alg {
        return Err(CeremonyError::algorithm_mismatch(key.algorithm(), alg));
    }

    Ok(key)
}

/// Encode typed key material back into a COSE key
#[must_use]
pub fn encode_cose_key(key: &CredentialPublicKey) -> Vec<u8> {
    let int = |i: i128| Value::Integer(i64::try_from(i).unwrap_or_default().into());
    let entries = match key {
        CredentialPublicKey::Ed25519 { x } => vec![
            (int(COSE_KTY), int(KTY_OKP)),
            (int(COSE_ALG), Value::Integer(CoseAlgorithm::EdDsa.id().into())),
            (int(COSE_CRV_OR_N), int(CRV_ED25519)),
            (int(COSE_X_OR_E), Value::Bytes(x.clone())),
        ],
        CredentialPublicKey::Es256 { x, y } => vec![
            (int(COSE_KTY), int(KTY_EC2)),
            (int(COSE_ALG), Value::Integer(CoseAlgorithm::Es256.id().into())),
            (int(COSE_CRV_OR_N), int(CRV_P256)),
            (int(COSE_X_OR_E), Value::Bytes(x.clone())),
            (int(COSE_Y), Value::Bytes(y.clone())),
        ],
        CredentialPublicKey::Rs256 { n, e } => vec![
            (int(COSE_KTY), int(KTY_RSA)),
            (int(COSE_ALG), Value::Integer(CoseAlgorithm::Rs256.id().into())),
            (int(COSE_CRV_OR_N), Value::Bytes(n.clone())),
            (int(COSE_X_OR_E), Value::Bytes(e.clone())),
        ],
    };

    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = ciborium::ser::into_writer(&Value::Map(entries), &mut out);
    out
}
