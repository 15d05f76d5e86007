//! `WebAuthn` core types
//!
//! Option structures sent to the browser credential API, raw responses coming
//! back from it, and the small enumerations shared by both. Field names follow
//! the camelCase JSON shape of the platform API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::crypto;
use super::encoding;
use super::errors::CeremonyError;

/// Opaque credential identifier chosen by the authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CredentialId(#[serde(with = "encoding::base64url")] pub Vec<u8>);

impl CredentialId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode(&self.0))
    }
}

/// Stable random user handle, never derived from PII
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserHandle(#[serde(with = "encoding::base64url")] pub Vec<u8>);

impl UserHandle {
    /// Generate a fresh random handle of `len` bytes
    ///
    /// # Errors
    /// Returns `Storage` if the system random source fails
    pub fn generate(len: usize) -> Result<Self, CeremonyError> {
        crypto::random_bytes(len).map(Self)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode(&self.0))
    }
}

/// COSE algorithm identifiers accepted by this relying party
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    /// `EdDSA` over Ed25519 (-8)
    EdDsa,
    /// ECDSA P-256 with SHA-256 (-7)
    Es256,
    /// RSASSA-PKCS1-v1_5 with SHA-256 (-257)
    Rs256,
}

impl CoseAlgorithm {
    /// Preference order advertised in `pubKeyCredParams`
    pub const PREFERRED: [CoseAlgorithm; 3] = [Self::EdDsa, Self::Es256, Self::Rs256];

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::EdDsa => -8,
            Self::Es256 => -7,
            Self::Rs256 => -257,
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = String;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        match id {
            -8 => Ok(Self::EdDsa),
            -7 => Ok(Self::Es256),
            -257 => Ok(Self::Rs256),
            other => Err(format!("unsupported COSE algorithm {other}")),
        }
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EdDsa => "EdDSA",
            Self::Es256 => "ES256",
            Self::Rs256 => "RS256",
        })
    }
}

/// Credential type; the platform API only knows one
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PublicKeyCredentialType {
    #[default]
    #[serde(rename = "public-key")]
    PublicKey,
}

/// Transport hints reported by the authenticator
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
}

impl FromStr for AuthenticatorTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "internal" => Ok(Self::Internal),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown transport {other}")),
        }
    }
}

/// User verification preference
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl FromStr for UserVerificationRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(format!("unknown user verification requirement {other}")),
        }
    }
}

/// Resident (discoverable) key preference
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

/// Optional restriction on where the authenticator lives
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    #[serde(rename = "platform")]
    Platform,
    #[serde(rename = "cross-platform")]
    CrossPlatform,
}

/// Attestation conveyance preference sent in registration options
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

/// Attestation statement formats this relying party can recognise
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationFormat {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "packed")]
    Packed,
    #[serde(rename = "fido-u2f")]
    FidoU2f,
    #[serde(rename = "tpm")]
    Tpm,
    #[serde(rename = "android-key")]
    AndroidKey,
    #[serde(rename = "android-safetynet")]
    AndroidSafetynet,
    #[serde(rename = "apple")]
    Apple,
}

impl FromStr for AttestationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "packed" => Ok(Self::Packed),
            "fido-u2f" => Ok(Self::FidoU2f),
            "tpm" => Ok(Self::Tpm),
            "android-key" => Ok(Self::AndroidKey),
            "android-safetynet" => Ok(Self::AndroidSafetynet),
            "apple" => Ok(Self::Apple),
            other => Err(format!("unknown attestation format {other}")),
        }
    }
}

/// `WebAuthn` relying party information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,   // Domain name (e.g., "example.com")
    pub name: String, // Display name
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    pub id: UserHandle, // Base64URL-encoded user handle
    pub name: String,   // Username (e.g., email)
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: PublicKeyCredentialType,
    pub alg: CoseAlgorithm,
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(rename = "residentKey")]
    pub resident_key: ResidentKeyRequirement,
    // Level 1 clients only understand the boolean
    #[serde(rename = "requireResidentKey")]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerificationRequirement,
}

/// Public key credential descriptor used in allow/exclude lists
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: PublicKeyCredentialType,
    pub id: CredentialId,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transports: Vec<AuthenticatorTransport>,
}

/// `WebAuthn` registration options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationOptions {
    pub challenge: String, // Base64URL-encoded random challenge
    pub rp: RelyingParty,
    pub user: UserEntity,
    #[serde(rename = "pubKeyCredParams")]
    pub public_key_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u32, // Timeout in milliseconds
    pub attestation: AttestationConveyancePreference,
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// `WebAuthn` authentication options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticationOptions {
    pub challenge: String, // Base64URL-encoded random challenge
    pub timeout: u32,      // Timeout in milliseconds
    #[serde(rename = "rpId")]
    pub rp_id: String,
    // Empty for discoverable (usernameless) flows
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerificationRequirement,
}

/// Registration response from client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationResponse {
    pub id: String, // Base64URL-encoded credential ID
    #[serde(rename = "rawId")]
    pub raw_id: String,
    pub response: AuthenticatorAttestationResponse,
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub r#type: PublicKeyCredentialType,
}

/// Authentication response from client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticationResponse {
    pub id: String, // Base64URL-encoded credential ID
    #[serde(rename = "rawId")]
    pub raw_id: String,
    pub response: AuthenticatorAssertionResponse,
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub r#type: PublicKeyCredentialType,
}

/// Authenticator attestation response during registration
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    // Raw strings from getTransports(); unknown values are dropped on registration
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Authenticator assertion response during authentication
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", default)]
    pub user_handle: Option<String>,
}

/// Client data collected by the browser and hashed into the signature
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub r#type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithms_serialize_as_cose_ids() {
        let params: Vec<PublicKeyCredentialParameters> = CoseAlgorithm::PREFERRED
            .iter()
            .map(|alg| PublicKeyCredentialParameters {
                r#type: PublicKeyCredentialType::PublicKey,
                alg: *alg,
            })
            .collect();

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"type": "public-key", "alg": -8},
                {"type": "public-key", "alg": -7},
                {"type": "public-key", "alg": -257}
            ])
        );
    }

    #[test]
    fn test_unsupported_algorithm_does_not_deserialize() {
        assert!(serde_json::from_str::<CoseAlgorithm>("-35").is_err());
        assert_eq!(
            serde_json::from_str::<CoseAlgorithm>("-257").unwrap(),
            CoseAlgorithm::Rs256
        );
    }

    #[test]
    fn test_selection_omits_missing_attachment() {
        let selection = AuthenticatorSelectionCriteria {
            authenticator_attachment: None,
            resident_key: ResidentKeyRequirement::Preferred,
            require_resident_key: false,
            user_verification: UserVerificationRequirement::Preferred,
        };

        let json = serde_json::to_value(&selection).unwrap();
        assert!(json.get("authenticatorAttachment").is_none());
        assert_eq!(json["residentKey"], "preferred");
    }

    #[test]
    fn test_assertion_response_parses_browser_json() {
        let json = r#"{
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AA",
                "signature": "AA",
                "userHandle": null
            }
        }"#;

        let response: AuthenticationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.raw_id, "AQID");
        assert!(response.response.user_handle.is_none());
        assert!(response.client_extension_results.is_none());
    }

    #[test]
    fn test_credential_id_serializes_as_base64url() {
        let id = CredentialId(vec![0xfb, 0xff]);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"-_8\"");
        assert_eq!(id.to_string(), "-_8");
    }
}
