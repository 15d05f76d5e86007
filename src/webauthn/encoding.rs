//! Base64URL helpers for the byte fields that cross the JSON boundary

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::errors::CeremonyError;

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a named base64url field of an authenticator response.
///
/// Browsers emit unpadded base64url, but some client libraries pad; trailing
/// `=` is tolerated.
///
/// # Errors
/// Returns `MalformedResponse` naming the field if it is not base64url
pub fn decode(field: &str, value: &str) -> Result<Vec<u8>, CeremonyError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| CeremonyError::malformed(format!("Invalid {field} encoding")))
}

/// Serde adapter storing `Vec<u8>` as a base64url string
pub mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode("bytes", &encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tolerates_padding() {
        assert_eq!(decode("challenge", "AQI").unwrap(), vec![1, 2]);
        assert_eq!(decode("challenge", "AQI=").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_decode_names_the_field() {
        let err = decode("signature", "not base64!").unwrap_err();
        assert_eq!(
            err,
            CeremonyError::MalformedResponse("Invalid signature encoding".to_string())
        );
    }
}
