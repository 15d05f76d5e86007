//! Relying party settings
//!
//! This module defines the per-deployment settings the passkey ceremonies run
//! under. A `PasskeySettings` value is passed explicitly into the service, so
//! tests and multi-tenant callers can run several configurations side by side.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::webauthn::{
    AttestationConveyancePreference, AttestationPolicy, AuthenticatorAttachment, CeremonyError,
    ResidentKeyRequirement, UserVerificationRequirement,
};

pub const MIN_CHALLENGE_LENGTH: usize = 16;
pub const MIN_USER_HANDLE_LENGTH: usize = 32;
pub const MAX_USER_HANDLE_LENGTH: usize = 64;
pub const MIN_CHALLENGE_TTL_SECONDS: u64 = 30;
pub const MAX_CHALLENGE_TTL_SECONDS: u64 = 600;

/// Passkey settings for `WebAuthn` ceremonies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PasskeySettings {
    pub rp_id: String,
    pub rp_name: String,
    /// Exact origin browsers report in client data, e.g. `https://login.example.com`
    pub rp_origin: String,
    /// Timeout advertised to the browser in ceremony options
    pub timeout_seconds: u64,
    /// How long an issued challenge stays redeemable
    pub challenge_ttl_seconds: u64,
    pub challenge_length: usize,
    pub user_handle_length: usize,
    pub user_verification: UserVerificationRequirement,
    pub resident_key: ResidentKeyRequirement,
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub attestation: AttestationConveyancePreference,
    pub attestation_policy: AttestationPolicy,
    /// Accept client data carrying `crossOrigin: true` (embedded iframes)
    pub allow_cross_origin: bool,
}

impl Default for PasskeySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Passkey Demo".to_string(),
            rp_origin: "http://localhost:4000".to_string(),
            timeout_seconds: 60,
            challenge_ttl_seconds: 60,
            challenge_length: 32,
            user_handle_length: 32,
            user_verification: UserVerificationRequirement::Preferred,
            resident_key: ResidentKeyRequirement::Preferred,
            authenticator_attachment: None,
            attestation: AttestationConveyancePreference::None,
            attestation_policy: AttestationPolicy::default(),
            allow_cross_origin: false,
        }
    }
}

impl PasskeySettings {
    /// Check the settings describe a usable relying party
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if:
    /// - The RP ID is empty
    /// - The origin is not `https://` (plain `http://` only for `localhost`)
    /// - The origin's host is neither the RP ID nor a subdomain of it
    /// - Challenge, user handle or timeout values are out of range
    pub fn validate(&self) -> Result<(), CeremonyError> {
        if self.rp_id.trim().is_empty() {
            return Err(config_error("RP ID cannot be empty"));
        }

        self.validate_origin()?;

        if self.challenge_length < MIN_CHALLENGE_LENGTH {
            return Err(config_error(format!(
                "Challenge length must be at least {MIN_CHALLENGE_LENGTH} bytes"
            )));
        }

        if !(MIN_USER_HANDLE_LENGTH..=MAX_USER_HANDLE_LENGTH).contains(&self.user_handle_length) {
            return Err(config_error(format!(
                "User handle length must be between {MIN_USER_HANDLE_LENGTH} and {MAX_USER_HANDLE_LENGTH} bytes"
            )));
        }

        if !(MIN_CHALLENGE_TTL_SECONDS..=MAX_CHALLENGE_TTL_SECONDS)
            .contains(&self.challenge_ttl_seconds)
        {
            return Err(config_error(format!(
                "Challenge TTL must be between {MIN_CHALLENGE_TTL_SECONDS} and {MAX_CHALLENGE_TTL_SECONDS} seconds"
            )));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_CHALLENGE_TTL_SECONDS {
            return Err(config_error(format!(
                "Ceremony timeout must be between 1 and {MAX_CHALLENGE_TTL_SECONDS} seconds"
            )));
        }

        if self.attestation_policy.accepted_formats.is_empty() {
            return Err(config_error("Attestation policy must accept at least one format"));
        }

        Ok(())
    }

    fn validate_origin(&self) -> Result<(), CeremonyError> {
        let origin = Url::parse(&self.rp_origin)
            .map_err(|e| config_error(format!("Invalid RP origin {}: {e}", self.rp_origin)))?;

        // Client data carries the serialized origin, so the configured value
        // must already be in that form (no path, no trailing slash)
        if origin.origin().ascii_serialization() != self.rp_origin {
            return Err(config_error(format!(
                "RP origin must be a bare origin such as https://{}",
                self.rp_id
            )));
        }

        let host = origin.host_str().unwrap_or_default();
        match origin.scheme() {
            "https" => {}
            "http" if host == "localhost" => {}
            _ => {
                return Err(config_error(
                    "RP origin must use https:// (http:// is only allowed for localhost)",
                ))
            }
        }

        if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
            return Err(config_error(format!(
                "RP origin host {host} is not {} or a subdomain of it",
                self.rp_id
            )));
        }

        Ok(())
    }

    /// Ceremony timeout in milliseconds, as sent to the browser
    #[must_use]
    pub fn timeout_millis(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }

    /// Deadline applied to a whole ceremony future
    #[must_use]
    pub fn ceremony_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Validity window of an issued challenge
    #[must_use]
    pub fn challenge_ttl(&self) -> chrono::Duration {
        i64::try_from(self.challenge_ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::seconds(600))
    }
}

fn config_error(msg: impl Into<String>) -> CeremonyError {
    CeremonyError::Configuration(msg.into())
}
