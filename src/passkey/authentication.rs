//! Authentication ceremony
//!
//! Username-first flows scope the challenge to one user and list that user's
//! credentials; discoverable flows issue an unscoped challenge and learn the
//! user from the credential the authenticator picks. Either way the response
//! is only accepted for a credential the registry knows, signed with its
//! enrolled key, carrying a counter that moved forward.

use chrono::Utc;

use super::service::PasskeyService;
use super::types::{
    AuthenticationResult, CeremonyOutcome, CeremonyPhase, PasskeyCredential,
    PendingAuthentication,
};
use crate::utils::logging::{CeremonyKind, CeremonyLog};
use crate::webauthn::encoding;
use crate::webauthn::verifier;
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, CeremonyError, CredentialId, UserHandle,
};

impl PasskeyService {
    /// Begin an authentication ceremony.
    ///
    /// With `Some(user)` the options list the user's credentials; with `None`
    /// the allow list is empty and any discoverable credential may answer.
    ///
    /// # Errors
    /// Returns `UnknownCredential` if `user` has no registered credentials,
    /// `Storage` if either store fails
    pub async fn start_authentication(
        &self,
        user: Option<&UserHandle>,
    ) -> Result<(AuthenticationOptions, PendingAuthentication), CeremonyError> {
        let allowed = match user {
            Some(handle) => {
                let credentials = self.credentials.find_by_user(handle).await?;
                if credentials.is_empty() {
                    let err = CeremonyError::UnknownCredential;
                    CeremonyLog::log_rejected(CeremonyKind::Authentication, &err);
                    return Err(err);
                }
                credentials
            }
            None => Vec::new(),
        };

        let challenge = self.challenges.issue(user.cloned()).await?;

        let options = AuthenticationOptions {
            challenge: challenge.encoded(),
            timeout: self.settings.timeout_millis(),
            rp_id: self.settings.rp_id.clone(),
            allow_credentials: allowed.iter().map(PasskeyCredential::descriptor).collect(),
            user_verification: self.settings.user_verification,
        };

        let pending = PendingAuthentication {
            challenge: challenge.value,
            user: user.cloned(),
            allowed_credentials: allowed.into_iter().map(|c| c.credential_id).collect(),
            phase: CeremonyPhase::OptionsIssued,
            created_at: challenge.issued_at,
        };

        CeremonyLog::log_options_issued(
            CeremonyKind::Authentication,
            user,
            pending.allowed_credentials.len(),
        );
        Ok((options, pending))
    }

    /// Complete an authentication ceremony with the browser's assertion
    ///
    /// The challenge is consumed first; a replayed response therefore fails
    /// with `ChallengeAlreadyConsumed` before its counter is ever looked at.
    /// `pending.phase` ends as `Verified` or `Rejected`.
    ///
    /// # Errors
    /// Returns the specific `CeremonyError` of the first failed check;
    /// `CounterRegression` if the signature verified but the counter did not
    /// advance
    pub async fn finish_authentication(
        &self,
        pending: &mut PendingAuthentication,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationResult, CeremonyError> {
        pending.phase = CeremonyPhase::ResponseReceived;

        let result = self.verify_assertion_response(pending, response).await;

        match &result {
            Ok(authenticated) => {
                pending.phase = CeremonyPhase::Verified;
                CeremonyLog::log_authenticated(
                    &authenticated.user_handle,
                    &authenticated.credential_id,
                    authenticated.counter,
                );
            }
            Err(err) => {
                pending.phase = CeremonyPhase::Rejected;
                CeremonyLog::log_rejected(CeremonyKind::Authentication, err);
            }
        }
        CeremonyLog::log_outcome(
            CeremonyKind::Authentication,
            &CeremonyOutcome::from(&result),
        );

        result
    }

    async fn verify_assertion_response(
        &self,
        pending: &PendingAuthentication,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationResult, CeremonyError> {
        let challenge = self.challenges.consume(&pending.challenge).await?;
        if challenge.scope != pending.user {
            return Err(CeremonyError::ChallengeMismatch);
        }

        let credential_id = CredentialId(encoding::decode("raw id", &response.raw_id)?);
        let credential = self
            .credentials
            .find_by_id(&credential_id)
            .await?
            .ok_or(CeremonyError::UnknownCredential)?;

        check_credential_owner(pending, &credential, response)?;

        let verified = verifier::verify_assertion(
            response,
            &self.expected_binding(&pending.challenge),
            &credential.public_key,
            credential.algorithm,
        )?;

        let updated = self
            .credentials
            .update_counter(&credential_id, verified.sign_count)
            .await?;

        Ok(AuthenticationResult {
            credential_id,
            user_handle: updated.user_handle,
            counter: updated.counter,
            user_verified: verified.user_verified,
            authenticated_at: updated.last_used.unwrap_or_else(Utc::now),
        })
    }
}

/// The asserted credential must belong to the user the ceremony is for.
///
/// Username-first: it must be one of the offered credentials. Discoverable:
/// the authenticator must return the owner's user handle. A user handle
/// returned in a username-first flow must match too.
fn check_credential_owner(
    pending: &PendingAuthentication,
    credential: &PasskeyCredential,
    response: &AuthenticationResponse,
) -> Result<(), CeremonyError> {
    let returned_handle = response
        .response
        .user_handle
        .as_deref()
        .filter(|h| !h.is_empty())
        .map(|h| encoding::decode("user handle", h).map(UserHandle))
        .transpose()?;

    match (&pending.user, returned_handle) {
        (Some(user), returned) => {
            if &credential.user_handle != user
                || !pending.allowed_credentials.contains(&credential.credential_id)
                || returned.is_some_and(|h| &h != user)
            {
                return Err(CeremonyError::UnknownCredential);
            }
        }
        (None, Some(returned)) => {
            if returned != credential.user_handle {
                return Err(CeremonyError::UnknownCredential);
            }
        }
        (None, None) => return Err(CeremonyError::UnknownCredential),
    }

    Ok(())
}
