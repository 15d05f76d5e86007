//! Single-use challenge store
//!
//! Challenges are the only defence against replay of a captured ceremony
//! response, so `consume` is a check-and-set under one lock: of any number of
//! concurrent consumers of the same challenge exactly one succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use tokio::sync::Mutex;

use super::errors::ChallengeError;
use super::types::Challenge;
use crate::webauthn::{crypto, UserHandle};

/// Storage seam for challenges
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Create and record a fresh challenge, optionally scoped to a user
    ///
    /// # Errors
    /// Returns `Unavailable` if randomness or the backing store fails
    async fn issue(&self, scope: Option<UserHandle>) -> Result<Challenge, ChallengeError>;

    /// Atomically mark a challenge as used and return its row
    ///
    /// # Errors
    /// Returns `NotFound` for unknown challenges, `Expired` for challenges past
    /// their validity window and `AlreadyConsumed` for reused ones, checked in
    /// that order
    async fn consume(&self, value: &[u8]) -> Result<Challenge, ChallengeError>;

    /// Drop challenges past their validity window, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

/// In-process challenge store
pub struct InMemoryChallengeStore {
    ttl: Duration,
    length: usize,
    challenges: Mutex<HashMap<Vec<u8>, Challenge>>,
}

impl InMemoryChallengeStore {
    /// Create a store issuing `length`-byte challenges valid for `ttl`
    #[must_use]
    pub fn new(ttl: Duration, length: usize) -> Self {
        Self {
            ttl,
            length,
            challenges: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a challenge as if the current time were `now`
    ///
    /// Rows that expired more than one validity window before `now` are
    /// dropped under the same lock, so the map stays bounded without an
    /// explicit purge. Rows expired more recently are kept and still report
    /// `Expired`.
    ///
    /// # Errors
    /// Returns `Unavailable` if the system random source fails
    pub async fn issue_at(
        &self,
        scope: Option<UserHandle>,
        now: DateTime<Utc>,
    ) -> Result<Challenge, ChallengeError> {
        let value = crypto::random_bytes(self.length)
            .map_err(|e| ChallengeError::Unavailable(e.to_string()))?;

        let challenge = Challenge {
            value: value.clone(),
            scope,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };

        let mut challenges = self.challenges.lock().await;
        let stale_before = now - self.ttl;
        let before = challenges.len();
        challenges.retain(|_, existing| !existing.is_expired_at(stale_before));
        let reclaimed = before - challenges.len();
        if reclaimed > 0 {
            debug!("Reclaimed {reclaimed} stale challenges");
        }

        challenges.insert(value, challenge.clone());
        debug!("Issued challenge expiring at {}", challenge.expires_at);
        Ok(challenge)
    }

    /// Consume a challenge as if the current time were `now`
    ///
    /// # Errors
    /// See [`ChallengeStore::consume`]
    pub async fn consume_at(
        &self,
        value: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Challenge, ChallengeError> {
        let mut challenges = self.challenges.lock().await;
        let Some(challenge) = challenges.get_mut(value) else {
            return Err(ChallengeError::NotFound);
        };

        if challenge.is_expired_at(now) {
            return Err(ChallengeError::Expired);
        }

        if challenge.consumed {
            return Err(ChallengeError::AlreadyConsumed);
        }

        challenge.consumed = true;
        Ok(challenge.clone())
    }

    /// Purge challenges that expired before `now`
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut challenges = self.challenges.lock().await;
        let before = challenges.len();
        challenges.retain(|_, challenge| !challenge.is_expired_at(now));
        before - challenges.len()
    }

    /// Number of challenge rows currently held
    #[must_use]
    pub async fn len(&self) -> usize {
        self.challenges.lock().await.len()
    }

    /// Whether no challenge rows are held
    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.challenges.lock().await.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn issue(&self, scope: Option<UserHandle>) -> Result<Challenge, ChallengeError> {
        self.issue_at(scope, Utc::now()).await
    }

    async fn consume(&self, value: &[u8]) -> Result<Challenge, ChallengeError> {
        self.consume_at(value, Utc::now()).await
    }

    async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }
}
