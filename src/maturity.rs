//! Maturity preference synchronizer
//!
//! Keeps the locally desired content rating in step with the rating the
//! server enforces. Every send bumps `request_id`; every reply bumps
//! `response_id`. Only a reply that brings the two counters level is acted
//! on, so replies to superseded requests are ignored without any locking.
//! The preference is *settled* while the counters are equal.

use crate::capability::{AccessPrefsBody, PreferenceRequest, PreferenceSender};
use crate::error::TeleportError;
use crate::session::Session;
use crate::types::MaturityRating;
use std::sync::Arc;

/// What a synchronizer step resulted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A request is on the wire
    InFlight,
    /// A reply arrived while newer requests are still outstanding
    Stale,
    /// Server and client agree
    Settled,
    /// The server disagreed; the request was sent again
    Retrying { attempt: u32, rating: MaturityRating },
    /// Gave up; the server's value wins
    Diverged {
        requested: MaturityRating,
        actual: MaturityRating,
    },
}

/// A send that could not leave the client
///
/// The failure path has already been applied, so `outcome` says whether the
/// preference ended up settled or diverged.
#[derive(Debug)]
pub struct SendRejected {
    pub error: TeleportError,
    pub outcome: SyncOutcome,
}

/// Tracks one agent's maturity preference exchange with the server
pub struct MaturitySynchronizer {
    session: Arc<dyn Session>,
    sender: Arc<dyn PreferenceSender>,
    capability: String,
    max_retries: u32,

    last_requested: MaturityRating,
    last_responded: MaturityRating,
    request_id: u64,
    response_id: u64,
    retry_count: u32,
}

impl MaturitySynchronizer {
    /// Start settled at the locally saved rating
    pub fn new(
        session: Arc<dyn Session>,
        sender: Arc<dyn PreferenceSender>,
        capability: impl Into<String>,
        max_retries: u32,
        initial: MaturityRating,
    ) -> Self {
        Self {
            session,
            sender,
            capability: capability.into(),
            max_retries,
            last_requested: initial,
            last_responded: initial,
            request_id: 0,
            response_id: 0,
            retry_count: 0,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.request_id == self.response_id
    }

    pub fn last_requested(&self) -> MaturityRating {
        self.last_requested
    }

    pub fn last_responded(&self) -> MaturityRating {
        self.last_responded
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn response_id(&self) -> u64 {
        self.response_id
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Send `value` to the server
    ///
    /// Fails synchronously when there is no region or the region has not
    /// granted the preference capability.
    pub fn send_preference(
        &mut self,
        value: MaturityRating,
    ) -> std::result::Result<SyncOutcome, SendRejected> {
        self.request_id += 1;
        self.last_requested = value;

        match self.session.capability_url(&self.capability) {
            Ok(url) => {
                tracing::info!(
                    rating = %value,
                    request_id = self.request_id,
                    url = %url,
                    "Sending maturity preference"
                );
                self.sender.post(PreferenceRequest {
                    url,
                    body: AccessPrefsBody::new(value),
                    requested: value,
                    previous: self.last_responded,
                });
                Ok(SyncOutcome::InFlight)
            }
            Err(error) => {
                tracing::warn!(rating = %value, error = %error, "Cannot send maturity preference");
                let outcome = self.handle_error();
                Err(SendRejected { error, outcome })
            }
        }
    }

    /// Apply a successful reply carrying the rating the server kept
    ///
    /// Fails only when a retry could not be sent; the rejection carries the
    /// outcome after the failure path ran.
    pub fn handle_result(
        &mut self,
        server: MaturityRating,
    ) -> std::result::Result<SyncOutcome, SendRejected> {
        if !self.count_response() {
            return Ok(SyncOutcome::Stale);
        }
        self.last_responded = server;

        if self.response_id != self.request_id {
            return Ok(SyncOutcome::Stale);
        }

        if self.last_requested == self.last_responded {
            self.retry_count = 0;
            tracing::debug!(rating = %server, "Maturity preference settled");
            return Ok(SyncOutcome::Settled);
        }

        self.retry_count += 1;
        if self.retry_count <= self.max_retries {
            let rating = self.last_requested;
            let attempt = self.retry_count;
            tracing::info!(attempt, rating = %rating, "Retrying maturity preference");
            self.send_preference(rating)?;
            return Ok(SyncOutcome::Retrying { attempt, rating });
        }

        self.retry_count = 0;
        Ok(SyncOutcome::Diverged {
            requested: self.last_requested,
            actual: self.last_responded,
        })
    }

    /// Apply a failed reply
    pub fn handle_error(&mut self) -> SyncOutcome {
        if !self.count_response() {
            return SyncOutcome::Stale;
        }
        if self.response_id != self.request_id {
            return SyncOutcome::Stale;
        }

        self.retry_count = 0;
        if self.last_requested == self.last_responded {
            tracing::warn!(
                rating = %self.last_requested,
                "Got an error but maturity preference seems to be in sync with the server"
            );
            SyncOutcome::Settled
        } else {
            SyncOutcome::Diverged {
                requested: self.last_requested,
                actual: self.last_responded,
            }
        }
    }

    fn count_response(&mut self) -> bool {
        if self.response_id >= self.request_id {
            tracing::warn!(
                request_id = self.request_id,
                "Maturity preference reply without an outstanding request"
            );
            return false;
        }
        self.response_id += 1;
        true
    }
}
