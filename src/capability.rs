//! Capability HTTP plumbing for the maturity preference exchange
//!
//! The synchronizer hands a `PreferenceRequest` to a `PreferenceSender` and
//! forgets about it; the reply comes back later as a `PreferenceReply`.
//! `CapabilityClient` is the async HTTP seam the service-side sender uses.

use crate::error::{Result, TeleportError};
use crate::types::MaturityRating;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// `{"access_prefs": {"max": "<short>"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPrefsBody {
    pub access_prefs: AccessPrefs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPrefs {
    pub max: String,
}

impl AccessPrefsBody {
    pub fn new(rating: MaturityRating) -> Self {
        Self {
            access_prefs: AccessPrefs {
                max: rating.short_str().to_string(),
            },
        }
    }
}

/// Extract the rating the server kept from a capability response
///
/// Anything missing or malformed decodes to `Min`.
pub fn parse_access_prefs(content: &serde_json::Value) -> MaturityRating {
    content
        .get("access_prefs")
        .and_then(|prefs| prefs.get("max"))
        .and_then(|max| max.as_str())
        .map(MaturityRating::from_short)
        .unwrap_or(MaturityRating::Min)
}

/// One outbound preference update
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceRequest {
    pub url: String,
    pub body: AccessPrefsBody,
    /// Rating being asked for
    pub requested: MaturityRating,
    /// Rating the server last confirmed
    pub previous: MaturityRating,
}

/// Outcome of a preference update, as delivered back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceReply {
    Confirmed {
        requested: MaturityRating,
        previous: MaturityRating,
        actual: MaturityRating,
    },
    Failed {
        requested: MaturityRating,
        previous: MaturityRating,
        reason: String,
    },
}

/// Fire-and-forget sender for preference updates
pub trait PreferenceSender: Send + Sync {
    fn post(&self, request: PreferenceRequest);
}

/// Async JSON-over-HTTP client for region capabilities
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    /// POST `body` to `url` and return the decoded response
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// `CapabilityClient` over reqwest
pub struct HttpCapabilityClient {
    client: reqwest::Client,
}

impl HttpCapabilityClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TeleportError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CapabilityClient for HttpCapabilityClient {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TeleportError::Http(format!("{}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| TeleportError::Http(format!("{}: {}", url, e)))?;

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TeleportError::Http(format!("{}: invalid response body: {}", url, e)))
    }
}

/// Perform one preference exchange and turn the result into a reply
pub async fn exchange_preference(
    client: &dyn CapabilityClient,
    request: &PreferenceRequest,
) -> PreferenceReply {
    let body = match serde_json::to_value(&request.body) {
        Ok(body) => body,
        Err(e) => {
            return PreferenceReply::Failed {
                requested: request.requested,
                previous: request.previous,
                reason: e.to_string(),
            }
        }
    };

    match client.post_json(&request.url, &body).await {
        Ok(content) => {
            let actual = parse_access_prefs(&content);
            if actual != request.requested {
                tracing::warn!(
                    previous = %request.previous,
                    requested = %request.requested,
                    actual = %actual,
                    response = %content,
                    "Server kept a different maturity preference"
                );
            }
            PreferenceReply::Confirmed {
                requested: request.requested,
                previous: request.previous,
                actual,
            }
        }
        Err(e) => {
            tracing::warn!(
                previous = %request.previous,
                requested = %request.requested,
                error = %e,
                "Maturity preference update failed"
            );
            PreferenceReply::Failed {
                requested: request.requested,
                previous: request.previous,
                reason: e.to_string(),
            }
        }
    }
}

/// Records preference requests instead of sending them
#[derive(Default)]
pub struct RecordingPreferenceSender {
    requests: Mutex<Vec<PreferenceRequest>>,
}

impl RecordingPreferenceSender {
    /// Requests posted so far
    pub fn requests(&self) -> Vec<PreferenceRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreferenceSender for RecordingPreferenceSender {
    fn post(&self, request: PreferenceRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
    }
}
