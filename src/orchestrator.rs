//! Teleport orchestrator
//!
//! Owns the active teleport request and the teleport state, and serializes
//! dispatch against the maturity preference exchange: no teleport message
//! is sent while the preference is unsettled. Requests that arrive while it
//! is unsettled are parked in `Pending` and dispatched on the settle
//! notification.
//!
//! All methods take `&mut self` and are driven from one logical thread,
//! either directly by the host's update loop or by [`crate::service`].

use crate::access::AgentAccess;
use crate::capability::{PreferenceReply, PreferenceSender};
use crate::config::TeleportConfig;
use crate::error::{Result, TeleportError};
use crate::maturity::{MaturitySynchronizer, SendRejected, SyncOutcome};
use crate::notify::{Notification, Notifier};
use crate::request::TeleportRequest;
use crate::session::{RegionInfo, Session};
use crate::state::PreferenceStore;
use crate::types::{MaturityRating, RequestStatus, SourceLocation, TeleportMessage, TeleportState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Called once per completed teleport
///
/// Used for per-region probes that must run after every arrival, such as
/// checking which marketplace capability the destination offers.
pub trait ArrivalHook: Send + Sync {
    fn on_arrival(&self, region: Option<&RegionInfo>);
}

/// Point-in-time view of the orchestrator, for UIs and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleportSnapshot {
    pub state: TeleportState,
    pub active: Option<TeleportRequest>,
    pub canceled: Option<TeleportRequest>,
    pub preference_settled: bool,
    pub last_requested: MaturityRating,
    pub last_responded: MaturityRating,
    pub keeps_look_at: bool,
    pub display_in_progress: bool,
    pub teleport_count: u64,
    pub source: Option<SourceLocation>,
    pub message: String,
}

/// Teleport state machine for one agent session
pub struct TeleportOrchestrator {
    session: Arc<dyn Session>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn PreferenceStore>,
    arrival_hook: Option<Arc<dyn ArrivalHook>>,
    sync: MaturitySynchronizer,
    access: AgentAccess,

    state: TeleportState,
    active: Option<TeleportRequest>,
    canceled: Option<TeleportRequest>,
    keeps_look_at: bool,
    display_in_progress: bool,
    /// Rating raised for the current teleport, announced on completion
    rating_change: Option<MaturityRating>,
    message: String,
    source: Option<SourceLocation>,
    teleport_count: u64,
}

impl TeleportOrchestrator {
    /// Create an orchestrator for a new session
    ///
    /// The desired rating is read from `store`; an empty store starts at
    /// general.
    pub fn new(
        config: &TeleportConfig,
        session: Arc<dyn Session>,
        sender: Arc<dyn PreferenceSender>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self> {
        let initial = store.load()?.unwrap_or(MaturityRating::Pg);
        let sync = MaturitySynchronizer::new(
            session.clone(),
            sender,
            config.preference_capability.clone(),
            config.max_preference_retries,
            initial,
        );

        tracing::debug!(rating = %initial, "Teleport orchestrator created");

        Ok(Self {
            session,
            notifier,
            store,
            arrival_hook: None,
            sync,
            access: AgentAccess::new(initial),
            state: TeleportState::None,
            active: None,
            canceled: None,
            keeps_look_at: false,
            display_in_progress: false,
            rating_change: None,
            message: String::new(),
            source: None,
            teleport_count: 0,
        })
    }

    /// Set account access attributes; the preferred rating stays the stored one
    pub fn with_access(mut self, access: AgentAccess) -> Self {
        let preferred = self.access.preferred;
        self.access = AgentAccess { preferred, ..access };
        self
    }

    pub fn with_arrival_hook(mut self, hook: Arc<dyn ArrivalHook>) -> Self {
        self.arrival_hook = Some(hook);
        self
    }

    // ─── Accessors ───────────────────────────────────────────────────

    /// Current teleport state; a failed request reads as `None`
    pub fn state(&self) -> TeleportState {
        if self.active_status() == Some(RequestStatus::Failed) {
            TeleportState::None
        } else {
            self.state
        }
    }

    pub fn active_request(&self) -> Option<&TeleportRequest> {
        self.active.as_ref()
    }

    pub fn canceled_request(&self) -> Option<&TeleportRequest> {
        self.canceled.as_ref()
    }

    pub fn keeps_look_at(&self) -> bool {
        self.keeps_look_at
    }

    /// Whether the progress screen should be up
    pub fn display_in_progress(&self) -> bool {
        self.display_in_progress
    }

    pub fn teleport_count(&self) -> u64 {
        self.teleport_count
    }

    pub fn source_location(&self) -> Option<SourceLocation> {
        self.source
    }

    pub fn teleport_message(&self) -> &str {
        &self.message
    }

    pub fn set_teleport_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn synchronizer(&self) -> &MaturitySynchronizer {
        &self.sync
    }

    pub fn access(&self) -> &AgentAccess {
        &self.access
    }

    pub fn snapshot(&self) -> TeleportSnapshot {
        TeleportSnapshot {
            state: self.state(),
            active: self.active.clone(),
            canceled: self.canceled.clone(),
            preference_settled: self.sync.is_settled(),
            last_requested: self.sync.last_requested(),
            last_responded: self.sync.last_responded(),
            keeps_look_at: self.keeps_look_at,
            display_in_progress: self.display_in_progress,
            teleport_count: self.teleport_count,
            source: self.source,
            message: self.message.clone(),
        }
    }

    fn active_status(&self) -> Option<RequestStatus> {
        self.active.as_ref().map(|r| r.status)
    }

    /// Whether a request is waiting to be (re)dispatched
    pub fn has_pending_request(&self) -> bool {
        matches!(
            self.active_status(),
            Some(RequestStatus::Pending | RequestStatus::RestartPending)
        )
    }

    pub fn has_restartable_failed_request(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|r| r.status == RequestStatus::Failed && r.can_restart())
    }

    // ─── State transitions ───────────────────────────────────────────

    /// Apply a progress transition reported by the session layer
    ///
    /// Late messages for a request already marked failed are ignored.
    pub fn set_state(&mut self, state: TeleportState) {
        if state != TeleportState::None && self.active_status() == Some(RequestStatus::Failed) {
            tracing::warn!(
                state = ?state,
                "Attempt to set teleport state for previously failed teleport; ignored"
            );
            return;
        }

        self.state = state;
        match state {
            TeleportState::None => {
                self.keeps_look_at = false;
                self.display_in_progress = false;
            }
            TeleportState::Moving => {
                if let Some(region) = self.session.region() {
                    self.source = Some(SourceLocation {
                        region_handle: region.handle,
                        position: self.session.agent_position(),
                    });
                }
            }
            _ => {}
        }
    }

    // ─── Teleport actions ────────────────────────────────────────────

    /// Hand a new request to the orchestrator
    ///
    /// Whatever was active before is superseded: a dispatched request is
    /// canceled server-side, a parked one is dropped.
    pub fn submit(&mut self, mut request: TeleportRequest) {
        if let Some(previous) = self.active.take() {
            if previous.status == RequestStatus::Started && self.state.is_active() {
                tracing::warn!(
                    previous = %previous.id,
                    "Attempt to teleport when already teleporting; canceling previous request"
                );
                self.send_cancel();
            } else {
                tracing::debug!(previous = %previous.id, "Superseding teleport request");
            }
        }

        request.status = RequestStatus::Pending;
        tracing::info!(request = %request.id, via = request.kind_name(), "Teleport requested");
        self.active = Some(request);
        self.start_request();
    }

    /// Teleport to the agent's home location
    pub fn teleport_home(&mut self) {
        self.submit(TeleportRequest::home());
    }

    /// Retry the failed request, if it is restartable
    pub fn restart_failed(&mut self) -> Result<()> {
        if !self.has_restartable_failed_request() {
            return Err(TeleportError::NoRestartableRequest);
        }
        if let Some(request) = self.active.as_mut() {
            request.status = RequestStatus::RestartPending;
            tracing::info!(request = %request.id, "Restarting failed teleport");
        }
        self.start_request();
        Ok(())
    }

    /// Drop the active request without touching the server
    pub fn clear_request(&mut self) {
        self.active = None;
    }

    /// Cancel the active teleport
    ///
    /// The server is only told when the request was actually dispatched.
    /// The request is kept in the canceled slot for `restore_canceled`.
    pub fn cancel(&mut self, user_initiated: bool) {
        let was_active = self.active.is_some() || self.state.is_active();

        if self.active_status() == Some(RequestStatus::Started) {
            self.send_cancel();
        }
        if let Some(request) = self.active.take() {
            tracing::info!(request = %request.id, user_initiated, "Teleport canceled");
            self.canceled = Some(request);
        }
        self.set_state(TeleportState::None);

        if was_active {
            self.notifier
                .notify(Notification::TeleportCanceled { user_initiated });
        }
    }

    /// Resume the last canceled request
    ///
    /// Returns false when there is nothing to restore.
    pub fn restore_canceled(&mut self) -> bool {
        let Some(request) = self.canceled.take() else {
            return false;
        };

        tracing::info!(request = %request.id, "Restoring canceled teleport");
        let parked = matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::RestartPending
        );
        self.active = Some(request);

        if parked {
            self.start_request();
        } else {
            self.set_state(TeleportState::Requested);
            // A failed request stays failed; no progress screen for it
            self.display_in_progress = self.state() == TeleportState::Requested;
        }
        true
    }

    // ─── Session callbacks ───────────────────────────────────────────

    /// The session layer reports that the teleport completed
    pub fn on_finished(&mut self) {
        if let Some(request) = self.active.take() {
            tracing::info!(request = %request.id, via = request.kind_name(), "Teleport finished");
        }
        self.set_state(TeleportState::None);
        self.announce_rating_change();

        if let Some(hook) = &self.arrival_hook {
            hook.on_arrival(self.session.region().as_ref());
        }
    }

    /// The session layer reports that the teleport failed
    ///
    /// The request is kept, marked failed, so it can be restarted.
    pub fn on_failed(&mut self) {
        self.display_in_progress = false;
        let Some(request) = self.active.as_mut() else {
            tracing::debug!("Teleport failure reported with no active request; ignored");
            return;
        };
        request.status = RequestStatus::Failed;
        tracing::warn!(request = %request.id, via = request.kind_name(), "Teleport failed");
        let restartable = request.can_restart();

        self.announce_rating_change();
        self.notifier
            .notify(Notification::TeleportFailed { restartable });
    }

    // ─── Maturity preference ─────────────────────────────────────────

    /// Remember that the current teleport raised the preference
    pub fn set_rating_change_during_teleport(&mut self, rating: MaturityRating) {
        self.rating_change = Some(rating);
    }

    /// The user changed their desired rating
    ///
    /// Persists it and sends it to the server.
    pub fn set_preferred_maturity(&mut self, rating: MaturityRating) -> Result<()> {
        if !self.access.can_set_maturity(rating) {
            return Err(TeleportError::MaturityNotAllowed(rating.to_string()));
        }
        self.access.preferred = rating;
        self.store.save(rating)?;
        self.send_preference(rating)
    }

    /// Accept a "rating too low" prompt for the failed request
    ///
    /// Raises the preference and restarts the request, which waits for the
    /// server to confirm the new rating before it is sent. Nothing changes
    /// unless there is a failed request that can be restarted.
    pub fn raise_maturity_and_retry(&mut self, rating: MaturityRating) -> Result<()> {
        if !self.has_restartable_failed_request() {
            return Err(TeleportError::NoRestartableRequest);
        }
        self.set_preferred_maturity(rating)?;
        self.set_rating_change_during_teleport(rating);
        self.restart_failed()
    }

    /// Deliver a preference reply from the capability exchange
    pub fn on_preference_reply(&mut self, reply: PreferenceReply) {
        let result = match reply {
            PreferenceReply::Confirmed { actual, .. } => self.sync.handle_result(actual),
            PreferenceReply::Failed { reason, .. } => {
                tracing::debug!(reason = %reason, "Preference reply failed");
                Ok(self.sync.handle_error())
            }
        };
        // A retry that could not be sent is already reported
        let _ = self.apply_send_result(result);
    }

    /// The preference settled; dispatch a parked request
    pub fn on_preference_settled(&mut self) {
        self.start_request();
    }

    fn send_preference(&mut self, rating: MaturityRating) -> Result<()> {
        let result = self.sync.send_preference(rating);
        self.apply_send_result(result)
    }

    fn apply_send_result(
        &mut self,
        result: std::result::Result<SyncOutcome, SendRejected>,
    ) -> Result<()> {
        match result {
            Ok(outcome) => {
                self.apply_sync_outcome(outcome);
                Ok(())
            }
            Err(rejected) => {
                self.notifier.notify(Notification::PreferenceUnavailable {
                    reason: rejected.error.to_string(),
                });
                self.apply_sync_outcome(rejected.outcome);
                Err(rejected.error)
            }
        }
    }

    fn apply_sync_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Settled => self.on_preference_settled(),
            SyncOutcome::Diverged { requested, actual } => self.report_divergence(requested, actual),
            SyncOutcome::InFlight | SyncOutcome::Stale | SyncOutcome::Retrying { .. } => {}
        }
    }

    /// The server would not take the requested rating
    fn report_divergence(&mut self, requested: MaturityRating, actual: MaturityRating) {
        self.rating_change = None;

        if self.has_pending_request() {
            if let Some(request) = self.active.as_mut() {
                tracing::warn!(request = %request.id, "Parked teleport abandoned after preference error");
                request.status = RequestStatus::Failed;
            }
            self.set_state(TeleportState::None);
        }

        self.notifier.notify(Notification::MaturityChangeError {
            preferred: requested,
            actual,
        });

        // Reconcile locally without sending anything back
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read saved maturity preference");
                None
            }
        };
        if stored != Some(actual) {
            tracing::info!(rating = %actual, "Setting saved maturity preference to server value");
            if let Err(e) = self.store.save(actual) {
                tracing::warn!(error = %e, "Failed to save reconciled maturity preference");
            }
        }
        self.access.preferred = actual;
    }

    fn announce_rating_change(&mut self) {
        if let Some(rating) = self.rating_change.take() {
            self.notifier
                .notify(Notification::PreferredMaturityChanged { rating });
        }
    }

    // ─── Dispatch ────────────────────────────────────────────────────

    fn start_request(&mut self) {
        if !self.has_pending_request() {
            return;
        }
        if !self.sync.is_settled() {
            tracing::debug!("Teleport parked until maturity preference settles");
            self.display_in_progress = true;
            self.set_state(TeleportState::Pending);
            return;
        }
        self.dispatch();
    }

    fn dispatch(&mut self) {
        let Some(request) = self.active.as_mut() else {
            return;
        };
        let restart = request.status == RequestStatus::RestartPending;
        request.status = RequestStatus::Started;

        if self.session.region().is_none() {
            tracing::warn!(request = %request.id, "No region; teleport not sent");
            return;
        }

        let message = if restart {
            request.restart_teleport(self.session.as_ref())
        } else {
            request.start_teleport(self.session.as_ref())
        };
        let preserves_look_at = request.preserves_look_at();
        let request_id = request.id.clone();

        let is_local = match (message.region_handle(), self.session.region()) {
            (Some(dest), Some(region)) => dest == region.handle,
            _ => false,
        };

        self.keeps_look_at = preserves_look_at;
        self.teleport_core(is_local);

        tracing::info!(
            request = %request_id,
            restart,
            local = is_local,
            message = ?message,
            "Sending teleport request"
        );
        if let Err(e) = self.session.send_reliable(message) {
            tracing::warn!(request = %request_id, error = %e, "Teleport request not sent");
            self.on_failed();
        }
    }

    fn teleport_core(&mut self, is_local: bool) {
        if self.state.is_active() && self.state != TeleportState::Pending {
            tracing::warn!(state = ?self.state, "Teleport started while another is in progress");
        }
        self.teleport_count += 1;
        if is_local {
            self.set_state(TeleportState::Local);
        } else {
            self.display_in_progress = true;
            self.set_state(TeleportState::Start);
        }
    }

    fn send_cancel(&self) {
        if self.session.region().is_none() {
            return;
        }
        if let Err(e) = self.session.send_reliable(TeleportMessage::Cancel) {
            tracing::warn!(error = %e, "Failed to send teleport cancel");
        }
    }
}
