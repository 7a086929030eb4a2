//! Orchestrator integration tests
//!
//! Drives `TeleportOrchestrator` through full teleport lifecycles with the
//! in-memory session, notifier and store. Covers supersede, parking behind
//! the preference exchange, stale replies, retry bounds, cancel/restore,
//! failure and restart, and divergence reconciliation.

use a3s_teleport::{
    AccessDenial, AgentAccess, ArrivalHook, GlobalPosition, MaturityRating, MemoryNotifier,
    MemoryPreferenceStore, MemorySession, Notification, PreferenceReply, PreferenceStore,
    RecordingPreferenceSender, RegionHandle, RegionInfo, RequestStatus, TeleportConfig,
    TeleportError, TeleportKind, TeleportMessage, TeleportOrchestrator, TeleportRequest,
    TeleportState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const CAP_URL: &str = "https://sim.example/cap/update-agent-information";

struct Harness {
    orch: TeleportOrchestrator,
    session: Arc<MemorySession>,
    sender: Arc<RecordingPreferenceSender>,
    notifier: Arc<MemoryNotifier>,
    store: Arc<MemoryPreferenceStore>,
}

fn region() -> RegionInfo {
    RegionInfo::new(
        RegionHandle::from_origin(256_000, 256_000),
        "Ahern",
        MaturityRating::Pg,
    )
    .with_capability("UpdateAgentInformation", CAP_URL)
}

fn harness() -> Harness {
    let session = Arc::new(MemorySession::new(region()));
    let sender = Arc::new(RecordingPreferenceSender::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let store = Arc::new(MemoryPreferenceStore::with_rating(MaturityRating::Pg));
    let orch = TeleportOrchestrator::new(
        &TeleportConfig::default(),
        session.clone(),
        sender.clone(),
        notifier.clone(),
        store.clone(),
    )
    .unwrap()
    .with_access(AgentAccess {
        adult: true,
        ..Default::default()
    });
    Harness {
        orch,
        session,
        sender,
        notifier,
        store,
    }
}

fn remote(x: f64) -> GlobalPosition {
    GlobalPosition::new(x, 256_128.0, 25.0)
}

fn confirm(rating: MaturityRating) -> PreferenceReply {
    PreferenceReply::Confirmed {
        requested: rating,
        previous: MaturityRating::Pg,
        actual: rating,
    }
}

fn landmark_ids(sent: &[TeleportMessage]) -> Vec<Uuid> {
    sent.iter()
        .filter_map(|m| match m {
            TeleportMessage::Landmark { landmark_id } => Some(*landmark_id),
            _ => None,
        })
        .collect()
}

// ─── Supersede ───────────────────────────────────────────────────

#[test]
fn test_parked_request_superseded_never_dispatches() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    h.orch.submit(TeleportRequest::via_landmark(first));
    h.orch.submit(TeleportRequest::via_landmark(second));

    let active = h.orch.active_request().unwrap();
    assert_eq!(
        active.kind,
        TeleportKind::Landmark {
            landmark_id: second
        }
    );
    assert!(h.session.sent().is_empty());

    h.orch.on_preference_reply(confirm(MaturityRating::Mature));

    // Only the second request goes out, and no cancel for the parked one
    assert_eq!(h.session.sent(), vec![TeleportMessage::Landmark { landmark_id: second }]);
}

#[test]
fn test_started_request_superseded_with_cancel() {
    let mut h = harness();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    h.orch.submit(TeleportRequest::via_landmark(first));
    h.orch.submit(TeleportRequest::via_landmark(second));

    assert_eq!(
        h.session.sent(),
        vec![
            TeleportMessage::Landmark { landmark_id: first },
            TeleportMessage::Cancel,
            TeleportMessage::Landmark { landmark_id: second },
        ]
    );
    assert_eq!(landmark_ids(&h.session.sent()), vec![first, second]);
    assert_eq!(h.orch.teleport_count(), 2);
}

// ─── Preference exchange ─────────────────────────────────────────

#[test]
fn test_out_of_order_replies_reflect_latest_request() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    h.orch.set_preferred_maturity(MaturityRating::Adult).unwrap();
    assert_eq!(h.sender.len(), 2);

    h.orch.submit(TeleportRequest::home());
    assert_eq!(h.orch.state(), TeleportState::Pending);

    // B succeeds first: still waiting on A
    h.orch.on_preference_reply(PreferenceReply::Confirmed {
        requested: MaturityRating::Adult,
        previous: MaturityRating::Pg,
        actual: MaturityRating::Adult,
    });
    assert!(!h.orch.synchronizer().is_settled());
    assert!(h.session.sent().is_empty());

    // A fails: counters level, B's value stands
    h.orch.on_preference_reply(PreferenceReply::Failed {
        requested: MaturityRating::Mature,
        previous: MaturityRating::Pg,
        reason: "HTTP error: 502".into(),
    });

    let sync = h.orch.synchronizer();
    assert!(sync.is_settled());
    assert_eq!(sync.last_requested(), MaturityRating::Adult);
    assert_eq!(sync.last_responded(), MaturityRating::Adult);
    assert_eq!(h.session.sent().len(), 1);
    assert!(h.notifier.notifications().is_empty());
}

#[test]
fn test_retry_bound_stops_after_three_resends() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Adult).unwrap();

    let server_keeps_pg = PreferenceReply::Confirmed {
        requested: MaturityRating::Adult,
        previous: MaturityRating::Pg,
        actual: MaturityRating::Pg,
    };

    for _ in 0..3 {
        h.orch.on_preference_reply(server_keeps_pg.clone());
    }
    assert_eq!(h.sender.len(), 4);
    assert!(h.notifier.notifications().is_empty());

    h.orch.on_preference_reply(server_keeps_pg);
    assert_eq!(h.sender.len(), 4);
    assert_eq!(
        h.notifier.take(),
        vec![Notification::MaturityChangeError {
            preferred: MaturityRating::Adult,
            actual: MaturityRating::Pg,
        }]
    );
    assert_eq!(h.orch.synchronizer().retry_count(), 0);
}

#[test]
fn test_divergence_reconciles_store_without_send() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    assert_eq!(h.store.load().unwrap(), Some(MaturityRating::Mature));
    let writes = h.store.writes();

    h.orch.on_preference_reply(PreferenceReply::Failed {
        requested: MaturityRating::Mature,
        previous: MaturityRating::Pg,
        reason: "timeout".into(),
    });

    assert_eq!(h.store.load().unwrap(), Some(MaturityRating::Pg));
    assert_eq!(h.store.writes(), writes + 1);
    assert_eq!(h.sender.len(), 1);
    assert_eq!(h.orch.access().preferred, MaturityRating::Pg);
}

#[test]
fn test_missing_capability_fails_synchronously() {
    let mut h = harness();
    h.session.set_region(Some(RegionInfo::new(
        RegionHandle::from_origin(256_000, 256_000),
        "Ahern",
        MaturityRating::Pg,
    )));

    let err = h
        .orch
        .set_preferred_maturity(MaturityRating::Mature)
        .unwrap_err();
    assert!(matches!(err, TeleportError::CapabilityUnavailable { .. }));
    assert!(h.sender.is_empty());
    assert_eq!(h.orch.synchronizer().retry_count(), 0);
    assert!(h.orch.synchronizer().is_settled());

    let notifications = h.notifier.take();
    assert!(matches!(
        notifications[0],
        Notification::PreferenceUnavailable { .. }
    ));
    assert_eq!(
        notifications[1],
        Notification::MaturityChangeError {
            preferred: MaturityRating::Mature,
            actual: MaturityRating::Pg,
        }
    );
}

#[test]
fn test_retry_send_failure_is_reported() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Adult).unwrap();

    // Region changes before the server's answer; the new one lacks the capability
    h.session.set_region(Some(RegionInfo::new(
        RegionHandle::from_origin(512_000, 256_000),
        "Bonifacio",
        MaturityRating::Pg,
    )));
    h.orch.on_preference_reply(PreferenceReply::Confirmed {
        requested: MaturityRating::Adult,
        previous: MaturityRating::Pg,
        actual: MaturityRating::Pg,
    });

    assert_eq!(h.sender.len(), 1);
    assert!(h.orch.synchronizer().is_settled());
    assert_eq!(h.orch.synchronizer().retry_count(), 0);

    let notifications = h.notifier.take();
    assert_eq!(notifications.len(), 2);
    assert!(matches!(
        &notifications[0],
        Notification::PreferenceUnavailable { reason } if reason.contains("Bonifacio")
    ));
    assert_eq!(
        notifications[1],
        Notification::MaturityChangeError {
            preferred: MaturityRating::Adult,
            actual: MaturityRating::Pg,
        }
    );
    assert_eq!(h.store.load().unwrap(), Some(MaturityRating::Pg));
}

#[test]
fn test_settle_dispatches_parked_request_exactly_once() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    h.orch.submit(TeleportRequest::via_location(remote(512_128.0)));
    assert_eq!(h.orch.state(), TeleportState::Pending);
    assert!(h.session.sent().is_empty());

    h.orch.on_preference_reply(confirm(MaturityRating::Mature));
    h.orch.on_preference_settled();
    h.orch.on_preference_settled();

    assert_eq!(h.session.sent().len(), 1);
    assert_eq!(h.orch.teleport_count(), 1);
    assert_eq!(h.orch.state(), TeleportState::Start);
}

#[test]
fn test_divergence_fails_parked_request() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    h.orch.submit(TeleportRequest::via_location(remote(512_128.0)));

    h.orch.on_preference_reply(PreferenceReply::Failed {
        requested: MaturityRating::Mature,
        previous: MaturityRating::Pg,
        reason: "HTTP error: 500".into(),
    });

    assert!(h.session.sent().is_empty());
    assert_eq!(h.orch.state(), TeleportState::None);
    assert_eq!(h.orch.active_request().unwrap().status, RequestStatus::Failed);
    assert!(h.orch.has_restartable_failed_request());
}

// ─── Cancel / restore ────────────────────────────────────────────

#[test]
fn test_cancel_on_idle_is_idempotent() {
    let mut h = harness();
    h.orch.cancel(true);
    h.orch.cancel(false);

    assert_eq!(h.orch.state(), TeleportState::None);
    assert!(h.orch.canceled_request().is_none());
    assert!(h.session.sent().is_empty());
    assert!(h.notifier.notifications().is_empty());
}

#[test]
fn test_cancel_on_idle_keeps_previous_stash() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::home());
    h.orch.cancel(true);
    let stashed = h.orch.canceled_request().cloned();

    h.orch.cancel(true);
    assert_eq!(h.orch.canceled_request().cloned(), stashed);
}

#[test]
fn test_restore_reproduces_canceled_request() {
    let mut h = harness();
    let request = TeleportRequest::via_location_look_at(remote(512_128.0));
    let id = request.id.clone();
    h.orch.submit(request);
    let before = h.orch.active_request().cloned().unwrap();

    h.orch.cancel(true);
    assert!(h.orch.active_request().is_none());
    assert_eq!(h.orch.state(), TeleportState::None);
    assert_eq!(h.session.sent().last(), Some(&TeleportMessage::Cancel));
    assert_eq!(
        h.notifier.take(),
        vec![Notification::TeleportCanceled {
            user_initiated: true
        }]
    );

    assert!(h.orch.restore_canceled());
    let after = h.orch.active_request().unwrap();
    assert_eq!(after, &before);
    assert_eq!(after.id, id);
    assert_eq!(h.orch.state(), TeleportState::Requested);
    assert!(h.orch.display_in_progress());

    assert!(!h.orch.restore_canceled());
}

#[test]
fn test_cancel_parked_request_sends_nothing() {
    let mut h = harness();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    h.orch.submit(TeleportRequest::home());

    h.orch.cancel(false);
    assert!(h.session.sent().is_empty());
    assert_eq!(
        h.orch.canceled_request().unwrap().status,
        RequestStatus::Pending
    );

    // Restoring a parked request parks it again
    assert!(h.orch.restore_canceled());
    assert_eq!(h.orch.state(), TeleportState::Pending);
    h.orch.on_preference_reply(confirm(MaturityRating::Mature));
    assert_eq!(h.session.sent().len(), 1);
}

#[test]
fn test_restore_failed_request_keeps_display_off() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::home());
    h.orch.on_failed();
    h.orch.cancel(true);

    assert!(h.orch.restore_canceled());
    assert_eq!(h.orch.state(), TeleportState::None);
    assert!(!h.orch.display_in_progress());
    assert_eq!(h.orch.active_request().unwrap().status, RequestStatus::Failed);
    assert!(h.orch.has_restartable_failed_request());
}

// ─── Failure / restart ───────────────────────────────────────────

#[test]
fn test_can_restart_for_each_variant() {
    let pos = remote(512_128.0);
    let cases = [
        (TeleportRequest::via_landmark(Uuid::new_v4()), true),
        (TeleportRequest::via_lure(Uuid::new_v4(), false), false),
        (TeleportRequest::via_location(pos), true),
        (TeleportRequest::via_location_look_at(pos), true),
    ];
    for (request, expected) in cases {
        assert_eq!(request.can_restart(), expected, "{}", request.kind_name());
    }
}

#[test]
fn test_failed_lure_is_not_restartable() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::via_lure(Uuid::new_v4(), false));
    h.orch.on_failed();

    assert!(!h.orch.has_restartable_failed_request());
    assert!(matches!(
        h.orch.restart_failed(),
        Err(TeleportError::NoRestartableRequest)
    ));
    assert_eq!(h.session.sent().len(), 1);
}

#[test]
fn test_failure_without_request_is_silent() {
    let mut h = harness();
    h.orch.on_failed();
    assert!(h.notifier.notifications().is_empty());

    h.orch.submit(TeleportRequest::home());
    h.orch.on_finished();
    h.orch.on_failed();
    assert!(h.notifier.notifications().is_empty());
    assert_eq!(h.orch.state(), TeleportState::None);
}

#[test]
fn test_raise_maturity_refused_for_failed_lure() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::via_lure(Uuid::new_v4(), false));
    h.orch.on_failed();
    h.notifier.take();

    assert!(matches!(
        h.orch.raise_maturity_and_retry(MaturityRating::Mature),
        Err(TeleportError::NoRestartableRequest)
    ));
    assert!(h.sender.is_empty());
    assert_eq!(h.store.load().unwrap(), Some(MaturityRating::Pg));
    assert!(h.orch.synchronizer().is_settled());

    // Declining leaves nothing behind for the next teleport to announce
    h.orch.clear_request();
    h.orch.set_preferred_maturity(MaturityRating::Mature).unwrap();
    h.orch.on_preference_reply(confirm(MaturityRating::Mature));
    h.orch.submit(TeleportRequest::via_location(remote(512_128.0)));
    h.orch.on_finished();
    assert!(h.notifier.notifications().is_empty());
}

#[test]
fn test_restart_failed_resends_same_destination() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::via_location(remote(768_050.0)));
    h.orch.on_failed();
    assert_eq!(h.orch.state(), TeleportState::None);

    h.orch.restart_failed().unwrap();
    let sent = h.session.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
    assert_eq!(h.orch.active_request().unwrap().status, RequestStatus::Started);
    assert_eq!(h.orch.state(), TeleportState::Start);
}

#[test]
fn test_late_progress_after_failure_is_ignored() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::home());
    h.orch.set_state(TeleportState::Requested);
    h.orch.on_failed();

    h.orch.set_state(TeleportState::Arriving);
    assert_eq!(h.orch.state(), TeleportState::None);

    // None still goes through
    h.orch.set_state(TeleportState::None);
    assert!(!h.orch.keeps_look_at());
}

#[test]
fn test_raise_maturity_and_retry() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::via_location(remote(512_128.0)));
    h.orch.on_failed();
    h.notifier.take();

    // Server said the destination is mature and the preference is too low
    assert_eq!(
        h.orch.access().classify_denial(MaturityRating::Mature),
        AccessDenial::PromptIncrease {
            rating: MaturityRating::Mature
        }
    );
    h.orch.raise_maturity_and_retry(MaturityRating::Mature).unwrap();

    assert_eq!(h.orch.state(), TeleportState::Pending);
    assert_eq!(h.session.sent().len(), 1);
    assert_eq!(h.store.load().unwrap(), Some(MaturityRating::Mature));

    h.orch.on_preference_reply(confirm(MaturityRating::Mature));
    assert_eq!(h.session.sent().len(), 2);

    h.orch.on_finished();
    assert_eq!(
        h.notifier.take(),
        vec![Notification::PreferredMaturityChanged {
            rating: MaturityRating::Mature
        }]
    );
    assert!(h.orch.active_request().is_none());
}

#[test]
fn test_declining_prompt_clears_request() {
    let mut h = harness();
    h.orch.submit(TeleportRequest::home());
    h.orch.on_failed();

    h.orch.clear_request();
    assert!(h.orch.active_request().is_none());
    assert!(!h.orch.has_restartable_failed_request());
}

// ─── Arrival ─────────────────────────────────────────────────────

#[derive(Default)]
struct CountingHook {
    calls: AtomicUsize,
    regions: Mutex<Vec<String>>,
}

impl ArrivalHook for CountingHook {
    fn on_arrival(&self, region: Option<&RegionInfo>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(region) = region {
            self.regions.lock().unwrap().push(region.name.clone());
        }
    }
}

#[test]
fn test_arrival_hook_runs_once_per_teleport() {
    let hook = Arc::new(CountingHook::default());
    let mut h = harness();
    h.orch = h.orch.with_arrival_hook(hook.clone());

    h.orch.submit(TeleportRequest::via_location(remote(512_128.0)));
    h.orch.set_state(TeleportState::Requested);
    h.orch.set_state(TeleportState::Moving);
    h.orch.set_state(TeleportState::StartArrival);
    h.orch.set_state(TeleportState::Arriving);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 0);

    h.orch.on_finished();
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert_eq!(hook.regions.lock().unwrap().as_slice(), ["Ahern"]);
    assert_eq!(h.orch.state(), TeleportState::None);
    assert!(h.orch.source_location().is_some());
}

#[test]
fn test_home_teleport_is_never_local() {
    let mut h = harness();
    h.orch.teleport_home();
    assert_eq!(h.orch.state(), TeleportState::Start);
    assert_eq!(
        h.session.sent(),
        vec![TeleportMessage::Landmark {
            landmark_id: Uuid::nil()
        }]
    );
}
