//! Teleport requests
//!
//! A `TeleportRequest` describes *how* a teleport was initiated and knows how
//! to build the outbound message for it. It owns no network resources; the
//! orchestrator decides when the message is sent.

use crate::session::Session;
use crate::types::{
    teleport_flags, GlobalPosition, RegionHandle, RequestStatus, TeleportMessage, Vector3,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the teleport was initiated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "via")]
pub enum TeleportKind {
    /// Saved landmark; the nil id means home
    #[serde(rename_all = "camelCase")]
    Landmark { landmark_id: Uuid },

    /// Invitation from another agent
    #[serde(rename_all = "camelCase")]
    Lure { lure_id: Uuid, godlike: bool },

    /// Global coordinate
    #[serde(rename_all = "camelCase")]
    Location { position: GlobalPosition },

    /// Global coordinate, keeping the current view direction
    #[serde(rename_all = "camelCase")]
    LocationLookAt { position: GlobalPosition },
}

/// A teleport request and its lifecycle status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleportRequest {
    /// Request identifier (tp-<uuid>)
    pub id: String,
    pub kind: TeleportKind,
    pub status: RequestStatus,
}

impl TeleportRequest {
    fn new(kind: TeleportKind) -> Self {
        Self {
            id: format!("tp-{}", Uuid::new_v4()),
            kind,
            status: RequestStatus::Pending,
        }
    }

    pub fn via_landmark(landmark_id: Uuid) -> Self {
        Self::new(TeleportKind::Landmark { landmark_id })
    }

    /// Teleport to the agent's home location
    pub fn home() -> Self {
        Self::via_landmark(Uuid::nil())
    }

    pub fn via_lure(lure_id: Uuid, godlike: bool) -> Self {
        Self::new(TeleportKind::Lure { lure_id, godlike })
    }

    pub fn via_location(position: GlobalPosition) -> Self {
        Self::new(TeleportKind::Location { position })
    }

    pub fn via_location_look_at(position: GlobalPosition) -> Self {
        Self::new(TeleportKind::LocationLookAt { position })
    }

    /// Whether the request may be replayed after a failure
    ///
    /// Lures cannot: the server pairs the invitation with its acceptance
    /// and discards both once the first attempt is processed, so a replay
    /// would wait for a partner request that no longer exists.
    pub fn can_restart(&self) -> bool {
        !matches!(self.kind, TeleportKind::Lure { .. })
    }

    /// Whether arriving should keep the current view direction
    pub fn preserves_look_at(&self) -> bool {
        matches!(self.kind, TeleportKind::LocationLookAt { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TeleportKind::Landmark { .. } => "landmark",
            TeleportKind::Lure { .. } => "lure",
            TeleportKind::Location { .. } => "location",
            TeleportKind::LocationLookAt { .. } => "location_look_at",
        }
    }

    /// Build the first outbound message for this request
    pub fn start_teleport(&self, session: &dyn Session) -> TeleportMessage {
        match &self.kind {
            TeleportKind::Landmark { landmark_id } => landmark_message(*landmark_id),
            TeleportKind::Lure { lure_id, godlike } => {
                let flags = if *godlike {
                    teleport_flags::VIA_GODLIKE_LURE | teleport_flags::DISABLE_CANCEL
                } else {
                    teleport_flags::VIA_LURE
                };
                TeleportMessage::Lure {
                    lure_id: *lure_id,
                    flags,
                }
            }
            TeleportKind::Location { position } => location_message(*position, Vector3::FORWARD),
            TeleportKind::LocationLookAt { position } => {
                session.detach_camera();
                location_message(*position, session.camera_at_axis())
            }
        }
    }

    /// Build the message again for a retry
    ///
    /// # Panics
    ///
    /// Panics if `can_restart()` is false; callers must check first.
    pub fn restart_teleport(&self, session: &dyn Session) -> TeleportMessage {
        assert!(
            self.can_restart(),
            "restart_teleport called on a non-restartable {} request",
            self.kind_name()
        );
        self.start_teleport(session)
    }
}

fn landmark_message(landmark_id: Uuid) -> TeleportMessage {
    TeleportMessage::Landmark { landmark_id }
}

fn location_message(position: GlobalPosition, look_at: Vector3) -> TeleportMessage {
    let region_handle = RegionHandle::from_global(position);
    TeleportMessage::Location {
        region_handle,
        position: region_handle.local_offset(position),
        look_at,
    }
}
