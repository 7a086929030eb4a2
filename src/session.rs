//! Session region/connection context
//!
//! The orchestrator never talks to the network directly. It reads the
//! current region and its capabilities from a `Session` and hands outbound
//! teleport messages to the session's reliable-message primitive.

use crate::error::{Result, TeleportError};
use crate::types::{GlobalPosition, MaturityRating, RegionHandle, TeleportMessage, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// The region the agent currently occupies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInfo {
    pub handle: RegionHandle,
    pub name: String,
    pub access: MaturityRating,
    /// Capability name → URL
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
}

impl RegionInfo {
    pub fn new(handle: RegionHandle, name: impl Into<String>, access: MaturityRating) -> Self {
        Self {
            handle,
            name: name.into(),
            access,
            capabilities: HashMap::new(),
        }
    }

    /// Grant a capability URL
    pub fn with_capability(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.capabilities.insert(name.into(), url.into());
        self
    }

    /// Capability URL, treating an empty grant as absent
    pub fn capability(&self, name: &str) -> Option<&str> {
        self.capabilities
            .get(name)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

/// Connection to the simulator for the current session
pub trait Session: Send + Sync {
    /// Current region, if connected to one
    fn region(&self) -> Option<RegionInfo>;

    /// Agent position in global coordinates
    fn agent_position(&self) -> GlobalPosition;

    /// Queue a reliable message to the current region
    fn send_reliable(&self, message: TeleportMessage) -> Result<()>;

    /// Forward axis of the camera
    fn camera_at_axis(&self) -> Vector3;

    /// Stop the camera following the avatar so it keeps its direction
    fn detach_camera(&self);

    /// Resolve a capability URL on the current region
    fn capability_url(&self, name: &str) -> Result<String> {
        let region = self.region().ok_or_else(|| TeleportError::CapabilityUnavailable {
            capability: name.to_string(),
            reason: "region is not defined".into(),
        })?;
        region
            .capability(name)
            .map(str::to_string)
            .ok_or_else(|| TeleportError::CapabilityUnavailable {
                capability: name.to_string(),
                reason: format!("capability is not defined for region '{}'", region.name),
            })
    }
}

#[derive(Debug, Default)]
struct MemorySessionState {
    region: Option<RegionInfo>,
    position: GlobalPosition,
    camera_at: Vector3,
    camera_detached: bool,
    sent: Vec<TeleportMessage>,
    reject_sends: bool,
}

/// In-memory session for tests and offline tooling
///
/// Records every outbound message instead of sending it.
#[derive(Debug, Default)]
pub struct MemorySession {
    state: Mutex<MemorySessionState>,
}

impl MemorySession {
    /// Create a session positioned in `region`
    pub fn new(region: RegionInfo) -> Self {
        let session = Self::default();
        session.set_region(Some(region));
        session.lock().camera_at = Vector3::FORWARD;
        session
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to another region, or drop the region connection with `None`
    pub fn set_region(&self, region: Option<RegionInfo>) {
        self.lock().region = region;
    }

    pub fn set_position(&self, position: GlobalPosition) {
        self.lock().position = position;
    }

    pub fn set_camera_at(&self, axis: Vector3) {
        self.lock().camera_at = axis;
    }

    /// Make `send_reliable` fail
    pub fn set_reject_sends(&self, reject: bool) {
        self.lock().reject_sends = reject;
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<TeleportMessage> {
        self.lock().sent.clone()
    }

    /// Drain recorded messages
    pub fn take_sent(&self) -> Vec<TeleportMessage> {
        std::mem::take(&mut self.lock().sent)
    }

    pub fn camera_detached(&self) -> bool {
        self.lock().camera_detached
    }
}

impl Session for MemorySession {
    fn region(&self) -> Option<RegionInfo> {
        self.lock().region.clone()
    }

    fn agent_position(&self) -> GlobalPosition {
        self.lock().position
    }

    fn send_reliable(&self, message: TeleportMessage) -> Result<()> {
        let mut state = self.lock();
        if state.reject_sends {
            return Err(TeleportError::Transport("circuit is closed".into()));
        }
        state.sent.push(message);
        Ok(())
    }

    fn camera_at_axis(&self) -> Vector3 {
        self.lock().camera_at
    }

    fn detach_camera(&self) {
        self.lock().camera_detached = true;
    }
}
