//! Core value types for a3s-teleport
//!
//! Ratings, coordinates, region handles, teleport states and the outbound
//! wire intents handed to the session transport. All types use camelCase
//! JSON serialization.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Width of a region on the world grid, in meters
pub const REGION_WIDTH_METERS: f64 = 256.0;

/// Content-access classification of a region or of an agent's preference
///
/// Discriminants are the values the simulator uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum MaturityRating {
    /// Unknown / not yet received
    #[default]
    Min = 0,
    /// General
    Pg = 13,
    /// Moderate
    Mature = 21,
    /// Adult
    Adult = 42,
    /// Region offline
    Down = 254,
}

impl MaturityRating {
    /// Numeric access code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a numeric access code; unknown values map to `Min`
    pub fn from_code(code: u8) -> Self {
        match code {
            13 => Self::Pg,
            21 => Self::Mature,
            42 => Self::Adult,
            254 => Self::Down,
            _ => Self::Min,
        }
    }

    /// Short form used in the `access_prefs.max` capability body
    pub fn short_str(self) -> &'static str {
        match self {
            Self::Pg => "PG",
            Self::Mature => "M",
            Self::Adult => "A",
            Self::Min | Self::Down => "U",
        }
    }

    /// Decode the short form; anything unrecognised is `Min`
    pub fn from_short(s: &str) -> Self {
        match s.trim() {
            "PG" => Self::Pg,
            "M" => Self::Mature,
            "A" => Self::Adult,
            _ => Self::Min,
        }
    }

    /// Lowercase human-readable name used in notifications
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Pg => "general",
            Self::Mature => "moderate",
            Self::Adult => "adult",
            Self::Down => "offline",
            Self::Min => "unknown",
        }
    }
}

impl fmt::Display for MaturityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Region-local vector (meters, or a unit direction)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Default look-at sent with location teleports
    pub const FORWARD: Vector3 = Vector3::new(0.0, 1.0, 0.0);
}

/// Position in world-global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GlobalPosition {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Grid address of a region: its global origin packed as `(x << 32) | y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionHandle(pub u64);

impl RegionHandle {
    /// Build a handle from a region origin in meters
    pub fn from_origin(x: u32, y: u32) -> Self {
        Self(((x as u64) << 32) | y as u64)
    }

    /// Handle of the region containing a global position
    pub fn from_global(pos: GlobalPosition) -> Self {
        let snap = |v: f64| ((v / REGION_WIDTH_METERS).floor().max(0.0) * REGION_WIDTH_METERS) as u32;
        Self::from_origin(snap(pos.x), snap(pos.y))
    }

    /// Global origin (south-west corner) of the region
    pub fn origin(self) -> GlobalPosition {
        GlobalPosition::new((self.0 >> 32) as f64, (self.0 & 0xFFFF_FFFF) as f64, 0.0)
    }

    /// Offset of `pos` relative to this region's origin; z is kept as-is
    pub fn local_offset(self, pos: GlobalPosition) -> Vector3 {
        let origin = self.origin();
        Vector3::new((pos.x - origin.x) as f32, (pos.y - origin.y) as f32, pos.z as f32)
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = self.origin();
        write!(f, "{}:{}", origin.x, origin.y)
    }
}

/// Orchestrator-level teleport phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum TeleportState {
    /// No teleport in progress
    #[default]
    None = 0,
    /// Request sent to the source region
    Start = 1,
    /// Waiting for the source region to respond
    Requested = 2,
    /// Destination received from the source region
    Moving = 3,
    /// Destination region has started sending updates
    StartArrival = 4,
    /// Waiting for content at the destination
    Arriving = 5,
    /// Same-region move without the progress screen
    Local = 6,
    /// Parked until the maturity preference settles
    Pending = 7,
}

impl TeleportState {
    /// Whether a teleport is underway in any form
    pub fn is_active(self) -> bool {
        self != Self::None
    }
}

/// Lifecycle of a single teleport request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Started,
    Failed,
    RestartPending,
}

/// Teleport flag bits carried by lure requests
pub mod teleport_flags {
    pub const VIA_LURE: u32 = 1 << 2;
    pub const VIA_GODLIKE_LURE: u32 = 1 << 8;
    pub const DISABLE_CANCEL: u32 = 1 << 11;
}

/// Outbound reliable message for the session transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TeleportMessage {
    /// Teleport to a landmark; the nil id means home
    #[serde(rename_all = "camelCase")]
    Landmark { landmark_id: Uuid },
    /// Accept an invitation
    #[serde(rename_all = "camelCase")]
    Lure { lure_id: Uuid, flags: u32 },
    /// Teleport to a region-local position
    #[serde(rename_all = "camelCase")]
    Location {
        region_handle: RegionHandle,
        position: Vector3,
        look_at: Vector3,
    },
    /// Abort whatever teleport the server is processing
    Cancel,
}

impl TeleportMessage {
    /// Destination region, if the message names one
    pub fn region_handle(&self) -> Option<RegionHandle> {
        match self {
            Self::Location { region_handle, .. } => Some(*region_handle),
            _ => None,
        }
    }
}

/// Where the last teleport departed from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub region_handle: RegionHandle,
    pub position: GlobalPosition,
}
