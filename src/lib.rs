//! # a3s-teleport
//!
//! Teleport orchestration and maturity preference sync for virtual-world
//! agent sessions.
//!
//! ## Overview
//!
//! `a3s-teleport` decides when a teleport request may be sent, keeps track of
//! its progress, and keeps the agent's desired content rating in step with
//! the rating the server enforces. A teleport is never sent while a
//! preference change is still in flight; it waits in `Pending` and goes out
//! once the server has answered.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_teleport::{
//!     GlobalPosition, MaturityRating, MemoryNotifier, MemoryPreferenceStore, MemorySession,
//!     RecordingPreferenceSender, RegionHandle, RegionInfo, TeleportConfig,
//!     TeleportOrchestrator, TeleportRequest, TeleportState,
//! };
//!
//! # fn main() -> a3s_teleport::Result<()> {
//! let region = RegionInfo::new(RegionHandle::from_origin(256_000, 256_000), "Ahern", MaturityRating::Pg);
//! let session = Arc::new(MemorySession::new(region));
//!
//! let mut orchestrator = TeleportOrchestrator::new(
//!     &TeleportConfig::default(),
//!     session.clone(),
//!     Arc::new(RecordingPreferenceSender::default()),
//!     Arc::new(MemoryNotifier::default()),
//!     Arc::new(MemoryPreferenceStore::default()),
//! )?;
//!
//! orchestrator.submit(TeleportRequest::via_location(GlobalPosition::new(512_128.0, 256_128.0, 25.0)));
//! assert_eq!(orchestrator.state(), TeleportState::Start);
//! assert_eq!(session.sent().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **TeleportOrchestrator**: single-owner state machine for requests and teleport state
//! - **MaturitySynchronizer**: generation-counted preference exchange with bounded retries
//! - **TeleportRequest**: landmark, lure, location and look-at variants
//! - **TeleportService** / **TeleportHandle**: tokio task driving the orchestrator
//! - **Session**, **PreferenceSender**, **CapabilityClient**, **Notifier**,
//!   **PreferenceStore**, **ArrivalHook**: seams to the host application

pub mod access;
pub mod capability;
pub mod config;
pub mod error;
pub mod maturity;
pub mod notify;
pub mod orchestrator;
pub mod request;
pub mod service;
pub mod session;
pub mod state;
pub mod types;

// Re-export core types
pub use access::{AccessDenial, AgentAccess};
pub use capability::{
    CapabilityClient, HttpCapabilityClient, PreferenceReply, PreferenceRequest, PreferenceSender,
    RecordingPreferenceSender,
};
pub use config::TeleportConfig;
pub use error::{Result, TeleportError};
pub use maturity::{MaturitySynchronizer, SyncOutcome};
pub use notify::{BroadcastNotifier, MemoryNotifier, Notification, NotificationEvent, Notifier};
pub use orchestrator::{ArrivalHook, TeleportOrchestrator, TeleportSnapshot};
pub use request::{TeleportKind, TeleportRequest};
pub use service::{TeleportHandle, TeleportService};
pub use session::{MemorySession, RegionInfo, Session};
pub use state::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use types::{
    GlobalPosition, MaturityRating, RegionHandle, RequestStatus, SourceLocation, TeleportMessage,
    TeleportState, Vector3,
};
