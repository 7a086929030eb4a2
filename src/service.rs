//! Async driver for the teleport orchestrator
//!
//! The orchestrator runs on a single tokio task and is fed through an
//! `mpsc` command channel. Preference posts are spawned as separate tasks
//! whose replies come back through the same channel, so every state
//! transition still happens on one logical thread.

use crate::access::AgentAccess;
use crate::capability::{
    exchange_preference, CapabilityClient, HttpCapabilityClient, PreferenceReply,
    PreferenceRequest, PreferenceSender,
};
use crate::config::TeleportConfig;
use crate::error::{Result, TeleportError};
use crate::notify::{BroadcastNotifier, Notifier};
use crate::orchestrator::{ArrivalHook, TeleportOrchestrator, TeleportSnapshot};
use crate::request::TeleportRequest;
use crate::session::Session;
use crate::state::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
use crate::types::{MaturityRating, TeleportState};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command {
    Submit(TeleportRequest),
    TeleportHome,
    Cancel {
        user_initiated: bool,
    },
    RestoreCanceled {
        reply: oneshot::Sender<bool>,
    },
    RestartFailed {
        reply: oneshot::Sender<Result<()>>,
    },
    ClearRequest,
    SetPreferredMaturity {
        rating: MaturityRating,
        reply: oneshot::Sender<Result<()>>,
    },
    RaiseMaturityAndRetry {
        rating: MaturityRating,
        reply: oneshot::Sender<Result<()>>,
    },
    SetState(TeleportState),
    SetMessage(String),
    Finished,
    Failed,
    PreferenceReply(PreferenceReply),
    Snapshot {
        reply: oneshot::Sender<TeleportSnapshot>,
    },
    Shutdown,
}

/// Posts preference updates on spawned tasks and feeds replies back
struct ChannelPreferenceSender {
    client: Arc<dyn CapabilityClient>,
    tx: mpsc::WeakSender<Command>,
}

impl PreferenceSender for ChannelPreferenceSender {
    fn post(&self, request: PreferenceRequest) {
        let Some(tx) = self.tx.upgrade() else {
            tracing::warn!(url = %request.url, "Teleport service stopped; preference not sent");
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let reply = exchange_preference(client.as_ref(), &request).await;
            if tx.send(Command::PreferenceReply(reply)).await.is_err() {
                tracing::debug!("Teleport service stopped before preference reply");
            }
        });
    }
}

/// Builder for the service task
pub struct TeleportService {
    config: TeleportConfig,
    session: Arc<dyn Session>,
    client: Arc<dyn CapabilityClient>,
    notifier: Arc<dyn Notifier>,
    store: Option<Arc<dyn PreferenceStore>>,
    access: Option<AgentAccess>,
    arrival_hook: Option<Arc<dyn ArrivalHook>>,
}

impl TeleportService {
    pub fn new(
        config: TeleportConfig,
        session: Arc<dyn Session>,
        client: Arc<dyn CapabilityClient>,
    ) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new(config.notification_capacity));
        Self {
            config,
            session,
            client,
            notifier,
            store: None,
            access: None,
            arrival_hook: None,
        }
    }

    /// Service talking to region capabilities over HTTP
    pub fn with_http_client(config: TeleportConfig, session: Arc<dyn Session>) -> Result<Self> {
        let client = Arc::new(HttpCapabilityClient::new(config.http_timeout())?);
        Ok(Self::new(config, session, client))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the preference store
    ///
    /// Defaults to the configured `preference_file`, or memory when unset.
    pub fn with_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_access(mut self, access: AgentAccess) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_arrival_hook(mut self, hook: Arc<dyn ArrivalHook>) -> Self {
        self.arrival_hook = Some(hook);
        self
    }

    /// Build the orchestrator and start the service task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<(TeleportHandle, JoinHandle<()>)> {
        let store: Arc<dyn PreferenceStore> = match (self.store, &self.config.preference_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FilePreferenceStore::new(path)),
            (None, None) => Arc::new(MemoryPreferenceStore::default()),
        };

        let (tx, rx) = mpsc::channel(self.config.command_capacity);
        let sender = Arc::new(ChannelPreferenceSender {
            client: self.client,
            tx: tx.downgrade(),
        });

        let mut orchestrator =
            TeleportOrchestrator::new(&self.config, self.session, sender, self.notifier, store)?;
        if let Some(access) = self.access {
            orchestrator = orchestrator.with_access(access);
        }
        if let Some(hook) = self.arrival_hook {
            orchestrator = orchestrator.with_arrival_hook(hook);
        }

        let task = tokio::spawn(run(orchestrator, rx));
        Ok((TeleportHandle { tx }, task))
    }
}

async fn run(mut orchestrator: TeleportOrchestrator, mut rx: mpsc::Receiver<Command>) {
    tracing::info!("Teleport service started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit(request) => orchestrator.submit(request),
            Command::TeleportHome => orchestrator.teleport_home(),
            Command::Cancel { user_initiated } => orchestrator.cancel(user_initiated),
            Command::RestoreCanceled { reply } => {
                let _ = reply.send(orchestrator.restore_canceled());
            }
            Command::RestartFailed { reply } => {
                let _ = reply.send(orchestrator.restart_failed());
            }
            Command::ClearRequest => orchestrator.clear_request(),
            Command::SetPreferredMaturity { rating, reply } => {
                let _ = reply.send(orchestrator.set_preferred_maturity(rating));
            }
            Command::RaiseMaturityAndRetry { rating, reply } => {
                let _ = reply.send(orchestrator.raise_maturity_and_retry(rating));
            }
            Command::SetState(state) => orchestrator.set_state(state),
            Command::SetMessage(message) => orchestrator.set_teleport_message(message),
            Command::Finished => orchestrator.on_finished(),
            Command::Failed => orchestrator.on_failed(),
            Command::PreferenceReply(reply) => orchestrator.on_preference_reply(reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(orchestrator.snapshot());
            }
            Command::Shutdown => break,
        }
    }

    tracing::info!("Teleport service stopped");
}

/// Cloneable front door to a running service
#[derive(Clone)]
pub struct TeleportHandle {
    tx: mpsc::Sender<Command>,
}

impl TeleportHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TeleportError::ServiceStopped)
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| TeleportError::ServiceStopped)
    }

    pub async fn submit(&self, request: TeleportRequest) -> Result<()> {
        self.send(Command::Submit(request)).await
    }

    pub async fn teleport_home(&self) -> Result<()> {
        self.send(Command::TeleportHome).await
    }

    pub async fn cancel(&self, user_initiated: bool) -> Result<()> {
        self.send(Command::Cancel { user_initiated }).await
    }

    /// Resume the last canceled request; false when there was none
    pub async fn restore_canceled(&self) -> Result<bool> {
        self.call(|reply| Command::RestoreCanceled { reply }).await
    }

    pub async fn restart_failed(&self) -> Result<()> {
        self.call(|reply| Command::RestartFailed { reply }).await?
    }

    pub async fn clear_request(&self) -> Result<()> {
        self.send(Command::ClearRequest).await
    }

    pub async fn set_preferred_maturity(&self, rating: MaturityRating) -> Result<()> {
        self.call(|reply| Command::SetPreferredMaturity { rating, reply })
            .await?
    }

    pub async fn raise_maturity_and_retry(&self, rating: MaturityRating) -> Result<()> {
        self.call(|reply| Command::RaiseMaturityAndRetry { rating, reply })
            .await?
    }

    /// Forward a progress transition from the session layer
    pub async fn set_state(&self, state: TeleportState) -> Result<()> {
        self.send(Command::SetState(state)).await
    }

    pub async fn set_teleport_message(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::SetMessage(message.into())).await
    }

    pub async fn finished(&self) -> Result<()> {
        self.send(Command::Finished).await
    }

    pub async fn failed(&self) -> Result<()> {
        self.send(Command::Failed).await
    }

    pub async fn snapshot(&self) -> Result<TeleportSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the service task after already queued commands
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
