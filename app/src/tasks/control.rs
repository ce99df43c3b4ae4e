use async_trait::async_trait;
use poise::serenity_prelude::GuildId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::{
    clients::{session::Connector, CachedClient, ClientManager, SweepReport},
    error::{ClientError, ControlError},
    store::CredentialStore,
    Error,
};

use super::TaskHandler;

/// Requests from outside the cache: admin commands and the vanity-client hook.
#[derive(Debug)]
pub enum ControlMessage {
    Sweep {
        reply: Option<oneshot::Sender<Result<SweepReport, ClientError>>>,
    },
    /// A guild's vanity credential was changed in the settings service.
    CredentialChanged(GuildId),
    Snapshot {
        reply: oneshot::Sender<Vec<CachedClient>>,
    },
}

/// Cloneable sending side of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: mpsc::UnboundedSender<ControlMessage>,
}

pub fn channel() -> (ControlHandle, mpsc::UnboundedReceiver<ControlMessage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ControlHandle { sender }, receiver)
}

impl ControlHandle {
    fn send(&self, message: ControlMessage) -> Result<(), ControlError> {
        self.sender.send(message).map_err(|_| ControlError::Closed)
    }

    /// Runs a sweep now and waits for its outcome.
    pub async fn request_sweep(&self) -> Result<SweepReport, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlMessage::Sweep { reply: Some(reply) })?;
        Ok(rx.await.map_err(|_| ControlError::Closed)??)
    }

    /// Re-resolves the guild's client without waiting for the next sweep.
    pub fn notify_credential_changed(&self, guild_id: GuildId) -> Result<(), ControlError> {
        self.send(ControlMessage::CredentialChanged(guild_id))
    }

    pub async fn snapshot(&self) -> Result<Vec<CachedClient>, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlMessage::Snapshot { reply })?;
        rx.await.map_err(|_| ControlError::Closed)
    }
}

pub struct ControlTask<C: Connector, S: CredentialStore> {
    manager: Arc<ClientManager<C, S>>,
    receiver: mpsc::UnboundedReceiver<ControlMessage>,
}

impl<C: Connector, S: CredentialStore> ControlTask<C, S> {
    pub fn new(
        manager: Arc<ClientManager<C, S>>,
        receiver: mpsc::UnboundedReceiver<ControlMessage>,
    ) -> Self {
        Self { manager, receiver }
    }
}

#[async_trait]
impl<C: Connector, S: CredentialStore> TaskHandler for ControlTask<C, S> {
    fn name(&self) -> &'static str {
        "client_control"
    }

    async fn run(&mut self) -> Result<(), Error> {
        while let Some(message) = self.receiver.recv().await {
            match message {
                ControlMessage::Sweep { reply } => {
                    let result = self.manager.sweep().await;
                    if let Err(e) = &result {
                        warn!("Requested client sweep failed: {}", e);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                ControlMessage::CredentialChanged(guild_id) => {
                    // logins can take seconds, keep the channel responsive
                    let manager = Arc::clone(&self.manager);
                    tokio::spawn(async move {
                        match manager.client_for_guild(guild_id).await {
                            Ok(Some(_)) => info!(%guild_id, "Client refreshed"),
                            Ok(None) => {
                                warn!(%guild_id, "Client refresh left guild without a client")
                            }
                            Err(e) => warn!(%guild_id, "Client refresh failed: {}", e),
                        }
                    });
                }
                ControlMessage::Snapshot { reply } => {
                    let _ = reply.send(self.manager.cached_clients());
                }
            }
        }

        Ok(())
    }
}
