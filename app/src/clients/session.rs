use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;
use tokio::{sync::oneshot, time};
use tracing::warn;

use crate::error::SessionError;

/// A client whose gateway connection has been started but may not be ready yet.
pub struct Login<C> {
    pub client: C,
    /// Fires once the gateway reports ready. Dropping the sender means the
    /// connection went away first.
    pub ready: oneshot::Receiver<()>,
}

/// Builds and logs in clients with module-specific options (intents,
/// framework, event handlers).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: Clone + Send + Sync + 'static;

    async fn login(&self, token: &SecretString) -> anyhow::Result<Login<Self::Client>>;

    /// Runs after the ready signal, before the client is handed to callers.
    async fn prepare(&self, _client: &Self::Client) -> anyhow::Result<()> {
        Ok(())
    }

    /// Best-effort release of a client that is no longer cached.
    async fn teardown(&self, _client: Self::Client) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs in with `token` and brings the client to ready within `ready_timeout`.
///
/// The deadline covers login, the ready signal and `prepare`. Nothing is
/// retried. An elapsed deadline only drops the pending future: a connector
/// that spawned its gateway task keeps it running until `teardown` stops it.
pub async fn establish<C>(
    connector: &C,
    token: &SecretString,
    ready_timeout: Duration,
) -> Result<C::Client, SessionError>
where
    C: Connector + ?Sized,
{
    let deadline = time::Instant::now() + ready_timeout;

    let Login { client, ready } = match time::timeout_at(deadline, connector.login(token)).await {
        Ok(login) => login.map_err(SessionError::Login)?,
        Err(_) => return Err(SessionError::Timeout(ready_timeout)),
    };

    let startup = async {
        ready.await.map_err(|_| SessionError::Disconnected)?;
        connector
            .prepare(&client)
            .await
            .map_err(SessionError::Prepare)
    };
    let outcome = match time::timeout_at(deadline, startup).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SessionError::Timeout(ready_timeout)),
    };

    match outcome {
        Ok(()) => Ok(client),
        Err(e) => {
            match time::timeout(ready_timeout, connector.teardown(client)).await {
                Ok(Ok(())) => {}
                Ok(Err(teardown)) => {
                    warn!("Failed to tear down abandoned client: {:#}", teardown);
                }
                Err(_) => warn!("Timed out tearing down abandoned client"),
            }
            Err(e)
        }
    }
}
