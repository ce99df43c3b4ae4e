use async_trait::async_trait;
use parking_lot::Mutex;
use poise::serenity_prelude::GuildId;
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::oneshot, time};

use super::{
    session::{Connector, Login},
    ClientManager,
};
use crate::{
    error::StoreError,
    store::{CredentialStore, GuildCredential},
};

pub(crate) const READY_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const LOGIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeClient {
    /// Login attempt that produced this client, starting at 1.
    pub(crate) id: usize,
    pub(crate) token: String,
}

/// Becomes ready after [`LOGIN_DELAY`] unless the token is rejected or hanging.
/// Stalled tokens never return from `login` or `prepare`.
#[derive(Default)]
pub(crate) struct FakeConnector {
    pub(crate) logins: AtomicUsize,
    pub(crate) teardowns: AtomicUsize,
    pub(crate) rejected: Mutex<HashSet<String>>,
    pub(crate) hanging: Mutex<HashSet<String>>,
    pub(crate) stalled_logins: Mutex<HashSet<String>>,
    pub(crate) stalled_prepares: Mutex<HashSet<String>>,
    parked: Mutex<Vec<oneshot::Sender<()>>>,
}

#[async_trait]
impl Connector for Arc<FakeConnector> {
    type Client = FakeClient;

    async fn login(&self, token: &SecretString) -> anyhow::Result<Login<FakeClient>> {
        let id = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let token = token.expose_secret().clone();
        if self.rejected.lock().contains(&token) {
            anyhow::bail!("invalid token");
        }
        let stalled = self.stalled_logins.lock().contains(&token);
        if stalled {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = oneshot::channel();
        if self.hanging.lock().contains(&token) {
            self.parked.lock().push(tx);
        } else {
            tokio::spawn(async move {
                time::sleep(LOGIN_DELAY).await;
                let _ = tx.send(());
            });
        }

        Ok(Login {
            client: FakeClient { id, token },
            ready: rx,
        })
    }

    async fn prepare(&self, client: &FakeClient) -> anyhow::Result<()> {
        let stalled = self.stalled_prepares.lock().contains(&client.token);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn teardown(&self, _client: FakeClient) -> anyhow::Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    credentials: Mutex<HashMap<GuildId, String>>,
    pub(crate) unavailable: AtomicBool,
}

impl FakeStore {
    pub(crate) fn set(&self, guild_id: u64, token: &str) {
        self.credentials
            .lock()
            .insert(GuildId::new(guild_id), token.to_string());
    }

    pub(crate) fn remove(&self, guild_id: u64) {
        self.credentials.lock().remove(&GuildId::new(guild_id));
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for Arc<FakeStore> {
    async fn credential_for_guild(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<SecretString>, StoreError> {
        self.check()?;
        Ok(self
            .credentials
            .lock()
            .get(&guild_id)
            .cloned()
            .map(SecretString::new))
    }

    async fn guild_credentials(&self) -> Result<Vec<GuildCredential>, StoreError> {
        self.check()?;
        let mut credentials: Vec<_> = self
            .credentials
            .lock()
            .iter()
            .map(|(guild_id, token)| GuildCredential {
                guild_id: *guild_id,
                token: SecretString::new(token.clone()),
            })
            .collect();
        credentials.sort_by_key(|c| c.guild_id);
        Ok(credentials)
    }
}

pub(crate) type TestManager = ClientManager<Arc<FakeConnector>, Arc<FakeStore>>;

pub(crate) fn manager() -> (Arc<TestManager>, Arc<FakeConnector>, Arc<FakeStore>) {
    let connector = Arc::new(FakeConnector::default());
    let store = Arc::new(FakeStore::default());
    let manager = ClientManager::new(
        Arc::clone(&connector),
        Arc::clone(&store),
        SecretString::new("primary".to_string()),
        READY_TIMEOUT,
    );
    (Arc::new(manager), connector, store)
}

/// Lets spawned teardown tasks run.
pub(crate) async fn settle() {
    time::sleep(Duration::from_millis(1)).await;
}
