pub mod gateway;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use poise::serenity_prelude::GuildId;
use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SessionError},
    store::{CredentialStore, GuildCredential},
};
use session::Connector;

/// `None` is the default client.
type Key = Option<GuildId>;

/// One login attempt, shared by every caller that looked the key up while it
/// was cached.
struct Attempt<C> {
    result: OnceCell<std::result::Result<C, Arc<SessionError>>>,
    release: Mutex<Release>,
}

#[derive(Default)]
struct Release {
    evicted: bool,
    claimed: bool,
}

impl<C: Clone> Attempt<C> {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            release: Mutex::new(Release::default()),
        }
    }

    /// Marks the attempt as evicted and claims its client if it is ready.
    fn evict(&self) -> Option<C> {
        let mut release = self.release.lock();
        release.evicted = true;
        self.claim(&mut release)
    }

    /// Claims the client of an attempt that was evicted before it finished.
    fn claim_if_evicted(&self) -> Option<C> {
        let mut release = self.release.lock();
        if !release.evicted {
            return None;
        }
        self.claim(&mut release)
    }

    fn claim(&self, release: &mut Release) -> Option<C> {
        if release.claimed {
            return None;
        }
        match self.result.get() {
            Some(Ok(client)) => {
                release.claimed = true;
                Some(client.clone())
            }
            _ => None,
        }
    }
}

struct Entry<C> {
    token: SecretString,
    created_at: DateTime<Utc>,
    attempt: Arc<Attempt<C>>,
}

impl<C: Clone> Entry<C> {
    fn new(token: SecretString) -> Self {
        Self {
            token,
            created_at: Utc::now(),
            attempt: Arc::new(Attempt::new()),
        }
    }

    fn state(&self) -> SessionState {
        match self.attempt.result.get() {
            None => SessionState::Pending,
            Some(Ok(_)) => SessionState::Ready,
            Some(Err(_)) => SessionState::Failed,
        }
    }

    fn uses(&self, token: &SecretString) -> bool {
        self.token.expose_secret() == token.expose_secret()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Ready,
    Failed,
}

/// Snapshot of one cache entry, without its credential.
#[derive(Debug, Clone)]
pub struct CachedClient {
    pub guild_id: Option<GuildId>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Vanity entries present when the sweep started.
    pub checked: usize,
    pub evicted: Vec<GuildId>,
}

/// Cache of logged-in gateway clients, one per bot credential in use.
///
/// Every guild resolves to either the default client or its own vanity
/// client. Entries are installed before the login starts, so concurrent
/// lookups for a guild share a single connection attempt.
pub struct ClientManager<C: Connector, S: CredentialStore> {
    connector: Arc<C>,
    store: S,
    primary_token: SecretString,
    ready_timeout: Duration,
    entries: Mutex<HashMap<Key, Entry<C::Client>>>,
}

impl<C: Connector, S: CredentialStore> ClientManager<C, S> {
    pub fn new(
        connector: C,
        store: S,
        primary_token: SecretString,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            store,
            primary_token,
            ready_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The client logged in with the platform token.
    pub async fn default_client(&self) -> Result<C::Client> {
        Ok(self.session(None, &self.primary_token).await?)
    }

    /// The client that should act in `guild_id`.
    ///
    /// Guilds without a vanity credential get the default client. `Ok(None)`
    /// means the guild has a vanity credential but its login failed.
    pub async fn client_for_guild(&self, guild_id: GuildId) -> Result<Option<C::Client>> {
        let Some(token) = self.store.credential_for_guild(guild_id).await? else {
            if self.evict(Some(guild_id)) {
                info!(%guild_id, "Vanity credential removed, falling back to default client");
            }
            return self.default_client().await.map(Some);
        };

        match self.session(Some(guild_id), &token).await {
            Ok(client) => Ok(Some(client)),
            Err(e) => {
                warn!(%guild_id, "Vanity client unavailable: {}", e);
                Ok(None)
            }
        }
    }

    /// The default client followed by every vanity client that could log in.
    pub async fn all_clients(&self) -> Result<Vec<C::Client>> {
        let mut clients = vec![self.default_client().await?];

        for GuildCredential { guild_id, token } in self.store.guild_credentials().await? {
            match self.session(Some(guild_id), &token).await {
                Ok(client) => clients.push(client),
                Err(e) => warn!(%guild_id, "Skipping vanity client: {}", e),
            }
        }

        Ok(clients)
    }

    /// Evicts cached vanity clients whose credential has been rotated.
    ///
    /// Only guilds the store still reports are compared. Cached guilds
    /// missing from the listing are left alone, as is the default client.
    /// A failed listing leaves the cache untouched.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let reported = self.store.guild_credentials().await?;

        let (checked, stale) = {
            let mut entries = self.entries.lock();
            let checked = entries.keys().filter(|key| key.is_some()).count();
            let stale: Vec<_> = reported
                .into_iter()
                .filter_map(|credential| {
                    let key = Some(credential.guild_id);
                    let rotated = entries
                        .get(&key)
                        .is_some_and(|entry| !entry.uses(&credential.token));
                    if rotated {
                        entries.remove(&key).map(|entry| (credential.guild_id, entry))
                    } else {
                        None
                    }
                })
                .collect();
            (checked, stale)
        };

        let mut report = SweepReport {
            checked,
            evicted: Vec::with_capacity(stale.len()),
        };
        for (guild_id, entry) in stale {
            self.release(Some(guild_id), entry);
            report.evicted.push(guild_id);
        }

        info!(
            checked = report.checked,
            evicted = report.evicted.len(),
            "Client sweep finished"
        );
        Ok(report)
    }

    /// Drops the cached entry for `guild_id`, returning whether one existed.
    pub fn evict(&self, guild_id: Option<GuildId>) -> bool {
        let removed = self.entries.lock().remove(&guild_id);
        match removed {
            Some(entry) => {
                self.release(guild_id, entry);
                true
            }
            None => false,
        }
    }

    pub fn cached_clients(&self) -> Vec<CachedClient> {
        let mut cached: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| CachedClient {
                guild_id: *key,
                state: entry.state(),
                created_at: entry.created_at,
            })
            .collect();
        cached.sort_by_key(|c| c.guild_id);
        cached
    }

    /// Returns the shared attempt for `key`, starting one if the cached entry
    /// is missing, failed, or logged in with another token.
    async fn session(
        &self,
        key: Key,
        token: &SecretString,
    ) -> std::result::Result<C::Client, Arc<SessionError>> {
        let (attempt, replaced) = {
            let mut entries = self.entries.lock();
            let reusable = entries
                .get(&key)
                .filter(|entry| entry.uses(token) && entry.state() != SessionState::Failed)
                .map(|entry| Arc::clone(&entry.attempt));
            match reusable {
                Some(attempt) => (attempt, None),
                None => {
                    let entry = Entry::new(token.clone());
                    let attempt = Arc::clone(&entry.attempt);
                    (attempt, entries.insert(key, entry))
                }
            }
        };

        if let Some(old) = replaced {
            self.release(key, old);
        }

        let result = attempt
            .result
            .get_or_init(|| self.connect(key, token))
            .await
            .clone();

        if let Some(client) = attempt.claim_if_evicted() {
            debug!(guild_id = ?key, "Login finished after eviction");
            self.teardown(key, client);
        }
        result
    }

    async fn connect(
        &self,
        key: Key,
        token: &SecretString,
    ) -> std::result::Result<C::Client, Arc<SessionError>> {
        debug!(guild_id = ?key, "Logging in gateway client");
        match session::establish(self.connector.as_ref(), token, self.ready_timeout).await {
            Ok(client) => {
                info!(guild_id = ?key, "Gateway client ready");
                Ok(client)
            }
            Err(e) => {
                warn!(guild_id = ?key, "Gateway client login failed: {}", e);
                Err(Arc::new(e))
            }
        }
    }

    /// Hands a removed entry's client to the connector for teardown.
    ///
    /// A pending attempt keeps running for its waiters and is torn down by
    /// whichever of them sees it finish. Teardown failures are only logged.
    fn release(&self, key: Key, entry: Entry<C::Client>) {
        match entry.attempt.evict() {
            Some(client) => self.teardown(key, client),
            None if entry.state() == SessionState::Pending => {
                debug!(guild_id = ?key, "Evicted a pending client, tearing it down once ready");
            }
            None => {}
        }
    }

    fn teardown(&self, key: Key, client: C::Client) {
        let connector = Arc::clone(&self.connector);
        tokio::spawn(async move {
            if let Err(e) = connector.teardown(client).await {
                warn!(guild_id = ?key, "Failed to tear down evicted client: {:#}", e);
            }
        });
    }
}
