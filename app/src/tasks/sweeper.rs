use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::{
    clients::{session::Connector, ClientManager},
    store::CredentialStore,
    Error,
};

use super::TaskHandler;

/// Periodically evicts vanity clients whose credential was rotated.
pub struct SweepTask<C: Connector, S: CredentialStore> {
    manager: Arc<ClientManager<C, S>>,
    interval: Duration,
}

impl<C: Connector, S: CredentialStore> SweepTask<C, S> {
    pub fn new(manager: Arc<ClientManager<C, S>>, interval: Duration) -> Self {
        Self { manager, interval }
    }
}

#[async_trait]
impl<C: Connector, S: CredentialStore> TaskHandler for SweepTask<C, S> {
    fn name(&self) -> &'static str {
        "client_sweeper"
    }

    async fn run(&mut self) -> Result<(), Error> {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            info!("Starting client sweep");

            if let Err(e) = self.manager.sweep().await {
                error!("Client sweep failed, retrying next interval: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::testing::manager;
    use poise::serenity_prelude::GuildId;
    use std::sync::atomic::Ordering;

    const INTERVAL: Duration = Duration::from_secs(60);

    fn cached(manager: &crate::clients::testing::TestManager) -> Vec<Option<GuildId>> {
        manager.cached_clients().iter().map(|c| c.guild_id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_each_interval() {
        let (manager, _connector, store) = manager();
        store.set(200, "tok-A");
        manager.client_for_guild(GuildId::new(200)).await.unwrap();
        store.set(200, "tok-B");

        let mut task = SweepTask::new(Arc::clone(&manager), INTERVAL);
        let handle = tokio::spawn(async move { task.run().await });

        time::sleep(INTERVAL / 2).await;
        assert_eq!(cached(&manager), vec![Some(GuildId::new(200))]);

        time::sleep(INTERVAL).await;
        assert!(cached(&manager).is_empty());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_running_after_failed_sweep() {
        let (manager, _connector, store) = manager();
        store.set(200, "tok-A");
        manager.client_for_guild(GuildId::new(200)).await.unwrap();
        store.set(200, "tok-B");
        store.unavailable.store(true, Ordering::SeqCst);

        let mut task = SweepTask::new(Arc::clone(&manager), INTERVAL);
        let handle = tokio::spawn(async move { task.run().await });

        time::sleep(INTERVAL + INTERVAL / 2).await;
        assert_eq!(cached(&manager), vec![Some(GuildId::new(200))]);
        assert!(!handle.is_finished());

        store.unavailable.store(false, Ordering::SeqCst);
        time::sleep(INTERVAL).await;
        assert!(cached(&manager).is_empty());

        handle.abort();
    }
}
