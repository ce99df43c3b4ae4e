use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, GatewayIntents};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::session::{Connector, Login};
use crate::{commands, events::event_handler, tasks::control::ControlHandle, Data, Error};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// A logged-in serenity client. Clones share the same gateway connection.
#[derive(Clone)]
pub struct Session {
    id: u64,
    pub http: Arc<serenity::Http>,
    shard_manager: Arc<serenity::ShardManager>,
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Logs in serenity clients running the `/clients` admin framework.
pub struct SerenityConnector {
    intents: GatewayIntents,
    owners: HashSet<serenity::UserId>,
    control: ControlHandle,
}

impl SerenityConnector {
    pub fn new(
        intents: GatewayIntents,
        owners: HashSet<serenity::UserId>,
        control: ControlHandle,
    ) -> Self {
        Self {
            intents,
            owners,
            control,
        }
    }

    fn framework(&self, ready: oneshot::Sender<()>) -> poise::Framework<Data, Error> {
        let data = Data {
            control: self.control.clone(),
        };

        poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![commands::clients::clients()],
                owners: self.owners.clone(),
                event_handler: |ctx, event, framework, data| {
                    Box::pin(event_handler(ctx, event, framework, data))
                },
                ..Default::default()
            })
            .setup(move |_ctx, ready_event, _framework| {
                Box::pin(async move {
                    info!("Logged in as {}", ready_event.user.name);
                    let _ = ready.send(());
                    Ok(data)
                })
            })
            .build()
    }
}

#[async_trait]
impl Connector for SerenityConnector {
    type Client = Session;

    async fn login(&self, token: &SecretString) -> anyhow::Result<Login<Session>> {
        let (ready_tx, ready_rx) = oneshot::channel();

        let mut client = serenity::ClientBuilder::new(token.expose_secret(), self.intents)
            .framework(self.framework(ready_tx))
            .await?;

        let session = Session {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            http: Arc::clone(&client.http),
            shard_manager: Arc::clone(&client.shard_manager),
        };

        let id = session.id;
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(session = id, "Gateway client exited: {}", e);
            }
        });

        Ok(Login {
            client: session,
            ready: ready_rx,
        })
    }

    async fn prepare(&self, client: &Session) -> anyhow::Result<()> {
        poise::builtins::register_globally(&client.http, &[commands::clients::clients()]).await?;
        info!(session = client.id, "Registered admin commands");
        Ok(())
    }

    async fn teardown(&self, client: Session) -> anyhow::Result<()> {
        info!(session = client.id, "Shutting down gateway client");
        client.shard_manager.shutdown_all().await;
        Ok(())
    }
}
