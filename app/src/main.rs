mod clients;
mod commands;
mod error;
mod events;
mod settings;
mod store;
mod tasks;

use clients::{gateway::SerenityConnector, ClientManager};
use poise::serenity_prelude as serenity;
use settings::Settings;
use std::sync::Arc;
use store::SettingsClient;
use tasks::{
    control::{self, ControlHandle, ControlTask},
    sweeper::SweepTask,
    TaskManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct Data {
    pub control: ControlHandle,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let settings = Settings::load()?;
    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let (control, receiver) = control::channel();
    let store = SettingsClient::new(
        settings.settings_api_url.clone(),
        settings.settings_api_token.clone(),
    )?;
    let connector = SerenityConnector::new(intents, settings.owners.clone(), control);
    let manager = Arc::new(ClientManager::new(
        connector,
        store,
        settings.discord_token.clone(),
        settings.ready_timeout,
    ));

    let mut task_manager = TaskManager::new();
    task_manager.register_task(SweepTask::new(Arc::clone(&manager), settings.sweep_interval));
    task_manager.register_task(ControlTask::new(Arc::clone(&manager), receiver));
    task_manager.run_all();

    let clients = manager.all_clients().await?;
    info!("Started {} clients", clients.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
