use async_trait::async_trait;
use poise::serenity_prelude::GuildId;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::error::StoreError;

const API_TIMEOUT: Duration = Duration::from_secs(5);

/// A guild's custom bot credential, as reported by the settings service.
#[derive(Debug, Clone)]
pub struct GuildCredential {
    pub guild_id: GuildId,
    pub token: SecretString,
}

/// Source of truth for per-guild vanity credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn credential_for_guild(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<SecretString>, StoreError>;

    async fn guild_credentials(&self) -> Result<Vec<GuildCredential>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct VanityClientResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VanityClientRow {
    guild_id: String,
    token: String,
}

/// HTTP client for the backend's vanity-client endpoints.
#[derive(Debug)]
pub struct SettingsClient {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl SettingsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<SecretString>,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(StoreError::Url(base_url));
        }

        Ok(Self {
            client: Client::builder().timeout(API_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl CredentialStore for SettingsClient {
    async fn credential_for_guild(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<SecretString>, StoreError> {
        let resp = self
            .get(&format!("/vanity-clients/{guild_id}"))
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: VanityClientResponse = resp.json().await?;
                Ok(non_empty(body.token))
            }
            status => Err(StoreError::Status(status)),
        }
    }

    async fn guild_credentials(&self) -> Result<Vec<GuildCredential>, StoreError> {
        let resp = self.get("/vanity-clients").send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status()));
        }

        let rows: Vec<VanityClientRow> = resp.json().await?;
        Ok(into_credentials(rows))
    }
}

fn non_empty(token: Option<String>) -> Option<SecretString> {
    token.filter(|t| !t.is_empty()).map(SecretString::new)
}

fn into_credentials(rows: Vec<VanityClientRow>) -> Vec<GuildCredential> {
    rows.into_iter()
        .filter_map(|row| {
            let guild_id = match row.guild_id.parse::<u64>() {
                Ok(id) if id != 0 => GuildId::new(id),
                _ => {
                    warn!("Skipping vanity client with invalid guild id {:?}", row.guild_id);
                    return None;
                }
            };
            let token = non_empty(Some(row.token))?;
            Some(GuildCredential { guild_id, token })
        })
        .collect()
}
