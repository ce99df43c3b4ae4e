use poise::serenity_prelude::UserId;
use secrecy::SecretString;
use std::{collections::HashSet, env, time::Duration};
use thiserror::Error;
use tracing::info;

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration, read from the environment at startup.
#[derive(Debug)]
pub struct Settings {
    /// Primary bot credential, used by the default client.
    pub discord_token: SecretString,
    /// Base url of the backend settings service.
    pub settings_api_url: String,
    pub settings_api_token: Option<SecretString>,
    pub ready_timeout: Duration,
    pub sweep_interval: Duration,
    /// Users allowed to run the `/clients` commands, on top of the application owner.
    pub owners: HashSet<UserId>,
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let settings = Self::from_lookup(|name| env::var(name).ok())?;
        info!(
            api = %settings.settings_api_url,
            ready_timeout = ?settings.ready_timeout,
            sweep_interval = ?settings.sweep_interval,
            "Loaded settings"
        );
        Ok(settings)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(SettingsError::Missing(name))
        };
        let seconds = |name: &'static str, default: Duration| match lookup(name) {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => Err(SettingsError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                }),
                Ok(secs) => Ok(Duration::from_secs(secs)),
                Err(e) => Err(SettingsError::Invalid {
                    name,
                    reason: e.to_string(),
                }),
            },
        };

        let owners = match lookup("BOT_OWNER_IDS") {
            None => HashSet::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<u64>()
                        .ok()
                        .filter(|id| *id != 0)
                        .map(UserId::new)
                        .ok_or_else(|| SettingsError::Invalid {
                            name: "BOT_OWNER_IDS",
                            reason: format!("`{id}` is not a user id"),
                        })
                })
                .collect::<Result<_, _>>()?,
        };

        Ok(Self {
            discord_token: SecretString::new(required("DISCORD_TOKEN")?),
            settings_api_url: required("SETTINGS_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            settings_api_token: lookup("SETTINGS_API_TOKEN")
                .filter(|v| !v.is_empty())
                .map(SecretString::new),
            ready_timeout: seconds("CLIENT_READY_TIMEOUT_SECS", DEFAULT_READY_TIMEOUT)?,
            sweep_interval: seconds("CLIENT_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL)?,
            owners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn applies_defaults() {
        let settings = load(&[
            ("DISCORD_TOKEN", "primary"),
            ("SETTINGS_API_URL", "http://backend:3000/api/"),
        ])
        .unwrap();

        assert_eq!(settings.discord_token.expose_secret(), "primary");
        assert_eq!(settings.settings_api_url, "http://backend:3000/api");
        assert!(settings.settings_api_token.is_none());
        assert_eq!(settings.ready_timeout, Duration::from_secs(10));
        assert_eq!(settings.sweep_interval, Duration::from_secs(86_400));
        assert!(settings.owners.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let settings = load(&[
            ("DISCORD_TOKEN", "primary"),
            ("SETTINGS_API_URL", "http://backend"),
            ("SETTINGS_API_TOKEN", "rpc-secret"),
            ("CLIENT_READY_TIMEOUT_SECS", "3"),
            ("CLIENT_SWEEP_INTERVAL_SECS", "600"),
            ("BOT_OWNER_IDS", "12, 34"),
        ])
        .unwrap();

        assert_eq!(
            settings.settings_api_token.unwrap().expose_secret(),
            "rpc-secret"
        );
        assert_eq!(settings.ready_timeout, Duration::from_secs(3));
        assert_eq!(settings.sweep_interval, Duration::from_secs(600));
        assert_eq!(
            settings.owners,
            HashSet::from([UserId::new(12), UserId::new(34)])
        );
    }

    #[test]
    fn rejects_missing_and_malformed_values() {
        assert_eq!(
            load(&[("SETTINGS_API_URL", "http://backend")]).unwrap_err(),
            SettingsError::Missing("DISCORD_TOKEN")
        );
        assert_eq!(
            load(&[("DISCORD_TOKEN", "primary")]).unwrap_err(),
            SettingsError::Missing("SETTINGS_API_URL")
        );

        let err = load(&[
            ("DISCORD_TOKEN", "primary"),
            ("SETTINGS_API_URL", "http://backend"),
            ("CLIENT_READY_TIMEOUT_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                name: "CLIENT_READY_TIMEOUT_SECS",
                ..
            }
        ));

        let err = load(&[
            ("DISCORD_TOKEN", "primary"),
            ("SETTINGS_API_URL", "http://backend"),
            ("BOT_OWNER_IDS", "abc"),
        ])
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { name: "BOT_OWNER_IDS", .. }));
    }
}
