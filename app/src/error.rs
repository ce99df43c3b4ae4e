use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Why a gateway session could not be brought to the ready state.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("gateway login failed: {0:#}")]
    Login(anyhow::Error),

    #[error("client did not become ready within {0:?}")]
    Timeout(Duration),

    #[error("gateway connection closed before ready")]
    Disconnected,

    #[error("post-ready setup failed: {0:#}")]
    Prepare(anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("settings API error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("settings API responded with {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid settings API url: {0}")]
    Url(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("credential lookup failed: {0}")]
    Store(#[from] StoreError),

    /// Shared between every caller that awaited the same login attempt.
    #[error(transparent)]
    Session(#[from] Arc<SessionError>),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("client control task is not running")]
    Closed,

    #[error(transparent)]
    Client(#[from] ClientError),
}
