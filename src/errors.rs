use std::io;

use reqwest::StatusCode;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("fetch queue is full")]
    QueueFull,
    #[error("fetch queue worker has stopped")]
    QueueClosed,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure of a single outbound provider call.
///
/// Callers that only care about "data or no data" collapse this to an empty
/// result; tests use the variants to tell an erroring provider from one that
/// simply had nothing to return.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} credentials are not configured")]
    MissingCredentials { provider: &'static str },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} responded with {status}")]
    Status {
        provider: &'static str,
        status: StatusCode,
    },
    #[error("{provider} returned an unexpected payload: {source}")]
    Malformed {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::MissingCredentials { provider }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Malformed { provider, .. } => provider,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::MissingCredentials { .. } => "missing_credentials",
            ProviderError::Transport { .. } => "transport",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed { .. } => "malformed",
        }
    }
}

/// Sends a prepared request and decodes a JSON body, classifying every
/// failure into a [`ProviderError`].
pub(crate) async fn send_json<T>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> ProviderResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let response = request
        .send()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status { provider, status });
    }

    let body = response
        .text()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;
    serde_json::from_str(&body).map_err(|source| ProviderError::Malformed { provider, source })
}
