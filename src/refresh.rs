//! Reward-token refresh through an identity-token exchange.
//!
//! The login flow that turns an identity token into a reward-site bearer
//! token lives outside this crate; [`IdentityExchange`] is its contract.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{RefreshConfig, UpstreamConfig};
use crate::credentials::{mask, CredentialPatch, CredentialStore};
use crate::upstream::schema::Envelope;
use crate::upstream::Upstream;

/// Tokens handed back by a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedTokens {
    pub reward_token: String,
    pub connect_token: Option<String>,
    pub identity_token: Option<String>,
}

#[async_trait]
pub trait IdentityExchange: Send + Sync {
    /// `None` when the exchange did not produce a reward token.
    async fn exchange(&self, identity_token: &str, connect_token: &str) -> Option<ExchangedTokens>;
}

/// Used when no exchange endpoint is configured.
pub struct DisabledExchange;

#[async_trait]
impl IdentityExchange for DisabledExchange {
    async fn exchange(&self, _identity_token: &str, _connect_token: &str) -> Option<ExchangedTokens> {
        warn!("token refresh requested but refresh.exchange_url is not configured");
        None
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExchangeData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    connect_token: Option<String>,
    #[serde(default)]
    linux_do_token: Option<String>,
}

/// POSTs `{token, connect_token}` to an exchange service.
pub struct HttpIdentityExchange {
    client: Client,
    url: String,
}

impl HttpIdentityExchange {
    pub fn new(url: impl Into<String>, upstream: &UpstreamConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(upstream.timeout())
            .user_agent(upstream.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IdentityExchange for HttpIdentityExchange {
    async fn exchange(&self, identity_token: &str, connect_token: &str) -> Option<ExchangedTokens> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "token": identity_token, "connect_token": connect_token }))
            .send()
            .await
            .map_err(|e| warn!(error = %e, "identity exchange request failed"))
            .ok()?;

        if resp.status() != StatusCode::OK {
            warn!(status = resp.status().as_u16(), "identity exchange rejected");
            return None;
        }
        let env: Envelope<ExchangeData> = resp
            .json()
            .await
            .map_err(|e| warn!(error = %e, "identity exchange body undecodable"))
            .ok()?;
        if !env.success {
            warn!(message = ?env.message, "identity exchange reported failure");
            return None;
        }

        let data = env.data.unwrap_or_default();
        let reward_token = data.token.filter(|t| !t.is_empty())?;
        Some(ExchangedTokens {
            reward_token,
            connect_token: data.connect_token.filter(|t| !t.is_empty()),
            identity_token: data.linux_do_token.filter(|t| !t.is_empty()),
        })
    }
}

pub fn exchange_from_config(
    refresh: &RefreshConfig,
    upstream: &UpstreamConfig,
) -> reqwest::Result<Box<dyn IdentityExchange>> {
    Ok(match &refresh.exchange_url {
        Some(url) if !url.is_empty() => Box::new(HttpIdentityExchange::new(url.clone(), upstream)?),
        _ => Box::new(DisabledExchange),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no identity token stored; set one first")]
    NoIdentityToken,
    #[error("could not obtain a reward-site token; check that the identity token is still valid")]
    ExchangeFailed,
    #[error("new token could not be saved: {0}")]
    Persist(String),
}

/// Exchange the stored identity token and persist the new tokens.
///
/// Returns the masked reward token.
pub async fn refresh_reward_token(
    credentials: &dyn CredentialStore,
    exchange: &dyn IdentityExchange,
) -> Result<String, RefreshError> {
    let record = credentials.load();
    if record.linux_do_token.is_empty() && record.linux_do_connect_token.is_empty() {
        return Err(RefreshError::NoIdentityToken);
    }

    let tokens = exchange
        .exchange(&record.linux_do_token, &record.linux_do_connect_token)
        .await
        .ok_or(RefreshError::ExchangeFailed)?;

    credentials
        .try_save(&CredentialPatch {
            reward_token: Some(tokens.reward_token.clone()),
            connect_token: tokens.connect_token,
            identity_token: tokens.identity_token,
            ..Default::default()
        })
        .map_err(|e| RefreshError::Persist(e.to_string()))?;
    info!("reward-site token refreshed");
    Ok(mask(&tokens.reward_token))
}

/// A reward token is valid when the user-info endpoint accepts it.
pub async fn verify_reward_token(upstream: &dyn Upstream, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    matches!(upstream.user_info(token).await, Ok(env) if env.success)
}
