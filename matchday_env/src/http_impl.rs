//! Production implementation of MatchStore over the match REST API.

use crate::error::StoreError;
use crate::types::{Fixture, FixtureUpdate, Player, TeamId};
use crate::MatchStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Header carrying the simulator's service token.
pub const TOKEN_HEADER: &str = "X-Simulator-Token";

/// Connection settings for the match API.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// API root, e.g. `http://localhost:3000/api`
    pub base_url: String,
    
    /// Service token sent with every request
    pub token: Option<String>,
    
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// REST client for the match API.
///
/// Endpoints:
/// - `GET  {base}/matches`
/// - `GET  {base}/teams/{id}/players`
/// - `PUT  {base}/matches/{id}` with `{status, homeTeamScore, awayTeamScore}`
pub struct HttpMatchStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMatchStore {
    /// Builds a client from the given settings.
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.token {
            let value = reqwest::header::HeaderValue::from_str(token)
                .map_err(|e| StoreError::transport(format!("invalid token header: {e}")))?;
            headers.insert(TOKEN_HEADER, value);
        }
        
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::transport(format!("failed to build HTTP client: {e}")))?;
        
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
    
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
    
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let url = self.url(path);
        debug!(%url, "GET");
        
        let resp = self.client.get(&url).send().await.map_err(transport_error)?;
        let resp = check_status(resp).await?;
        
        resp.json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{url}: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MatchStore for HttpMatchStore {
    async fn list_fixtures(&self) -> Result<Vec<Fixture>, StoreError> {
        self.get_json("/matches").await
    }
    
    async fn list_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError> {
        self.get_json(&format!("/teams/{}/players", team.0)).await
    }
    
    async fn update_fixture(&self, update: &FixtureUpdate) -> Result<(), StoreError> {
        let url = self.url(&format!("/matches/{}", update.fixture_id.0));
        debug!(%url, status = %update.status, "PUT");
        
        let resp = self.client
            .put(&url)
            .json(update)
            .send()
            .await
            .map_err(transport_error)?;
        
        check_status(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpMatchStore::new(HttpStoreConfig {
            base_url: "http://store.local/api/".into(),
            ..HttpStoreConfig::default()
        })
        .unwrap();
        
        assert_eq!(store.url("/matches"), "http://store.local/api/matches");
    }
    
    #[test]
    fn test_invalid_token_rejected() {
        let result = HttpMatchStore::new(HttpStoreConfig {
            token: Some("bad\ntoken".into()),
            ..HttpStoreConfig::default()
        });
        
        assert!(matches!(result, Err(StoreError::Transport(_))));
    }
    
    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        let store = HttpMatchStore::new(HttpStoreConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_millis(500),
            ..HttpStoreConfig::default()
        })
        .unwrap();
        
        let err = store.list_fixtures().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
