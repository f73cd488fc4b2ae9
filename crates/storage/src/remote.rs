use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{domain::ZoneId, protocol::Document};
use tracing::debug;
use url::Url;

use crate::{DocumentStore, ListingQuery, StoreError};

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneListResponse {
    pub zone_ids: Vec<ZoneId>,
}

/// HTTP/JSON client for the hosted document store.
pub struct RemoteStore {
    http: Client,
    base_url: Url,
}

impl RemoteStore {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn parse(base_url: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| StoreError::MalformedQuery(format!("invalid store url {base_url}: {err}")))?;
        Ok(Self::new(base_url))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::MalformedQuery(format!("store url {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                StoreError::MalformedQuery(body)
            }
            _ => StoreError::Unavailable(format!("{status}: {body}")),
        })
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Transport(err)
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let url = self.endpoint(&["v1", "query"])?;
        debug!(collection = %query.collection, limit = query.limit, "remote store query");
        let response = self
            .http
            .post(url)
            .json(query)
            .send()
            .await
            .map_err(transport)?;
        let body: QueryResponse = Self::check(response).await?.json().await?;
        Ok(body.documents)
    }

    async fn zone_ids(&self) -> Result<Vec<ZoneId>, StoreError> {
        let url = self.endpoint(&["v1", "zones"])?;
        let response = self.http.get(url).send().await.map_err(transport)?;
        let body: ZoneListResponse = Self::check(response).await?.json().await?;
        Ok(body.zone_ids)
    }

    async fn zone_aggregate(&self, zone_id: &ZoneId) -> Result<Option<Value>, StoreError> {
        let url = self.endpoint(&["v1", "zones", zone_id.as_str(), "aggregate"])?;
        let response = self.http.get(url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::check(response).await?.json().await?;
        Ok(Some(body))
    }
}
