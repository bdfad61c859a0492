//! REST transport for collection fetches and mutation legs.
//!
//! Screens and the fetch orchestrator never hold a `reqwest` client
//! directly; they go through [`Transport`] so tests can script responses
//! with [`MockTransport`].

use crate::config::{ClientConfig, ConfigError};
use async_trait::async_trait;
use brigade_cache::FetchPage;
use brigade_core::{CacheError, Entity, EntityId, VenueId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::form_urlencoded;

pub use reqwest::Method;

/// One JSON round trip to the dashboard API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CacheError>;
}

// ============================================================================
// REST CLIENT
// ============================================================================

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: err.to_string(),
            })?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            headers.insert(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_str(api_key).map_err(|err| ConfigError::InvalidValue {
                    field: "api_key",
                    reason: err.to_string(),
                })?,
            );
        }

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CacheError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| CacheError::network(err.status().map(|s| s.as_u16()), err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            let message = response.text().await.unwrap_or_default();
            return Err(CacheError::conflict(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CacheError::network(Some(status.as_u16()), message));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| CacheError::network(None, format!("malformed response body: {err}")))
    }
}

// ============================================================================
// TYPED COLLECTION ENDPOINTS
// ============================================================================

/// Paginated list response shape shared by every collection endpoint.
#[derive(Debug, Deserialize)]
struct PageBody<T> {
    items: Vec<T>,
    cursor: Option<String>,
    has_more: bool,
    total_count: u64,
}

/// Typed view of one resource's REST endpoints, routed by
/// `ResourceKind::path_segment`.
pub struct CollectionClient<T: Entity> {
    transport: Arc<dyn Transport>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for CollectionClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> CollectionClient<T> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            _marker: PhantomData,
        }
    }

    fn collection_path(venue: VenueId) -> String {
        format!(
            "/api/v1/venues/{}/{}",
            venue,
            T::resource().path_segment()
        )
    }

    fn item_path(venue: VenueId, id: EntityId) -> String {
        format!("{}/{}", Self::collection_path(venue), id)
    }

    /// Fetch the whole scope, for the flat view.
    pub async fn list_all(&self, venue: VenueId) -> Result<FetchPage<T>, CacheError> {
        let path = format!("{}?view=all", Self::collection_path(venue));
        let body = self.transport.request(Method::GET, &path, None).await?;
        parse_page(body)
    }

    /// Fetch one window, optionally resuming from a cursor. The cursor
    /// is opaque server data, so it is form-encoded rather than trusted
    /// to be query-safe.
    pub async fn list_window(
        &self,
        venue: VenueId,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<FetchPage<T>, CacheError> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("limit", &limit.to_string());
        if let Some(cursor) = cursor {
            query.append_pair("cursor", cursor);
        }
        let path = format!("{}?{}", Self::collection_path(venue), query.finish());
        let body = self.transport.request(Method::GET, &path, None).await?;
        parse_page(body)
    }

    pub async fn get(&self, venue: VenueId, id: EntityId) -> Result<Option<T>, CacheError> {
        let body = self
            .transport
            .request(Method::GET, &Self::item_path(venue, id), None)
            .await?;
        parse_entity(body)
    }

    pub async fn create(&self, entity: &T) -> Result<Option<T>, CacheError> {
        let payload = serde_json::to_value(entity)
            .map_err(|err| CacheError::parse("rest", err.to_string()))?;
        let body = self
            .transport
            .request(
                Method::POST,
                &Self::collection_path(entity.venue_id()),
                Some(payload),
            )
            .await?;
        parse_entity(body)
    }

    pub async fn update(
        &self,
        venue: VenueId,
        id: EntityId,
        patch: &Value,
    ) -> Result<Option<T>, CacheError> {
        let body = self
            .transport
            .request(
                Method::PATCH,
                &Self::item_path(venue, id),
                Some(patch.clone()),
            )
            .await?;
        parse_entity(body)
    }

    pub async fn delete(&self, venue: VenueId, id: EntityId) -> Result<Option<T>, CacheError> {
        self.transport
            .request(Method::DELETE, &Self::item_path(venue, id), None)
            .await?;
        Ok(None)
    }
}

fn parse_page<T: Entity>(body: Value) -> Result<FetchPage<T>, CacheError> {
    let page: PageBody<T> = serde_json::from_value(body)
        .map_err(|err| CacheError::parse("rest", err.to_string()))?;
    Ok(FetchPage {
        items: page.items,
        cursor: page.cursor,
        has_more: page.has_more,
        total_count: page.total_count,
    })
}

fn parse_entity<T: Entity>(body: Value) -> Result<Option<T>, CacheError> {
    if body.is_null() {
        return Ok(None);
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|err| CacheError::parse("rest", err.to_string()))
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// What one request looked like, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Scripted transport: responses are served in enqueue order and every
/// request is recorded. Lives here rather than in the test crate so the
/// cache-side suites can drive the same seam.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, CacheError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_ok(&self, body: Value) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(body));
    }

    pub fn enqueue_err(&self, err: CacheError) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CacheError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                method,
                path: path.to_string(),
                body,
            });
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(CacheError::network(None, "no scripted response left"))
            })
    }
}
