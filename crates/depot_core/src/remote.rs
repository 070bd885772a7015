//! HTTP client for the warehouse backend

use crate::manager::RemoteApi;
use crate::queue::{MutationRecord, Operation};
use async_trait::async_trait;
use depot_common::{Collection, DepotError, MovementKind, Result};
use depot_config::RemoteConfig;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::time::Duration;

/// Read-side of the backend used to seed empty local collections
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Whether the backend is ready to serve snapshots
    async fn health(&self) -> bool;

    async fn fetch_snapshot(&self, collection: Collection) -> Result<Vec<serde_json::Value>>;
}

pub struct HttpRemote {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DepotError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// HTTP method and path that replays `record`
    pub fn route(record: &MutationRecord) -> Result<(Method, String)> {
        let path = match record.collection {
            Collection::Clients => "/warehouse/clients",
            Collection::Products => "/warehouse/products",
            Collection::Sales => "/warehouse/sales",
            Collection::StockMovements => {
                let kind = record
                    .payload
                    .get("kind")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DepotError::ValidationError(format!("{} has no movement kind", record.id))
                    })?;
                match kind.parse::<MovementKind>()? {
                    MovementKind::Entry => "/warehouse/movements/entry",
                    MovementKind::Exit => "/warehouse/movements/exit",
                    MovementKind::DirectSale => "/warehouse/sale-direct",
                }
            }
        };

        if record.operation == Operation::Create {
            return Ok((Method::POST, path.to_string()));
        }

        let id = record.entity_id().ok_or_else(|| {
            DepotError::ValidationError(format!("{} payload has no id", record.id))
        })?;
        let method = match record.operation {
            Operation::Update => Method::PUT,
            _ => Method::DELETE,
        };
        Ok((method, format!("{}/{}", path, id)))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn apply(&self, record: &MutationRecord) -> Result<()> {
        let (method, path) = Self::route(record)?;
        tracing::debug!("{} {} for {}", method, path, record.id);

        let mut request = self.request(method.clone(), &path);
        if method != Method::DELETE {
            request = request.json(&record.payload);
        }

        let response = request.send().await.map_err(transport_err)?;
        check_status(response.status(), &path)
    }
}

#[async_trait]
impl SnapshotSource for HttpRemote {
    /// `GET /health`; any transport failure or non-2xx answer is unhealthy.
    async fn health(&self) -> bool {
        match self.request(Method::GET, "/health").send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        }
    }

    async fn fetch_snapshot(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        let path = match collection {
            Collection::Clients => "/warehouse/clients",
            Collection::Products => "/warehouse/products",
            Collection::Sales => "/warehouse/sales",
            Collection::StockMovements => "/warehouse/movements/history",
        };

        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(transport_err)?;
        check_status(response.status(), path)?;

        let body: serde_json::Value = response.json().await.map_err(transport_err)?;
        items_of(body).ok_or_else(|| {
            DepotError::RemoteError(format!("{} did not return a list", path))
        })
    }
}

/// Accepts a bare array or an `{ "items": [...] }` envelope.
fn items_of(body: serde_json::Value) -> Option<Vec<serde_json::Value>> {
    match body {
        serde_json::Value::Array(items) => Some(items),
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn check_status(status: StatusCode, path: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DepotError::RemoteError(format!("{} answered {}", path, status)))
    }
}

fn transport_err(e: reqwest::Error) -> DepotError {
    if e.is_timeout() || e.is_connect() {
        DepotError::NetworkError(e.to_string())
    } else {
        DepotError::RemoteError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(operation: Operation, collection: Collection, payload: serde_json::Value) -> MutationRecord {
        MutationRecord::new(operation, collection, payload)
    }

    #[test]
    fn test_route_entities() {
        let create = record(Operation::Create, Collection::Clients, json!({"id": "c1"}));
        assert_eq!(
            HttpRemote::route(&create).unwrap(),
            (Method::POST, "/warehouse/clients".to_string())
        );

        let update = record(Operation::Update, Collection::Products, json!({"id": "p1"}));
        assert_eq!(
            HttpRemote::route(&update).unwrap(),
            (Method::PUT, "/warehouse/products/p1".to_string())
        );

        let delete = record(Operation::Delete, Collection::Sales, json!({"id": "s1"}));
        assert_eq!(
            HttpRemote::route(&delete).unwrap(),
            (Method::DELETE, "/warehouse/sales/s1".to_string())
        );
    }

    #[test]
    fn test_route_movements_by_kind() {
        let cases = [
            ("entry", "/warehouse/movements/entry"),
            ("exit", "/warehouse/movements/exit"),
            ("direct_sale", "/warehouse/sale-direct"),
        ];
        for (kind, path) in cases {
            let r = record(
                Operation::Create,
                Collection::StockMovements,
                json!({"id": "m1", "kind": kind}),
            );
            assert_eq!(HttpRemote::route(&r).unwrap().1, path);
        }

        let missing = record(Operation::Create, Collection::StockMovements, json!({"id": "m2"}));
        assert!(matches!(
            HttpRemote::route(&missing),
            Err(DepotError::ValidationError(_))
        ));
    }

    #[test]
    fn test_update_without_id_is_rejected() {
        let r = record(Operation::Update, Collection::Clients, json!({"name": "Ana"}));
        assert!(HttpRemote::route(&r).is_err());
    }

    #[test]
    fn test_items_envelope() {
        assert_eq!(items_of(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(items_of(json!({"items": [1]})).unwrap().len(), 1);
        assert!(items_of(json!({"total": 0})).is_none());
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let config = RemoteConfig {
            base_url: "http://localhost:8000/".into(),
            ..Default::default()
        };
        let remote = HttpRemote::new(&config).unwrap();
        assert_eq!(remote.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = RemoteConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            ..Default::default()
        };
        let remote = HttpRemote::new(&config).unwrap();

        assert!(!remote.health().await);
        let r = record(Operation::Create, Collection::Clients, json!({"id": "c1"}));
        let err = remote.apply(&r).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
