//! Admin HTTP API
//!
//! A small axum router over a [`MemoryManager`] for inspecting and driving
//! a running daemon: health, stats, record CRUD, recall and on-demand
//! migration passes.

pub mod handlers;

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, TierMemError};
use crate::memory::{MemoryManager, Recall, Record};

/// Subset of [`Record`] fields for API responses
///
/// Excludes the embedding vector to keep payloads small
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub id: Uuid,
    pub kind: String,
    pub text: String,
    pub tier: String,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl From<&Record> for AdminRecord {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            kind: record.kind.to_string(),
            text: record.text.clone(),
            tier: record.tier.to_string(),
            access_count: record.access_count,
            created_at: record.created_at,
            last_accessed: record.last_accessed,
            metadata: record.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecalled {
    #[serde(flatten)]
    pub record: AdminRecord,
    pub similarity: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResponse {
    pub records: Vec<AdminRecalled>,
    pub from_cache: bool,
    pub partial: bool,
    pub degraded: bool,
}

impl From<Recall> for RecallResponse {
    fn from(recall: Recall) -> Self {
        Self {
            records: recall
                .records
                .iter()
                .map(|r| AdminRecalled {
                    record: AdminRecord::from(&r.record),
                    similarity: r.similarity,
                    score: r.score,
                })
                .collect(),
            from_cache: recall.from_cache,
            partial: recall.partial,
            degraded: recall.degraded,
        }
    }
}

/// A library error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub TierMemError);

impl From<TierMemError> for ApiError {
    fn from(e: TierMemError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TierMemError::NotFound(_) => StatusCode::NOT_FOUND,
            TierMemError::UnknownKind(_)
            | TierMemError::Config(_)
            | TierMemError::Serialization(_) => StatusCode::BAD_REQUEST,
            TierMemError::EmbeddingUnavailable(_) | TierMemError::StorageUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TierMemError::IndexInconsistency(_) | TierMemError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "Admin request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn create_router(manager: MemoryManager) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route(
            "/memories",
            get(handlers::list_handler).post(handlers::remember_handler),
        )
        .route(
            "/memories/{id}",
            get(handlers::get_handler).delete(handlers::forget_handler),
        )
        .route("/recall", post(handlers::recall_handler))
        .route("/migrate", post(handlers::migrate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

pub struct AdminServer {
    addr: SocketAddr,
    manager: MemoryManager,
}

impl AdminServer {
    pub fn new(listen_addr: &str, manager: MemoryManager) -> Result<Self> {
        let addr = listen_addr.parse().map_err(|e| {
            TierMemError::Config(format!("Invalid admin listen_addr '{listen_addr}': {e}"))
        })?;
        Ok(Self { addr, manager })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Admin API listening on {}", self.addr);

        axum::serve(listener, create_router(self.manager))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Admin API stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordKind;
    use crate::testing::{TestHarness, test_config, test_manager};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn harness() -> (TestHarness, Router) {
        let harness = test_manager(test_config());
        let app = create_router(harness.manager.clone());
        (harness, app)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_h, app) = harness();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_remember_then_get_and_list() {
        let (_h, app) = harness();

        let (status, body) = send(
            &app,
            Method::POST,
            "/memories",
            Some(json!({ "text": "Paris is the capital of France", "metadata": { "source": "atlas" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, &format!("/memories/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Paris is the capital of France");
        assert_eq!(body["tier"], "Hot");
        assert_eq!(body["kind"], "interaction");
        assert_eq!(body["metadata"]["source"], "atlas");
        assert!(body.get("embedding").is_none());

        let (status, body) = send(&app, Method::GET, "/memories?tier=hot&limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["memories"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::GET, "/memories?tier=cold", None).await;
        assert!(body["memories"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_bad_request() {
        let (_h, app) = harness();
        let (status, body) = send(
            &app,
            Method::POST,
            "/memories",
            Some(json!({ "text": "x", "kind": "preference" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("preference"));
    }

    #[tokio::test]
    async fn test_registered_kind_is_accepted() {
        let (h, app) = harness();
        h.manager.register_kind("preference").unwrap();
        let (status, _) = send(
            &app,
            Method::POST,
            "/memories",
            Some(json!({ "text": "likes tea", "kind": "preference" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_bad_tier_filter_is_bad_request() {
        let (_h, app) = harness();
        let (status, _) = send(&app, Method::GET, "/memories?tier=lukewarm", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let (_h, app) = harness();
        let uri = format!("/memories/{}", Uuid::new_v4());

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let (h, app) = harness();
        let id = h
            .manager
            .remember("ephemeral note", RecordKind::Interaction)
            .await
            .unwrap();
        let uri = format!("/memories/{id}");

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(h.store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_recall_endpoint() {
        let (h, app) = harness();
        h.manager
            .remember("Paris is the capital of France", RecordKind::Interaction)
            .await
            .unwrap();
        h.manager
            .remember("Rust has a borrow checker", RecordKind::Interaction)
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            Method::POST,
            "/recall",
            Some(json!({ "query": "capital of France", "k": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["text"], "Paris is the capital of France");
        assert_eq!(body["degraded"], false);
    }

    #[tokio::test]
    async fn test_stats_and_migrate() {
        let mut config = test_config();
        config.tiers.hot_capacity = 1;
        let h = test_manager(config);
        let app = create_router(h.manager.clone());

        for text in ["first note", "second note", "third note"] {
            h.manager.remember(text, RecordKind::Interaction).await.unwrap();
            h.clock.advance(chrono::Duration::seconds(1));
        }

        let (status, body) = send(&app, Method::POST, "/migrate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["demoted_to_warm"], 2);

        let (status, body) = send(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hot"], 1);
        assert_eq!(body["warm"], 2);
        assert_eq!(body["indexed"], 3);
    }

    #[tokio::test]
    async fn test_embedding_outage_is_service_unavailable() {
        let (h, app) = harness();
        h.embedder.set_offline(true);
        let (status, _) = send(&app, Method::POST, "/memories", Some(json!({ "text": "x" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_listen_addr() {
        let h = test_manager(test_config());
        assert!(matches!(
            AdminServer::new("not an address", h.manager).err(),
            Some(TierMemError::Config(_))
        ));
    }
}
