use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::admin::{AdminRecord, ApiError, RecallResponse};
use crate::error::TierMemError;
use crate::memory::{MemoryManager, MemoryStats, NewRecord, RecallRequest, RecordKind, Tier};
use crate::tiers::MigrationReport;

type ApiResult<T> = std::result::Result<T, ApiError>;

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn stats_handler(State(manager): State<MemoryManager>) -> ApiResult<Json<MemoryStats>> {
    Ok(Json(manager.stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct RememberBody {
    pub text: String,
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

pub async fn remember_handler(
    State(manager): State<MemoryManager>,
    Json(body): Json<RememberBody>,
) -> ApiResult<impl IntoResponse> {
    let kind = match body.kind.as_deref() {
        Some(kind) => kind.parse::<RecordKind>()?,
        None => RecordKind::Interaction,
    };

    let mut new = NewRecord::new(body.text, kind);
    new.metadata = body.metadata;

    let id = manager.remember_with(new).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[derive(Debug, Deserialize, Default)]
pub struct MemoriesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub tier: Option<String>,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, serde::Serialize)]
pub struct MemoriesResponse {
    pub memories: Vec<AdminRecord>,
    pub limit: usize,
}

pub async fn list_handler(
    State(manager): State<MemoryManager>,
    Query(query): Query<MemoriesQuery>,
) -> ApiResult<Json<MemoriesResponse>> {
    let tier = query.tier.as_deref().map(str::parse::<Tier>).transpose()?;
    let records = manager.list(tier, query.limit).await?;

    Ok(Json(MemoriesResponse {
        memories: records.iter().map(AdminRecord::from).collect(),
        limit: query.limit,
    }))
}

pub async fn get_handler(
    State(manager): State<MemoryManager>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminRecord>> {
    match manager.get(id).await? {
        Some(record) => Ok(Json(AdminRecord::from(&record))),
        None => Err(TierMemError::NotFound(id).into()),
    }
}

pub async fn forget_handler(
    State(manager): State<MemoryManager>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    manager.forget(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recall_handler(
    State(manager): State<MemoryManager>,
    Json(request): Json<RecallRequest>,
) -> Json<RecallResponse> {
    Json(manager.recall_with(request).await.into())
}

pub async fn migrate_handler(
    State(manager): State<MemoryManager>,
) -> ApiResult<Json<MigrationReport>> {
    Ok(Json(manager.run_migration().await?))
}
