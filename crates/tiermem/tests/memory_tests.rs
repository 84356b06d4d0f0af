//! Integration tests for the memory manager facade
//!
//! Exercises remember/recall/forget against the in-memory test doubles:
//! a fault-injecting store, a counting hashing embedder and a manual clock.

use chrono::Duration;
use uuid::Uuid;

use tiermem::index::{TierScope, VectorIndex};
use tiermem::testing::{test_config, test_manager};
use tiermem::{NewRecord, RecallRequest, RecordKind, Tier, TierMemError};

#[tokio::test]
async fn test_remember_recall_roundtrip() {
    let h = test_manager(test_config());
    let text = "The deploy script lives in tools/release.sh";
    let id = h
        .manager
        .remember(text, RecordKind::Interaction)
        .await
        .unwrap();

    let recall = h.manager.recall(text, 1, 0.0).await;
    assert_eq!(recall.len(), 1);
    assert_eq!(recall.records[0].record.id, id);
    assert_eq!(recall.records[0].record.text, text);
    assert!((recall.records[0].similarity - 1.0).abs() < 1e-4);
    assert!(!recall.degraded);
}

#[tokio::test]
async fn test_capital_of_france_is_recalled() {
    let mut config = test_config();
    config.retrieval.relevance_floor = 0.3;
    let h = test_manager(config);

    h.manager
        .remember("Paris is the capital of France", RecordKind::DocumentChunk)
        .await
        .unwrap();
    h.manager
        .remember("Tokio runs futures on a work-stealing scheduler", RecordKind::DocumentChunk)
        .await
        .unwrap();

    let recall = h.manager.recall("capital of France", 3, 0.0).await;
    assert_eq!(recall.texts(), vec!["Paris is the capital of France"]);
    assert!(recall.records[0].similarity > 0.3);
}

#[tokio::test]
async fn test_forget_is_idempotent() {
    let h = test_manager(test_config());
    let id = h
        .manager
        .remember("short lived", RecordKind::Interaction)
        .await
        .unwrap();

    // warm the caches first
    assert_eq!(h.manager.recall("short lived", 1, 0.0).await.len(), 1);

    h.manager.forget(id).await.unwrap();
    assert!(matches!(
        h.manager.forget(id).await,
        Err(TierMemError::NotFound(missing)) if missing == id
    ));

    assert!(!h.index.contains(id));
    assert!(h.manager.get(id).await.unwrap().is_none());
    assert!(h.manager.recall("short lived", 1, 0.0).await.is_empty());
}

#[tokio::test]
async fn test_get_missing_is_none() {
    let h = test_manager(test_config());
    assert!(h.manager.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_embedding_outage_persists_nothing() {
    let h = test_manager(test_config());
    h.embedder.set_offline(true);

    let result = h
        .manager
        .remember("never stored", RecordKind::Interaction)
        .await;
    assert!(matches!(result, Err(TierMemError::EmbeddingUnavailable(_))));
    assert!(h.store.inner().is_empty());
    assert_eq!(h.index.len(), 0);
}

#[tokio::test]
async fn test_recall_degrades_when_embedding_is_down() {
    let h = test_manager(test_config());
    h.manager
        .remember("something", RecordKind::Interaction)
        .await
        .unwrap();
    h.embedder.set_offline(true);

    let recall = h.manager.recall("something", 1, 0.0).await;
    assert!(recall.degraded);
    assert!(recall.is_empty());
}

#[tokio::test]
async fn test_storage_failure_during_remember_leaves_index_untouched() {
    let h = test_manager(test_config());
    h.store.fail_puts(true);

    let result = h.manager.remember("lost", RecordKind::Interaction).await;
    assert!(matches!(result, Err(TierMemError::StorageUnavailable(_))));
    assert_eq!(h.index.len(), 0);
}

#[tokio::test]
async fn test_storage_failure_during_forget_keeps_index_entry() {
    let h = test_manager(test_config());
    let id = h
        .manager
        .remember("sticky", RecordKind::Interaction)
        .await
        .unwrap();

    h.store.fail_deletes(true);
    assert!(matches!(
        h.manager.forget(id).await,
        Err(TierMemError::StorageUnavailable(_))
    ));
    assert_eq!(h.index.tier_of(id), Some(Tier::Hot));
    assert!(h.store.inner().snapshot(id).is_some());

    h.store.heal();
    h.manager.forget(id).await.unwrap();
    assert!(!h.index.contains(id));
}

#[tokio::test]
async fn test_second_recall_hits_cache() {
    let h = test_manager(test_config());
    h.manager
        .remember("the build uses cargo workspaces", RecordKind::Interaction)
        .await
        .unwrap();

    let first = h.manager.recall("cargo workspaces", 1, 0.0).await;
    assert!(!first.from_cache);
    let embeds = h.embedder.calls();

    let second = h.manager.recall("cargo workspaces", 1, 0.0).await;
    assert!(second.from_cache);
    assert_eq!(second.texts(), first.texts());
    assert_eq!(h.embedder.calls(), embeds);
    assert_eq!(second.records[0].record.access_count, 2);
}

#[tokio::test]
async fn test_cached_query_expires_after_ttl() {
    let mut config = test_config();
    config.cache.cache_ttl_secs = 60;
    let h = test_manager(config);
    h.manager
        .remember("ttl bound result", RecordKind::Interaction)
        .await
        .unwrap();

    h.manager.recall("ttl bound", 1, 0.0).await;
    assert!(h.manager.recall("ttl bound", 1, 0.0).await.from_cache);

    h.clock.advance(Duration::seconds(61));
    let recall = h.manager.recall("ttl bound", 1, 0.0).await;
    assert!(!recall.from_cache);
    assert_eq!(recall.len(), 1);
}

#[tokio::test]
async fn test_remember_invalidates_hot_queries() {
    let h = test_manager(test_config());
    h.manager
        .remember("rust release notes", RecordKind::Interaction)
        .await
        .unwrap();
    h.manager.recall("rust release", 5, 0.0).await;

    h.manager
        .remember("rust release schedule", RecordKind::Interaction)
        .await
        .unwrap();
    let recall = h.manager.recall("rust release", 5, 0.0).await;
    assert!(!recall.from_cache);
    assert_eq!(recall.len(), 2);
}

#[tokio::test]
async fn test_recency_bias_prefers_newer_records() {
    let h = test_manager(test_config());
    let old = h
        .manager
        .remember("meeting notes about the api", RecordKind::Interaction)
        .await
        .unwrap();
    h.clock.advance(Duration::hours(2));
    let new = h
        .manager
        .remember("meeting notes about the api", RecordKind::Interaction)
        .await
        .unwrap();

    let recall = h.manager.recall("meeting notes api", 2, 1.0).await;
    assert_eq!(recall.records[0].record.id, new);
    assert_eq!(recall.records[1].record.id, old);
    assert!(recall.records[0].score >= recall.records[1].score);
}

#[tokio::test]
async fn test_zero_k_and_blank_query_return_nothing() {
    let h = test_manager(test_config());
    h.manager
        .remember("anything", RecordKind::Interaction)
        .await
        .unwrap();

    assert!(h.manager.recall("anything", 0, 0.0).await.is_empty());
    assert!(h.manager.recall("   ", 3, 0.0).await.is_empty());
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test]
async fn test_huge_k_returns_available_records() {
    let h = test_manager(test_config());
    let id = h
        .manager
        .remember("Paris is the capital of France", RecordKind::DocumentChunk)
        .await
        .unwrap();

    let recall = h.manager.recall("Paris is the capital of France", usize::MAX / 2, 0.0).await;
    assert_eq!(recall.len(), 1);
    assert_eq!(recall.records[0].record.id, id);

    let recall = h
        .manager
        .recall_with(
            RecallRequest::new("Paris is the capital of France")
                .k(usize::MAX)
                .recency_bias(0.5)
                .scope(TierScope::All),
        )
        .await;
    assert_eq!(recall.len(), 1);
    assert!(!recall.degraded);
}

#[tokio::test]
async fn test_custom_kind_requires_registration() {
    let h = test_manager(test_config());
    let kind: RecordKind = "preference".parse().unwrap();

    let result = h.manager.remember("prefers dark mode", kind.clone()).await;
    assert!(matches!(result, Err(TierMemError::UnknownKind(_))));
    assert_eq!(h.embedder.calls(), 0);

    h.manager.register_kind("preference").unwrap();
    h.manager
        .remember("prefers dark mode", kind.clone())
        .await
        .unwrap();
    h.manager
        .remember("asked about tabs", RecordKind::Interaction)
        .await
        .unwrap();

    let preferences = h.manager.recent(10, Some(&kind)).await.unwrap();
    assert_eq!(preferences.len(), 1);
    assert_eq!(preferences[0].text, "prefers dark mode");
}

#[tokio::test]
async fn test_metadata_is_persisted() {
    let h = test_manager(test_config());
    let id = h
        .manager
        .remember_with(
            NewRecord::new("section 2.1", RecordKind::DocumentChunk)
                .with_metadata("source", "handbook.pdf"),
        )
        .await
        .unwrap();

    let record = h.manager.get(id).await.unwrap().unwrap();
    assert_eq!(record.metadata.get("source").map(String::as_str), Some("handbook.pdf"));
    assert_eq!(record.access_count, 0);
}

#[tokio::test]
async fn test_get_reindexes_missing_entry() {
    let mut config = test_config();
    config.cache.cache_capacity = 1;
    let h = test_manager(config);
    let id = h
        .manager
        .remember("drifted", RecordKind::Interaction)
        .await
        .unwrap();
    // evicts the cached copy of `id`
    h.manager
        .remember("newer", RecordKind::Interaction)
        .await
        .unwrap();

    h.index.remove(id);
    assert!(h.manager.get(id).await.unwrap().is_some());
    assert_eq!(h.index.tier_of(id), Some(Tier::Hot));
}

#[tokio::test]
async fn test_recent_history_transcript() {
    let h = test_manager(test_config());
    for (user, ai, agent) in [
        ("hi", "hello", "assistant"),
        ("plan a trip", "to where?", "planner"),
        ("what's 2+2", "4", "assistant"),
    ] {
        h.manager.remember_interaction(user, ai, agent).await.unwrap();
        h.clock.advance(Duration::seconds(1));
    }

    let last_two = h.manager.recent_history(2, None).await.unwrap();
    assert_eq!(
        last_two,
        "User: plan a trip\nAI: to where?\n\nUser: what's 2+2\nAI: 4\n\n"
    );

    let assistant = h.manager.recent_history(10, Some("assistant")).await.unwrap();
    assert_eq!(assistant, "User: hi\nAI: hello\n\nUser: what's 2+2\nAI: 4\n\n");
}

#[tokio::test]
async fn test_export_writes_all_records() {
    let h = test_manager(test_config());
    for text in ["one", "two", "three"] {
        h.manager.remember(text, RecordKind::Interaction).await.unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("export.json");
    let written = h.manager.export(Some(&path)).await.unwrap();
    assert_eq!(written, path);

    let json = std::fs::read_to_string(&path).unwrap();
    let records: Vec<tiermem::Record> = serde_json::from_str(&json).unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_clear_forgets_everything() {
    let h = test_manager(test_config());
    for text in ["a note", "b note"] {
        h.manager.remember(text, RecordKind::Interaction).await.unwrap();
    }

    assert_eq!(h.manager.clear().await.unwrap(), 2);
    assert!(h.store.inner().is_empty());
    assert_eq!(h.index.len(), 0);
    assert_eq!(h.manager.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_hot_scope_ignores_warm_records() {
    let mut config = test_config();
    config.tiers.hot_capacity = 1;
    let h = test_manager(config);

    let warm = h
        .manager
        .remember("gardening tips for spring", RecordKind::Interaction)
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(1));
    h.manager
        .remember("compiler error messages", RecordKind::Interaction)
        .await
        .unwrap();
    h.manager.run_migration().await.unwrap();
    assert_eq!(h.index.tier_of(warm), Some(Tier::Warm));

    let hot_only = h
        .manager
        .recall_with(
            RecallRequest::new("gardening tips for spring")
                .k(1)
                .scope(TierScope::Hot),
        )
        .await;
    assert!(hot_only.texts().iter().all(|t| *t != "gardening tips for spring"));

    let default_scope = h.manager.recall("gardening tips for spring", 1, 0.0).await;
    assert_eq!(default_scope.records[0].record.id, warm);
}
