//! Concurrent access to the content hash key store
//!
//! Many tasks race on one file-backed WAL database; exactly one claim per
//! content hash may win.

mod helpers;

use helpers::*;
use qforge_common::events::EventBus;
use qforge_gen::db::counters::recompute_counters;
use qforge_gen::db::hash_keys::{find_claim, try_claim, ClaimOutcome};
use qforge_gen::db::items::count_items;
use qforge_gen::models::{ContentKind, ContentTier, GenerationMode, HashAlgorithm, RunStatus};
use qforge_gen::services::{ContentHasher, RunRequest, SqliteTopicSource, TopicGenerationController};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_of_same_content_have_one_winner() {
    let (_dir, pool) = create_test_db().await;
    let candidate = numbered_test(1);
    let hash = ContentHasher::new(HashAlgorithm::Sha256).hash_candidate(&candidate);

    let mut join_set = JoinSet::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let candidate = candidate.clone();
        let hash = hash.clone();
        join_set.spawn(async move { try_claim(&pool, "race", &hash, &candidate).await.unwrap() });
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    while let Some(result) = join_set.join_next().await {
        match result.unwrap() {
            ClaimOutcome::Claimed { item_id } => winners.push(item_id),
            ClaimOutcome::AlreadyExists { existing_item_id } => losers.push(existing_item_id),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one claim must win");
    assert_eq!(losers.len(), 15);
    assert!(losers.iter().all(|id| *id == winners[0]));

    let key = find_claim(&pool, "race", ContentKind::Tests, &hash).await.unwrap().unwrap();
    assert_eq!(key.item_id, winners[0]);
    assert_eq!(count_items(&pool, "race", ContentKind::Tests).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_claims_all_succeed() {
    let (_dir, pool) = create_test_db().await;
    let hasher = ContentHasher::new(HashAlgorithm::Sha256);

    let mut join_set = JoinSet::new();
    for i in 0..24 {
        let pool = pool.clone();
        let candidate = numbered_flashcard(i);
        let hash = hasher.hash_candidate(&candidate);
        join_set.spawn(async move { try_claim(&pool, "race", &hash, &candidate).await.unwrap() });
    }

    let mut claimed = 0;
    while let Some(result) = join_set.join_next().await {
        if result.unwrap().is_claimed() {
            claimed += 1;
        }
    }

    assert_eq!(claimed, 24);
    let counters = recompute_counters(&pool, "race").await.unwrap();
    assert_eq!(counters.flashcards_count, 24);
    assert_eq!(counters.tests_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_on_same_topic_never_duplicate() {
    let (_dir, pool) = create_test_db().await;
    seed_topic(&pool, "shared", ContentTier::Supplementary).await;

    let mut join_set = JoinSet::new();
    for _ in 0..3 {
        let pool = pool.clone();
        join_set.spawn(async move {
            // Every run offers the same content
            let generator = Arc::new(ScriptedGenerator::empty());
            generator.push(ContentKind::Tests, Ok(batch((0..4).map(numbered_test).collect())));
            generator.push(ContentKind::Tests, Ok(batch((4..8).map(numbered_test).collect())));
            generator.push(ContentKind::Flashcards, Ok(batch((0..3).map(numbered_flashcard).collect())));
            generator.push(ContentKind::Flashcards, Ok(batch((3..6).map(numbered_flashcard).collect())));

            let controller = TopicGenerationController::new(
                pool.clone(),
                EventBus::new(64),
                generator,
                Arc::new(SqliteTopicSource::new(pool.clone())),
                fast_config(),
            );
            controller
                .run(&RunRequest::new("shared", GenerationMode::Add), CancellationToken::new())
                .await
        });
    }

    let mut created = 0;
    let mut skipped = 0;
    while let Some(result) = join_set.join_next().await {
        let progress = result.unwrap();
        assert_eq!(progress.status, RunStatus::Completed);
        created += progress.tests.created;
        skipped += progress.tests.skipped;
    }

    assert_eq!(created, 8);
    assert_eq!(skipped, 16);
    assert_eq!(count_items(&pool, "shared", ContentKind::Tests).await.unwrap(), 8);
    assert_eq!(count_items(&pool, "shared", ContentKind::Flashcards).await.unwrap(), 6);
}
