mod mock_services;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use codeblue::dataset::{FieldValue, Record};
use codeblue::index::{
  IndexConnector, IndexMatch, IndexState, RecordIds, StoreOptions, VectorStore,
};
use codeblue::CodeBlueError;
use mock_services::{MockControlPlane, MockEmbedder, MockIndex};
use tokio::time::Instant;

fn patients(n: usize) -> Vec<Record> {
  (1..=n).map(|pid| Record::new().with("pid", FieldValue::Number(pid as f64))).collect()
}

fn store(index: &Arc<MockIndex>, embedder: &Arc<MockEmbedder>) -> VectorStore {
  VectorStore::from_handle(index.clone(), embedder.clone(), StoreOptions::default())
}

#[tokio::test(start_paused = true)]
async fn test_three_records_flush_once() {
  let index = Arc::new(MockIndex::default());
  let embedder = Arc::new(MockEmbedder::default());

  store(&index, &embedder).upsert(&patients(3), &mut RecordIds::default()).await.unwrap();

  let flushes = index.flushed();
  assert_eq!(flushes.len(), 1);
  assert_eq!(flushes[0].len(), 3);
  let ids: Vec<&str> = flushes[0].iter().map(|e| e.id.as_str()).collect();
  assert_eq!(ids, vec!["rec_0", "rec_1", "rec_2"]);
  assert_eq!(embedder.texts.lock().unwrap()[0], r#"Patient record: {"pid": 1}"#);
}

#[tokio::test(start_paused = true)]
async fn test_flush_count_is_ceiling_of_batches() {
  for n in [1usize, 49, 50, 51, 100, 120] {
    let index = Arc::new(MockIndex::default());
    let embedder = Arc::new(MockEmbedder::default());
    let records = patients(n);

    store(&index, &embedder).upsert(&records, &mut RecordIds::default()).await.unwrap();

    let flushes = index.flushed();
    assert_eq!(flushes.len(), n.div_ceil(50), "n = {n}");
    assert!(flushes.iter().all(|batch| batch.len() <= 50));

    let flushed: Vec<Record> = flushes.into_iter().flatten().map(|e| e.metadata).collect();
    assert_eq!(flushed, records, "n = {n}");
  }
}

#[tokio::test(start_paused = true)]
async fn test_empty_upsert_touches_nothing() {
  let index = Arc::new(MockIndex::default());
  let embedder = Arc::new(MockEmbedder::default());

  store(&index, &embedder).upsert(&[], &mut RecordIds::default()).await.unwrap();

  assert!(index.flushed().is_empty());
  assert_eq!(embedder.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pause_only_between_flushes() {
  let index = Arc::new(MockIndex::default());
  let embedder = Arc::new(MockEmbedder::default());
  let started = Instant::now();

  store(&index, &embedder).upsert(&patients(120), &mut RecordIds::default()).await.unwrap();

  let elapsed = started.elapsed();
  assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn test_ids_stay_unique_across_chunks() {
  let index = Arc::new(MockIndex::default());
  let embedder = Arc::new(MockEmbedder::default());
  let store = store(&index, &embedder);
  let mut ids = RecordIds::new("chartevents");

  store.upsert(&patients(30), &mut ids).await.unwrap();
  store.upsert(&patients(30), &mut ids).await.unwrap();

  let all: BTreeSet<String> = index.flushed().into_iter().flatten().map(|e| e.id).collect();
  assert_eq!(all.len(), 60);
  assert!(all.contains("chartevents_59"));
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_are_retried_to_success() {
  // Second flush fails twice, then goes through
  let index = Arc::new(MockIndex::failing_upserts(vec![2, 3]));
  let embedder = Arc::new(MockEmbedder::default());
  let records = patients(120);
  let started = Instant::now();

  store(&index, &embedder).upsert(&records, &mut RecordIds::default()).await.unwrap();

  let flushed: Vec<Record> = index.flushed().into_iter().flatten().map(|e| e.metadata).collect();
  assert_eq!(flushed, records);
  assert_eq!(index.upsert_attempts.load(Ordering::SeqCst), 5);
  // Embeddings computed before the failures are reused
  assert_eq!(embedder.call_count(), 120);
  assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_embedding_failure_resumes_where_it_stopped() {
  let index = Arc::new(MockIndex::default());
  let embedder = Arc::new(MockEmbedder::failing_on(vec![60]));
  let records = patients(80);

  store(&index, &embedder).upsert(&records, &mut RecordIds::default()).await.unwrap();

  let flushes = index.flushed();
  assert_eq!(flushes.len(), 2);
  assert_eq!(flushes[1][0].id, "rec_50");
  assert_eq!(embedder.call_count(), 81);
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_raise() {
  let index = Arc::new(MockIndex::failing_upserts(vec![1, 2, 3]));
  let embedder = Arc::new(MockEmbedder::default());

  let result = store(&index, &embedder).upsert(&patients(3), &mut RecordIds::default()).await;

  assert!(matches!(result, Err(CodeBlueError::Service { .. })));
  assert_eq!(index.upsert_attempts.load(Ordering::SeqCst), 3);
  assert!(index.flushed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_query_returns_at_most_top_k_in_index_order() {
  let matches = [4.0, 9.0, 1.0]
    .iter()
    .enumerate()
    .map(|(i, pid)| IndexMatch {
      id: format!("rec_{i}"),
      score: 0.9 - i as f32 * 0.1,
      metadata: Some(Record::new().with("pid", FieldValue::Number(*pid))),
    })
    .collect();
  let index = Arc::new(MockIndex::with_matches(matches));
  let embedder = Arc::new(MockEmbedder::default());

  let records = store(&index, &embedder).query_similar("test", 2).await.unwrap();

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].get("pid"), Some(&FieldValue::Number(4.0)));
  assert_eq!(records[1].get("pid"), Some(&FieldValue::Number(9.0)));
  assert_eq!(*index.queries.lock().unwrap(), vec![(2, true)]);
  assert_eq!(*embedder.texts.lock().unwrap(), vec!["test".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_query_scores_descend_as_returned() {
  let matches = (0..3)
    .map(|i| IndexMatch { id: format!("rec_{i}"), score: 0.9 - i as f32 * 0.2, metadata: None })
    .collect();
  let index = Arc::new(MockIndex::with_matches(matches));
  let embedder = Arc::new(MockEmbedder::default());

  let scored = store(&index, &embedder).query_scored("sepsis", 5).await.unwrap();
  let scores: Vec<f32> = scored.iter().map(|(_, score)| *score).collect();

  assert!(scores.windows(2).all(|w| w[0] >= w[1]));
  assert!(scored.iter().all(|(record, _)| record.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_three_outages() {
  let service = MockControlPlane::with_outages(3);
  let mut connector = IndexConnector::new(&service);
  assert_eq!(connector.state(), IndexState::Uninitialized);
  let started = Instant::now();

  let result = connector
    .connect(
      Arc::new(MockEmbedder::default()),
      "icu-records",
      "https://icu-records.svc.pinecone.io",
      StoreOptions::default(),
    )
    .await;

  assert!(matches!(result, Err(CodeBlueError::Service { .. })));
  assert_eq!(connector.state(), IndexState::Failed);
  assert_eq!(service.list_calls.load(Ordering::SeqCst), 3);
  assert_eq!(service.opened.load(Ordering::SeqCst), 0);
  assert!(service.index.queries.lock().unwrap().is_empty());
  assert!(started.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_connect_recovers_from_two_outages() {
  let service = MockControlPlane::with_outages(2);
  let mut connector = IndexConnector::new(&service);

  let result = connector
    .connect(
      Arc::new(MockEmbedder::default()),
      "icu-records",
      "https://icu-records.svc.pinecone.io",
      StoreOptions::default(),
    )
    .await;

  assert!(result.is_ok());
  assert_eq!(connector.state(), IndexState::Ready);
  assert_eq!(service.opened.load(Ordering::SeqCst), 1);
  assert_eq!(*service.index.queries.lock().unwrap(), vec![(1, false)]);
}
