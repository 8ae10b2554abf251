//! Building an index from a corpus and querying it end to end.

use mongoose::error::{BuildError, EmbedError, IndexError, QueryError};
use mongoose::io::ExitCode;
use mongoose::semantic::{
    CONTEXT_UNAVAILABLE, CorpusItem, IndexBuilder, QueryService, RetryPolicy, demo, load_corpus,
};
use mongoose::{HnswConfig, VectorKey};

use crate::common::{FlakyEmbedder, HashEmbedder, POISON, TestProject};

fn corpus() -> Vec<CorpusItem> {
    vec![
        CorpusItem::new("add two tensors elementwise"),
        CorpusItem::new("multiply two tensors elementwise"),
        CorpusItem::new("divide a tensor by a scalar"),
        CorpusItem::new("subtract one tensor from another"),
        CorpusItem::new("open a file for reading"),
        CorpusItem::new("parse a json document"),
    ]
}

async fn built_service() -> QueryService {
    let mut builder = IndexBuilder::new(HashEmbedder::new(), HnswConfig::seeded(7))
        .with_batch_size(4)
        .with_retry_policy(RetryPolicy::immediate(2));
    builder.build(corpus()).await.unwrap();
    builder.finish().unwrap()
}

#[tokio::test]
async fn test_query_returns_exact_item_first() {
    let service = built_service().await;

    let results = service.query("parse a json document", 3).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].key, VectorKey::new(5));
    assert_eq!(results[0].text, "parse a json document");
    assert!(results[0].distance.abs() < 1e-4);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn test_k_larger_than_corpus_returns_everything() {
    let service = built_service().await;

    let results = service.query("tensor", 50).await.unwrap();

    assert_eq!(results.len(), 6);
    assert_eq!(ExitCode::from_results(&results), ExitCode::Success);
}

#[tokio::test]
async fn test_zero_k_is_config_error() {
    let service = built_service().await;

    let err = service.query("tensor", 0).await.unwrap_err();

    assert!(matches!(err, QueryError::Index(ref e) if e.is_config_error()));
    assert_eq!(ExitCode::from_query_error(&err), ExitCode::ConfigError);
}

#[tokio::test]
async fn test_failed_batch_keeps_earlier_batches_queryable() {
    let embedder = FlakyEmbedder::new();
    let mut builder = IndexBuilder::new(embedder.clone(), HnswConfig::seeded(3))
        .with_batch_size(2)
        .with_retry_policy(RetryPolicy::immediate(3));

    let items = vec![
        CorpusItem::new("alpha one"),
        CorpusItem::new("beta two"),
        CorpusItem::new("gamma three"),
        CorpusItem::new(format!("delta {POISON}")),
        CorpusItem::new("epsilon five"),
        CorpusItem::new("zeta six"),
    ];
    let err = builder.build(items).await.unwrap_err();

    match &err {
        BuildError::BuildFailed {
            batch,
            first_item,
            item_count,
            attempts,
            source,
        } => {
            assert_eq!(*batch, 2);
            assert_eq!(*first_item, 2);
            assert_eq!(*item_count, 2);
            assert_eq!(*attempts, 3);
            assert!(matches!(source, EmbedError::Transport(_)));
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }
    assert_eq!(embedder.failures.load(std::sync::atomic::Ordering::SeqCst), 3);

    // Batch 1 is committed, batch 2 left no trace, batch 3 never ran
    assert_eq!(builder.len(), 2);
    assert_eq!(builder.item(VectorKey::new(2)), None);

    let service = builder.finish().unwrap();
    let results = service.query("alpha one", 5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "alpha one");
}

#[tokio::test]
async fn test_grounding_context_degrades_on_failure() {
    let mut builder = IndexBuilder::new(FlakyEmbedder::new(), HnswConfig::seeded(1))
        .with_retry_policy(RetryPolicy::immediate(2));
    builder.build(corpus()).await.unwrap();
    let service = builder.finish().unwrap();

    let available = service.grounding_context("add two tensors", 1).await;
    assert!(available.is_available());
    assert_eq!(available.render(), "add two tensors elementwise");

    let unavailable = service.grounding_context(POISON, 1).await;
    assert!(!unavailable.is_available());
    assert_eq!(unavailable.render(), CONTEXT_UNAVAILABLE);
}

#[tokio::test]
async fn test_saved_service_answers_the_same() {
    let project = TestProject::new();
    let dir = project.path().join("index");
    let service = built_service().await;
    let before = service.query("multiply tensors", 4).await.unwrap();

    service.save(&dir).unwrap();
    let loaded = QueryService::load(&dir, HashEmbedder::new(), RetryPolicy::immediate(1)).unwrap();
    let after = loaded.query("multiply tensors", 4).await.unwrap();

    assert_eq!(before, after);
    assert_eq!(loaded.len(), 6);
    assert!(loaded.index().is_sealed());
}

#[tokio::test]
async fn test_items_out_of_sync_is_corruption() {
    let project = TestProject::new();
    let dir = project.path().join("index");
    built_service().await.save(&dir).unwrap();

    // Drop one item from the lookup file
    project.add_file(
        "index/items.json",
        r#"[{"key": 0, "text": "add two tensors elementwise"}]"#,
    );

    let err = QueryService::load(&dir, HashEmbedder::new(), RetryPolicy::immediate(1))
        .err()
        .unwrap();
    assert!(matches!(err, IndexError::IndexCorrupted { .. }));
    assert_eq!(ExitCode::from_error(&err), ExitCode::IndexCorrupted);
}

#[tokio::test]
async fn test_corpus_file_ids_become_keys() {
    let project = TestProject::new();
    let path = project.add_file(
        "corpus.jsonl",
        "{\"id\": 40, \"text\": \"open a socket\"}\n{\"id\": 41, \"text\": \"close a socket\"}\n",
    );

    let items = load_corpus(&path).unwrap();
    let mut builder = IndexBuilder::new(HashEmbedder::new(), HnswConfig::seeded(9));
    builder.build(items).await.unwrap();
    let service = builder.finish().unwrap();

    let results = service.query("close a socket", 1).await.unwrap();
    assert_eq!(results[0].key, VectorKey::new(41));
}

#[tokio::test]
async fn test_demo_corpus_retrieves_its_own_docstring() {
    let mut builder = IndexBuilder::new(HashEmbedder::new(), HnswConfig::seeded(0));
    builder.build(demo::corpus()).await.unwrap();
    let service = builder.finish().unwrap();

    let results = service.query("torch.div(*demo)", demo::DEMO_K).await.unwrap();

    assert_eq!(results.len(), demo::DEMO_TEXTS.len());
    assert_eq!(results[0].text, "torch.div(*demo)");
}
