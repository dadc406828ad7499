//! End-to-end scenarios over the assembled engine.

mod support;

use preflight_core::config::{Config, IgpConfig, IgpStrategy, RetrieverConfig, RetrieverMode};
use preflight_core::domain::ports::{ChunkFilter, CompletionClient, VectorStore};
use preflight_core::providers::embedding::HashEmbeddingProvider;
use preflight_core::providers::vector_store::InMemoryVectorStore;
use preflight_core::retrieval::Retriever;
use preflight_core::server::{PreflightEngine, QueryOptions};
use std::sync::Arc;
use support::{write_two_file_fixture, MarkerProbe, ScriptedLlm};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn engine(store: Arc<InMemoryVectorStore>, llm: Arc<dyn CompletionClient>) -> PreflightEngine {
    PreflightEngine::with_providers(
        Config::default(),
        Arc::new(HashEmbeddingProvider::new(64)),
        store,
        llm,
    )
}

fn options(bundle: Uuid) -> QueryOptions {
    QueryOptions { bundle_id: Some(bundle.to_string()), ..Default::default() }
}

/// S1: indexing the two-file fixture writes 2 chunks, 1 exported function
/// node, 0 edges, and retrieval over "foo" sees both chunks.
#[tokio::test]
async fn s1_two_file_fixture_indexes_and_retrieves() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = engine(store.clone(), Arc::new(ScriptedLlm::new("foo formats a label [1][2].")));
    let bundle = Uuid::new_v4();

    let indexed = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    assert!(indexed.ok, "index failed: {:?}", indexed.error);
    let report = indexed.data.unwrap();
    assert_eq!(report.chunks_written, 2);
    assert_eq!(report.entities, 1);
    assert_eq!(report.relations, 0);

    let graph_json = store.load_graph(&bundle.to_string()).await.unwrap().unwrap();
    let graph: preflight_core::domain::ast::AstGraph = serde_json::from_str(&graph_json).unwrap();
    let foo = graph.nodes.get("foo").expect("foo node present");
    assert_eq!(foo.kind, preflight_core::domain::ast::AstNodeKind::Function);
    assert!(foo.is_exported);

    let answer = engine.query("foo", options(bundle), &CancellationToken::new()).await;
    assert!(answer.ok, "query failed: {:?}", answer.error);
    assert_eq!(answer.data.unwrap().stats.chunks_retrieved, 2);
}

/// S2: hybrid retrieval for "describe foo" ranks the code chunk first.
#[tokio::test]
async fn s2_code_chunk_outranks_prose_for_symbol_queries() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    // Bag-of-words fixture embedder: "foo" appears twice in the ts symbol
    // and once in the prose, so the code chunk wins the dense component.
    let embedder = Arc::new(support::VocabEmbedder::new(vec![
        "foo", "describe", "helper", "exported", "function", "return",
    ]));
    let engine = PreflightEngine::with_providers(
        Config::default(),
        embedder.clone(),
        store.clone(),
        Arc::new(ScriptedLlm::new("unused")),
    );
    let bundle = Uuid::new_v4();
    let indexed = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    assert!(indexed.ok);

    let retriever = Retriever::new(RetrieverConfig::default(), embedder, store);
    let outcome = retriever
        .retrieve("describe foo", &ChunkFilter::bundle(bundle), RetrieverMode::Hybrid, 10, None)
        .await
        .unwrap();
    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.candidates[0].chunk.metadata.file_path, "src/foo.ts");
}

/// S3: the rigged NU fixture (NU(q)=0.8, md→0.75, ts→0.30) drives the
/// three pruning strategies exactly as documented.
#[tokio::test]
async fn s3_pruning_strategies_follow_the_ig_numbers() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    let bundle = Uuid::new_v4();

    let probe = Arc::new(MarkerProbe::new(
        0.8,
        vec![("function foo", 0.30), ("exported helper", 0.75)],
    ));
    let engine = PreflightEngine::with_providers(
        Config::default(),
        Arc::new(HashEmbeddingProvider::new(64)),
        store.clone(),
        Arc::new(ScriptedLlm::new("foo returns its label [1].")),
    )
    .with_probe(probe.clone());

    let indexed = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    assert!(indexed.ok);

    // threshold = 0 keeps both (IGs 0.05 and 0.50).
    let both = engine.query("describe foo", options(bundle), &CancellationToken::new()).await;
    let both = both.data.unwrap();
    assert!((both.stats.baseline_nu - 0.8).abs() < 1e-9);
    assert_eq!(both.stats.chunks_after_pruning, 2);

    // topK = 1 keeps only the high-gain ts chunk.
    let mut top1 = options(bundle);
    top1.igp_options = Some(IgpConfig {
        strategy: IgpStrategy::TopK,
        top_k: 1,
        ..Default::default()
    });
    let kept = engine.query("describe foo", top1, &CancellationToken::new()).await;
    let kept = kept.data.unwrap();
    assert_eq!(kept.stats.chunks_after_pruning, 1);
    assert_eq!(kept.sources[0].path, "src/foo.ts");

    // threshold = 0.1 also keeps only the ts chunk.
    let mut strict = options(bundle);
    strict.igp_options = Some(IgpConfig { threshold: 0.1, ..Default::default() });
    let filtered = engine.query("describe foo", strict, &CancellationToken::new()).await;
    assert_eq!(filtered.data.unwrap().stats.chunks_after_pruning, 1);
}

/// S4: a non-UUID bundle id comes back as INVALID_PATH.
#[tokio::test]
async fn s4_non_uuid_bundle_id_is_invalid_path() {
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = engine(store, Arc::new(ScriptedLlm::new("unused")));
    let mut opts = QueryOptions::default();
    opts.bundle_id = Some("not-a-uuid".into());

    let envelope = engine.query("anything", opts, &CancellationToken::new()).await;
    assert!(!envelope.ok);
    let error = envelope.error.unwrap();
    assert_eq!(error.code, preflight_core::ErrorCode::InvalidPath);
    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["code"], "INVALID_PATH");
}

/// S5: a provider without logprobs short-circuits pruning with exactly one
/// recoverable warning and still answers.
#[tokio::test]
async fn s5_logprobs_unsupported_degrades_with_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = engine(
        store,
        Arc::new(ScriptedLlm::without_logprobs("foo is a helper [1].")),
    );
    let bundle = Uuid::new_v4();
    let indexed = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    assert!(indexed.ok);

    let envelope = engine.query("describe foo", options(bundle), &CancellationToken::new()).await;
    assert!(envelope.ok);
    assert_eq!(envelope.warnings.len(), 1);
    assert_eq!(envelope.warnings[0].code, "LOGPROBS_UNSUPPORTED");
    assert!(envelope.warnings[0].recoverable);
    assert!(!envelope.data.unwrap().answer.is_empty());
}

/// Cancellation between retrieval and the first pruner batch issues zero
/// probe calls.
#[tokio::test]
async fn cancelled_query_never_reaches_the_pruner() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    let bundle = Uuid::new_v4();
    let probe = Arc::new(MarkerProbe::new(0.8, vec![]));
    let engine = PreflightEngine::with_providers(
        Config::default(),
        Arc::new(HashEmbeddingProvider::new(64)),
        store,
        Arc::new(ScriptedLlm::new("unused")),
    )
    .with_probe(probe.clone());
    let indexed = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    assert!(indexed.ok);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let envelope = engine.query("describe foo", options(bundle), &cancel).await;
    assert!(!envelope.ok);
    assert_eq!(probe.calls(), 0);
}

/// The removed `enableIgp` flag fails loudly with a replacement hint.
#[tokio::test]
async fn legacy_enable_igp_flag_is_deprecated() {
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = engine(store, Arc::new(ScriptedLlm::new("unused")));
    let mut opts = options(Uuid::new_v4());
    opts.enable_igp = Some(true);

    let envelope = engine.query("anything", opts, &CancellationToken::new()).await;
    assert!(!envelope.ok);
    let error = envelope.error.unwrap();
    assert_eq!(error.code, preflight_core::ErrorCode::DeprecatedParameter);
    assert!(error.hint.unwrap().contains("enableContextCompletion"));
}

/// Missing bundles surface BUNDLE_NOT_FOUND, not an empty answer.
#[tokio::test]
async fn querying_an_unknown_bundle_is_not_found() {
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = engine(store, Arc::new(ScriptedLlm::new("unused")));
    let envelope = engine
        .query("anything", options(Uuid::new_v4()), &CancellationToken::new())
        .await;
    assert!(!envelope.ok);
    assert_eq!(envelope.error.unwrap().code, preflight_core::ErrorCode::BundleNotFound);
}
