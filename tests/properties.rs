//! Cross-module properties: determinism, id stability, cascade deletion,
//! quota behavior, and envelope stability.

mod support;

use preflight_core::config::{AstFilterConfig, Config};
use preflight_core::domain::ast::AstNodeKind;
use preflight_core::domain::ports::{ChunkFilter, VectorStore};
use preflight_core::indexing::ast::{AstBuilder, ExtractedSymbol};
use preflight_core::providers::embedding::HashEmbeddingProvider;
use preflight_core::providers::vector_store::{FilesystemVectorStore, InMemoryVectorStore};
use preflight_core::server::{PreflightEngine, QueryOptions};
use std::path::Path;
use std::sync::Arc;
use support::{write_file, write_two_file_fixture, ScriptedLlm};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn index_and_list(root: &Path, bundle: Uuid) -> Vec<String> {
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = PreflightEngine::with_providers(
        Config::default(),
        Arc::new(HashEmbeddingProvider::new(64)),
        store.clone(),
        Arc::new(ScriptedLlm::new("unused")),
    );
    let envelope = engine
        .index_bundle(&bundle.to_string(), root, &CancellationToken::new())
        .await;
    assert!(envelope.ok, "index failed: {:?}", envelope.error);
    let mut ids: Vec<String> = store
        .list(&bundle.to_string(), &ChunkFilter::bundle(bundle))
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    ids.sort();
    ids
}

/// Property 1: unchanged inputs index to identical chunk-id sets.
#[tokio::test]
async fn indexing_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    write_file(dir.path(), "src/util.py", "def load(path):\n    \"\"\"Load and parse the manifest file.\"\"\"\n    return path\n");
    let bundle = Uuid::new_v4();

    let first = index_and_list(dir.path(), bundle).await;
    let second = index_and_list(dir.path(), bundle).await;
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

/// Property 2: CRLF→LF churn never changes chunk ids; a content byte does.
#[tokio::test]
async fn chunk_ids_track_bytes_not_line_endings() {
    let bundle = Uuid::new_v4();

    let unix = tempfile::tempdir().unwrap();
    write_file(unix.path(), "README.md", "# Guide\nalpha beta\n");
    let dos = tempfile::tempdir().unwrap();
    write_file(dos.path(), "README.md", "# Guide\r\nalpha beta\r\n");
    let edited = tempfile::tempdir().unwrap();
    write_file(edited.path(), "README.md", "# Guide\nalpha betb\n");

    let unix_ids = index_and_list(unix.path(), bundle).await;
    let dos_ids = index_and_list(dos.path(), bundle).await;
    let edited_ids = index_and_list(edited.path(), bundle).await;

    assert_eq!(unix_ids, dos_ids);
    assert_ne!(unix_ids, edited_ids);
}

/// Property 8: deleting a bundle cascades over chunks and the graph blob.
#[tokio::test]
async fn delete_bundle_cascades() {
    let root = tempfile::tempdir().unwrap();
    let bundle = Uuid::new_v4();
    let bundle_dir = root.path().join(bundle.to_string());
    write_two_file_fixture(&bundle_dir);

    let store = Arc::new(FilesystemVectorStore::new(root.path(), Arc::new(Semaphore::new(8))));
    let mut config = Config::default();
    config.storage.root = root.path().to_path_buf();
    let engine = PreflightEngine::with_providers(
        config,
        Arc::new(HashEmbeddingProvider::new(64)),
        store.clone(),
        Arc::new(ScriptedLlm::new("unused")),
    );

    let indexed = engine
        .index_bundle(&bundle.to_string(), &bundle_dir, &CancellationToken::new())
        .await;
    assert!(indexed.ok);
    assert!(!store
        .list(&bundle.to_string(), &ChunkFilter::bundle(bundle))
        .await
        .unwrap()
        .is_empty());

    let deleted = engine.delete_bundle(&bundle.to_string()).await;
    assert!(deleted.ok, "delete failed: {:?}", deleted.error);

    let remaining = store
        .list(&bundle.to_string(), &ChunkFilter::bundle(bundle))
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert!(store.load_graph(&bundle.to_string()).await.unwrap().is_none());
}

/// S6: 1 200 admitted functions against a quota of 500 keep exactly the
/// top-500 by importance with a stable name tie-break.
#[test]
fn function_quota_keeps_the_top_five_hundred() {
    let config = AstFilterConfig::default();
    assert_eq!(config.max_functions, 500);
    let builder = AstBuilder::new(config);

    let symbols: Vec<ExtractedSymbol> = (0..1_200)
        .map(|i| ExtractedSymbol {
            name: format!("fn_{i:04}"),
            kind: AstNodeKind::Function,
            file_path: format!("src/mod_{}.ts", i % 40),
            start_line: 1,
            end_line: 10,
            is_exported: true,
            doc: None,
            // Importance cycles through 4 tiers so ties exercise the
            // name tie-break.
            content: "body".into(),
            importance: 0.2 + 0.2 * ((i % 4) as f32),
        })
        .collect();

    let kept = builder.apply_quota(symbols.clone());
    assert_eq!(kept.len(), 500);

    // Reference ranking: importance desc, then name asc.
    let mut expected: Vec<&ExtractedSymbol> = symbols.iter().collect();
    expected.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap()
            .then_with(|| a.name.cmp(&b.name))
    });
    let expected_names: std::collections::BTreeSet<String> =
        expected[..500].iter().map(|s| s.name.clone()).collect();
    let kept_names: std::collections::BTreeSet<String> =
        kept.iter().map(|s| s.name.clone()).collect();
    assert_eq!(kept_names, expected_names);
}

/// Property 10: every tool response parses against the envelope schema
/// and errors carry codes from the closed set.
#[tokio::test]
async fn envelopes_are_schema_stable() {
    let dir = tempfile::tempdir().unwrap();
    write_two_file_fixture(dir.path());
    let store = Arc::new(InMemoryVectorStore::new());
    let engine = PreflightEngine::with_providers(
        Config::default(),
        Arc::new(HashEmbeddingProvider::new(64)),
        store,
        Arc::new(ScriptedLlm::new("answer [1].")),
    );
    let bundle = Uuid::new_v4();

    let closed_set = [
        "BUNDLE_NOT_FOUND",
        "FILE_NOT_FOUND",
        "INVALID_PATH",
        "PERMISSION_DENIED",
        "INDEX_MISSING_OR_CORRUPT",
        "LOGPROBS_UNSUPPORTED",
        "LLM_TRANSIENT",
        "LLM_TERMINAL",
        "DEPRECATED_PARAMETER",
        "UNKNOWN",
    ];

    let index_ok = engine
        .index_bundle(&bundle.to_string(), dir.path(), &CancellationToken::new())
        .await;
    let query_ok = engine
        .query(
            "foo",
            QueryOptions { bundle_id: Some(bundle.to_string()), ..Default::default() },
            &CancellationToken::new(),
        )
        .await;
    let query_err = engine
        .query(
            "foo",
            QueryOptions { bundle_id: Some("nope".into()), ..Default::default() },
            &CancellationToken::new(),
        )
        .await;
    let delete_err = engine.delete_bundle(&Uuid::new_v4().to_string()).await;

    let values = vec![
        serde_json::to_value(&index_ok).unwrap(),
        serde_json::to_value(&query_ok).unwrap(),
        serde_json::to_value(&query_err).unwrap(),
        serde_json::to_value(&delete_err).unwrap(),
    ];
    for value in values {
        assert!(value["ok"].is_boolean());
        assert_eq!(value["meta"]["schemaVersion"], "2.0");
        assert!(value["meta"]["tool"].is_string());
        assert!(value["meta"]["requestId"].is_string());
        assert!(value["meta"]["timeMs"].is_number());
        if value["ok"].as_bool().unwrap() {
            assert!(value.get("data").is_some());
            assert!(value.get("error").is_none());
        } else {
            let code = value["error"]["code"].as_str().unwrap();
            assert!(closed_set.contains(&code), "unexpected code {code}");
            assert!(value["error"]["message"].is_string());
        }
    }
}
