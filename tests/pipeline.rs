//! End-to-end tests of the ingest → store → search pipeline against a
//! temporary data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnemo::indexer::{Indexer, IngestOutcome};
use mnemo::search::{search_chunks, SearchRequest};

struct TestEnv {
    _tmp: tempfile::TempDir,
    data_dir: PathBuf,
    files_dir: PathBuf,
    indexer: Arc<Indexer>,
}

fn setup() -> TestEnv {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let files_dir = tmp.path().join("files");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::create_dir_all(&files_dir).unwrap();

    let indexer = Arc::new(Indexer::open(&data_dir, None).unwrap());

    TestEnv {
        _tmp: tmp,
        data_dir,
        files_dir,
        indexer,
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn blob_file_count(data_dir: &Path) -> usize {
    walkdir::WalkDir::new(data_dir.join("blobs"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

fn document_count(indexer: &Indexer) -> usize {
    indexer
        .graph()
        .search_nodes(Some("Document"), None, 100)
        .unwrap()
        .len()
}

fn search(indexer: &Indexer, query: &str, k: usize) -> mnemo::search::SearchPage {
    search_chunks(
        indexer.embedder(),
        indexer.vectors(),
        &SearchRequest {
            query: query.to_string(),
            k,
            offset: 0,
            type_filter: None,
            path_filter: None,
        },
    )
    .unwrap()
}

#[test]
fn ingest_then_search_finds_the_chunk() {
    let env = setup();
    let path = write_file(&env.files_dir, "a.txt", "alpha beta gamma");

    let outcome = env.indexer.ingest_file(&path).unwrap();
    assert!(matches!(outcome, IngestOutcome::Indexed { chunk_count: 1, .. }));

    let page = search(&env.indexer, "alpha", 10);
    assert_eq!(page.results.len(), 1);
    assert!(page.results[0].id.starts_with("chunk:"));
    assert!(page.results[0].score > 0.0);
}

#[test]
fn reingesting_unchanged_file_is_a_noop() {
    let env = setup();
    let path = write_file(&env.files_dir, "a.txt", "alpha beta gamma");

    env.indexer.ingest_file(&path).unwrap();
    let vectors_before = env.indexer.vectors().read().len();
    let docs_before = env.indexer.embedder().read().doc_count();

    let outcome = env.indexer.ingest_file(&path).unwrap();
    assert_eq!(outcome, IngestOutcome::Unchanged);

    assert_eq!(env.indexer.tracker().lock().count(), 1);
    assert_eq!(blob_file_count(&env.data_dir), 1);
    assert_eq!(document_count(&env.indexer), 1);
    assert_eq!(env.indexer.vectors().read().len(), vectors_before);
    assert_eq!(env.indexer.embedder().read().doc_count(), docs_before);
}

#[test]
fn identical_content_at_two_paths_is_one_document() {
    let env = setup();
    let a = write_file(&env.files_dir, "a.txt", "x");
    let b = write_file(&env.files_dir, "b.txt", "x");

    env.indexer.ingest_file(&a).unwrap();
    env.indexer.ingest_file(&b).unwrap();

    assert_eq!(blob_file_count(&env.data_dir), 1);
    assert_eq!(document_count(&env.indexer), 1);

    // Last writer wins on the path property.
    let docs = env
        .indexer
        .graph()
        .search_nodes(Some("Document"), None, 10)
        .unwrap();
    let path_prop = docs[0].props.get("path").unwrap().as_str().unwrap();
    assert!(path_prop.ends_with("b.txt"));

    // Both paths are tracked even though they share one document.
    assert_eq!(env.indexer.tracker().lock().count(), 2);
}

#[test]
fn chunk_count_tracks_document_size() {
    let env = setup();
    let line = "word ".repeat(12); // 60 chars
    let text = vec![line; 33].join("\n"); // ~2000 chars
    let path = write_file(&env.files_dir, "long.txt", &text);

    let outcome = env.indexer.ingest_file(&path).unwrap();
    let IngestOutcome::Indexed { chunk_count, .. } = outcome else {
        panic!("expected an indexed outcome");
    };
    assert!(
        (3..=5).contains(&chunk_count),
        "2000 chars should chunk to 4 ± 1, got {chunk_count}"
    );
    assert_eq!(env.indexer.tracker().lock().get(path.to_str().unwrap()).unwrap().chunk_count, chunk_count);
}

#[test]
fn entities_are_linked_from_their_chunk() {
    let env = setup();
    let path = write_file(
        &env.files_dir,
        "contact.txt",
        "Contact John at john@example.com",
    );

    let outcome = env.indexer.ingest_file(&path).unwrap();
    let IngestOutcome::Indexed { doc_id, .. } = outcome else {
        panic!("expected an indexed outcome");
    };

    let email = env.indexer.graph().get_node("entity:email:john@example.com").unwrap();
    assert_eq!(email.node_type, "Entity");
    let john = env.indexer.graph().get_node("entity:john").unwrap();
    assert_eq!(john.label, "John");

    // Both hang off the chunk via HAS_ENTITY edges labeled "mentions".
    let chunk_id = format!("chunk:{}:0", doc_id.trim_start_matches("doc:"));
    let edges = env.indexer.graph().edges_from(&chunk_id).unwrap();
    let entity_edges: Vec<_> = edges.iter().filter(|e| e.edge_type == "HAS_ENTITY").collect();
    assert!(entity_edges.iter().any(|e| e.to == "entity:email:john@example.com"));
    assert!(entity_edges.iter().any(|e| e.to == "entity:john"));
    assert!(entity_edges.iter().all(|e| e.label == "mentions"));
}

#[test]
fn document_traversal_reaches_all_chunks() {
    let env = setup();
    let line = "content ".repeat(10);
    let text = vec![line; 30].join("\n");
    let path = write_file(&env.files_dir, "multi.txt", &text);

    let outcome = env.indexer.ingest_file(&path).unwrap();
    let IngestOutcome::Indexed { doc_id, chunk_count } = outcome else {
        panic!("expected an indexed outcome");
    };
    assert!(chunk_count > 1);

    let nodes = env
        .indexer
        .graph()
        .traverse(&doc_id, Some("HAS_CHUNK"), 1)
        .unwrap();
    assert!(
        nodes.len() >= chunk_count + 1,
        "doc + {} chunks expected, traversal saw {}",
        chunk_count,
        nodes.len()
    );
}

#[test]
fn most_relevant_document_ranks_first() {
    let env = setup();
    let d1 = write_file(&env.files_dir, "d1.txt", "python programming tutorial");
    let d2 = write_file(&env.files_dir, "d2.txt", "javascript web development");
    env.indexer.ingest_file(&d1).unwrap();
    env.indexer.ingest_file(&d2).unwrap();

    let page = search(&env.indexer, "python tutorial", 2);
    assert!(!page.results.is_empty());
    assert!(
        page.results[0].meta.contains("d1.txt"),
        "top hit should come from d1, got {}",
        page.results[0].meta
    );
}

#[test]
fn type_filter_excludes_other_formats() {
    let env = setup();
    let md = write_file(&env.files_dir, "notes.md", "shared topic words here");
    let txt = write_file(&env.files_dir, "notes.txt", "shared topic words here too");
    env.indexer.ingest_file(&md).unwrap();
    env.indexer.ingest_file(&txt).unwrap();

    let page = search_chunks(
        env.indexer.embedder(),
        env.indexer.vectors(),
        &SearchRequest {
            query: "shared topic".to_string(),
            k: 10,
            offset: 0,
            type_filter: Some("md".to_string()),
            path_filter: None,
        },
    )
    .unwrap();

    assert!(!page.results.is_empty());
    for hit in &page.results {
        assert!(
            hit.meta.contains("\"file_type\":\"markdown\"")
                || hit.meta.contains("\"content_type\":\"md"),
            "unexpected hit {}",
            hit.meta
        );
    }
}

#[test]
fn path_filter_limits_results() {
    let env = setup();
    let sub_a = env.files_dir.join("project-a");
    let sub_b = env.files_dir.join("project-b");
    std::fs::create_dir_all(&sub_a).unwrap();
    std::fs::create_dir_all(&sub_b).unwrap();

    env.indexer
        .ingest_file(&write_file(&sub_a, "a.txt", "common keyword alpha"))
        .unwrap();
    env.indexer
        .ingest_file(&write_file(&sub_b, "b.txt", "common keyword beta"))
        .unwrap();

    let page = search_chunks(
        env.indexer.embedder(),
        env.indexer.vectors(),
        &SearchRequest {
            query: "common keyword".to_string(),
            k: 10,
            offset: 0,
            type_filter: None,
            path_filter: Some("project-a".to_string()),
        },
    )
    .unwrap();

    assert!(!page.results.is_empty());
    for hit in &page.results {
        assert!(hit.meta.contains("project-a"));
    }
}

#[test]
fn pagination_reports_the_window() {
    let env = setup();
    // Twelve documents sharing a term, each one chunk.
    for i in 0..12 {
        let path = write_file(
            &env.files_dir,
            &format!("doc{i}.txt"),
            &format!("python snippet number {i}"),
        );
        env.indexer.ingest_file(&path).unwrap();
    }

    let page = search_chunks(
        env.indexer.embedder(),
        env.indexer.vectors(),
        &SearchRequest {
            query: "python".to_string(),
            k: 5,
            offset: 5,
            type_filter: None,
            path_filter: None,
        },
    )
    .unwrap();

    assert_eq!(page.offset, 5);
    assert_eq!(page.limit, 5);
    assert_eq!(page.page, 2);
    assert!(page.results.len() <= 5);
    if page.total > 10 {
        assert_eq!(page.next_offset, Some(10));
    } else {
        assert!(page.next_offset.is_none());
    }
}

#[test]
fn reindex_all_survives_missing_files() {
    let env = setup();
    let keep = write_file(&env.files_dir, "keep.txt", "stable content");
    let gone = write_file(&env.files_dir, "gone.txt", "doomed content");
    env.indexer.ingest_file(&keep).unwrap();
    env.indexer.ingest_file(&gone).unwrap();

    std::fs::remove_file(&gone).unwrap();

    let (ok, failed) = env.indexer.reindex_all();
    assert_eq!(ok, 1);
    assert_eq!(failed, 1);
}

#[test]
fn state_survives_restart() {
    let env = setup();
    let path = write_file(&env.files_dir, "a.txt", "alpha beta gamma");
    env.indexer.ingest_file(&path).unwrap();
    env.indexer.flush().unwrap();
    drop(env.indexer);

    let reopened = Indexer::open(&env.data_dir, None).unwrap();
    assert_eq!(reopened.tracker().lock().count(), 1);
    assert_eq!(reopened.embedder().read().doc_count(), 1);
    assert_eq!(document_count(&reopened), 1);

    // Embedding the same text in the reopened process is bit-identical.
    let before = reopened.embedder().read().embed("alpha");
    let again = reopened.embedder().read().embed("alpha");
    assert_eq!(before, again);
}
