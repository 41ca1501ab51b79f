//! Incremental indexing tests against real git repositories

mod common;

use std::collections::BTreeSet;
use std::fs;

use codeindex_ir::features::chunking::ChunkStore;
use codeindex_ir::features::graph::GraphStore;
use codeindex_ir::shared::models::EdgeKind;
use codeindex_orchestration::orchestrator::IndexRequest;
use codeindex_orchestration::IndexingStatus;

use common::{git_commit_all, git_init, harness, run_git};

#[tokio::test]
async fn test_incremental_noop_when_no_changes() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.py"), "def f():\n    pass\n").unwrap();
    git_init(tmp.path());
    let commit = git_commit_all(tmp.path(), "initial");

    let h = harness();
    h.orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    let result = h
        .orchestrator
        .index_repository(IndexRequest::incremental(
            tmp.path(),
            "r",
            "main",
            Some(commit),
        ))
        .await
        .unwrap();

    assert_eq!(result.status, IndexingStatus::Completed);
    // All later stages skipped
    assert_eq!(result.files_discovered, 0);
    assert_eq!(result.chunks_created, 0);
}

#[tokio::test]
async fn test_incremental_equivalent_to_full() {
    // full(S2) and full(S1) + incremental(S1→S2) agree on edges (by
    // identity) and chunks (by id + content hash)
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.py"),
        "from b import helper\n\ndef main():\n    helper()\n",
    )
    .unwrap();
    fs::write(tmp.path().join("b.py"), "def helper():\n    return 1\n").unwrap();
    git_init(tmp.path());
    let c1 = git_commit_all(tmp.path(), "s1");

    // Incremental path: full at S1, then change b.py and go incremental
    let h_incr = harness();
    h_incr
        .orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    fs::write(
        tmp.path().join("b.py"),
        "def helper():\n    return 2\n\ndef extra():\n    return 3\n",
    )
    .unwrap();
    git_commit_all(tmp.path(), "s2");

    let result = h_incr
        .orchestrator
        .index_repository(IndexRequest::incremental(
            tmp.path(),
            "r",
            "main",
            Some(c1.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(result.status, IndexingStatus::Completed);

    // Full path at S2 with fresh stores
    let h_full = harness();
    h_full
        .orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    let graph_incr = h_incr
        .graph_store
        .load_graph("r", "main")
        .await
        .unwrap()
        .unwrap();
    let graph_full = h_full
        .graph_store
        .load_graph("r", "main")
        .await
        .unwrap()
        .unwrap();

    let nodes_incr: BTreeSet<&String> = graph_incr.graph_nodes.keys().collect();
    let nodes_full: BTreeSet<&String> = graph_full.graph_nodes.keys().collect();
    assert_eq!(nodes_incr, nodes_full);

    let edges_incr: BTreeSet<String> = graph_incr
        .graph_edges
        .iter()
        .map(|e| format!("{:?}", e.identity()))
        .collect();
    let edges_full: BTreeSet<String> = graph_full
        .graph_edges
        .iter()
        .map(|e| format!("{:?}", e.identity()))
        .collect();
    assert_eq!(edges_incr, edges_full);

    let chunks_incr: BTreeSet<(String, String)> = h_incr
        .chunk_store
        .list_chunks("r", "main")
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.chunk_id, c.content_hash))
        .collect();
    let chunks_full: BTreeSet<(String, String)> = h_full
        .chunk_store
        .list_chunks("r", "main")
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.chunk_id, c.content_hash))
        .collect();
    assert_eq!(chunks_incr, chunks_full);
}

#[tokio::test]
async fn test_deleted_callee_marks_edge_invalid() {
    // f in a.py CALLS g in b.py; deleting b.py and reindexing only the
    // change leaves the edge addressable but INVALID on validation
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.py"),
        "from b import g\n\ndef f():\n    g()\n",
    )
    .unwrap();
    fs::write(tmp.path().join("b.py"), "def g():\n    return 1\n").unwrap();
    git_init(tmp.path());
    let c1 = git_commit_all(tmp.path(), "s1");

    let h = harness();
    h.orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    let graph_before = h.graph_store.load_graph("r", "main").await.unwrap().unwrap();
    let call_edge = graph_before
        .graph_edges
        .iter()
        .find(|e| e.kind == EdgeKind::Calls && e.target_file == "b.py")
        .expect("CALLS edge into b.py")
        .clone();

    fs::remove_file(tmp.path().join("b.py")).unwrap();
    git_commit_all(tmp.path(), "delete b");

    let result = h
        .orchestrator
        .index_repository(IndexRequest::incremental(
            tmp.path(),
            "r",
            "main",
            Some(c1),
        ))
        .await
        .unwrap();
    assert_eq!(result.status, IndexingStatus::Completed);

    let graph_after = h.graph_store.load_graph("r", "main").await.unwrap().unwrap();
    // g's node is gone; the caller's edge survives for marking
    assert!(!graph_after
        .graph_nodes
        .values()
        .any(|n| n.file_path == "b.py"));

    let validator = h.orchestrator.edge_validator();
    let verdicts = validator.validate_edges("r", &[call_edge.id.clone()], &graph_after);
    let verdict = &verdicts[&call_edge.id];
    assert_eq!(
        verdict.status,
        codeindex_ir::features::edge_validation::EdgeStatus::Invalid
    );
    assert_eq!(verdict.message.as_deref(), Some("target_was_deleted"));
}

#[tokio::test]
async fn test_rename_propagates_chunk_ids_and_edges() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.py"), "def f(x):\n    return x\n").unwrap();
    git_init(tmp.path());
    let c1 = git_commit_all(tmp.path(), "s1");

    let h = harness();
    h.orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    let before: Vec<_> = h.chunk_store.list_chunks("r", "main").await.unwrap();
    let func_hash_before = before
        .iter()
        .find(|c| c.fqn == "f")
        .map(|c| c.content_hash.clone())
        .unwrap();

    // Identical content, new path
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    run_git(tmp.path(), &["mv", "a.py", "src/a.py"]);
    git_commit_all(tmp.path(), "rename");

    let result = h
        .orchestrator
        .index_repository(IndexRequest::incremental(
            tmp.path(),
            "r",
            "main",
            Some(c1),
        ))
        .await
        .unwrap();
    assert_eq!(result.status, IndexingStatus::Completed);

    let delta = result.metadata.get("chunk_delta").expect("chunk delta");
    assert!(delta["renamed"].as_u64().unwrap() > 0, "renamed != 0");
    assert_eq!(delta["added"].as_u64().unwrap(), 0, "added == 0");

    let after = h.chunk_store.list_chunks("r", "main").await.unwrap();
    let renamed_func = after.iter().find(|c| c.fqn == "f").unwrap();
    assert_eq!(renamed_func.file_path, "src/a.py");
    assert_eq!(renamed_func.content_hash, func_hash_before);

    // Graph edges carry the new source file
    let graph = h.graph_store.load_graph("r", "main").await.unwrap().unwrap();
    assert!(graph
        .graph_edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Contains)
        .all(|e| e.source_file != "a.py"));
    assert!(graph
        .graph_edges
        .iter()
        .any(|e| e.source_file == "src/a.py"));
}

#[tokio::test]
async fn test_incremental_reports_stale_edges() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("a.py"),
        "from b import g\n\ndef f():\n    g()\n",
    )
    .unwrap();
    fs::write(tmp.path().join("b.py"), "def g():\n    return 1\n").unwrap();
    git_init(tmp.path());
    let c1 = git_commit_all(tmp.path(), "s1");

    let h = harness();
    h.orchestrator
        .index_repository(IndexRequest::full(tmp.path(), "r", "main"))
        .await
        .unwrap();

    // Modify the callee's file; the caller's edge becomes stale
    fs::write(tmp.path().join("b.py"), "def g():\n    return 2\n").unwrap();
    git_commit_all(tmp.path(), "s2");

    let result = h
        .orchestrator
        .index_repository(IndexRequest::incremental(
            tmp.path(),
            "r",
            "main",
            Some(c1),
        ))
        .await
        .unwrap();

    assert_eq!(result.status, IndexingStatus::Completed);
    assert!(result.metadata.contains_key("stale_edges_marked"));
    // b.py was reindexed, so its stale entries are cleared again
    assert!(result.metadata.contains_key("stale_edges_cleared"));
}
