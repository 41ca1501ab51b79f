//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use codeindex_orchestration::{IndexingConfig, PipelineOrchestrator};
use codeindex_orchestration::orchestrator::OrchestratorPorts;
use codeindex_storage::{MemoryChunkStore, MemoryGraphStore};

pub struct TestHarness {
    pub orchestrator: PipelineOrchestrator,
    pub graph_store: Arc<MemoryGraphStore>,
    pub chunk_store: Arc<MemoryChunkStore>,
}

pub fn harness() -> TestHarness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let graph_store = Arc::new(MemoryGraphStore::new());
    let chunk_store = Arc::new(MemoryChunkStore::new());

    let ports = OrchestratorPorts {
        graph_store: Some(graph_store.clone()),
        chunk_store: Some(chunk_store.clone()),
        ..Default::default()
    };

    TestHarness {
        orchestrator: PipelineOrchestrator::new(IndexingConfig::default(), ports),
        graph_store,
        chunk_store,
    }
}

pub fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git available");
    assert!(status.success(), "git {:?} failed", args);
}

pub fn git_init(dir: &Path) {
    run_git(dir, &["init", "-q"]);
    run_git(dir, &["config", "user.email", "test@example.com"]);
    run_git(dir, &["config", "user.name", "Test"]);
}

pub fn git_commit_all(dir: &Path, message: &str) -> String {
    run_git(dir, &["add", "-A"]);
    run_git(dir, &["commit", "-q", "-m", message]);
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
