//! Indexing configuration

use serde::{Deserialize, Serialize};

/// Configuration for one indexing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    // Parallel processing
    pub parallel: bool,
    pub max_workers: usize,

    // File filtering
    pub max_code_file_size_mb: u64,
    pub max_document_file_size_mb: u64,
    pub excluded_dirs: Vec<String>,
    pub excluded_extensions: Vec<String>,

    // Error handling
    pub skip_parse_errors: bool,
    pub continue_on_error: bool,

    // Incremental indexing
    pub incremental_enabled: bool,

    // Index toggles
    pub enable_lexical_index: bool,
    pub enable_vector_index: bool,
    pub enable_symbol_index: bool,
    pub enable_fuzzy_index: bool,
    pub enable_domain_index: bool,

    // Performance
    pub chunk_batch_size: usize,
    pub vector_batch_size: usize,

    // Background task timeout
    pub task_timeout_secs: u64,

    // Impact-based second pass
    pub enable_impact_pass: bool,
    pub max_impact_reindex_files: usize,
    pub impact_max_depth: usize,
    pub impact_max_affected: usize,

    // Stale edge TTL
    pub stale_ttl_hours: f64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: num_cpus::get().clamp(4, 8),
            max_code_file_size_mb: 10,
            max_document_file_size_mb: 25,
            excluded_dirs: vec![
                ".git".into(),
                "node_modules".into(),
                "__pycache__".into(),
                ".venv".into(),
                "venv".into(),
                "dist".into(),
                "build".into(),
                "target".into(),
                ".next".into(),
                ".cache".into(),
            ],
            excluded_extensions: vec![
                ".pyc".into(),
                ".pyo".into(),
                ".so".into(),
                ".dylib".into(),
                ".exe".into(),
                ".bin".into(),
                ".jpg".into(),
                ".png".into(),
                ".gif".into(),
                ".pdf".into(),
                ".zip".into(),
                ".tar".into(),
                ".gz".into(),
            ],
            skip_parse_errors: true,
            continue_on_error: true,
            incremental_enabled: true,
            enable_lexical_index: true,
            enable_vector_index: true,
            enable_symbol_index: true,
            enable_fuzzy_index: true,
            enable_domain_index: true,
            chunk_batch_size: 100,
            vector_batch_size: 1024,
            task_timeout_secs: 30 * 60,
            enable_impact_pass: true,
            max_impact_reindex_files: 200,
            impact_max_depth: 3,
            impact_max_affected: 500,
            stale_ttl_hours: 24.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexingConfig::default();
        assert!((4..=8).contains(&config.max_workers));
        assert!(config.continue_on_error);
        assert_eq!(config.task_timeout_secs, 1800);
        assert!(config.excluded_dirs.iter().any(|d| d == ".git"));
    }
}
