//! Parsing stage
//!
//! Reads sources and parses them through the thread-local parser pool.
//! Parallel across files with a bounded Rayon pool; cancellation is checked
//! between files and never mid-parse (parsers are bounded by file size).

use rayon::prelude::*;
use std::fs;
use std::sync::Arc;

use codeindex_ir::features::parsing::{parse_source, ParsedFile, ParserRegistry, SourceFile};

use super::HandlerContext;
use crate::discovery::{DiscoveredFile, FileClass};
use crate::models::{IndexingResult, IndexingStage};
use crate::progress::IndexJobCheckpoint;

pub struct ParsingHandler {
    registry: Arc<ParserRegistry>,
}

impl ParsingHandler {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self { registry }
    }

    /// Parse the discovered code files, populating the context's parsed
    /// files, source map, and file texts.
    ///
    /// Returns false when cancelled mid-stage (progress stays valid for
    /// resume).
    pub async fn execute(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        files: &[DiscoveredFile],
    ) -> bool {
        ctx.report_progress(IndexingStage::Parsing, 0.0);

        // Skip already-completed files only once their outputs are durable;
        // before that, a resume must rebuild them for identical results
        let durable = ctx
            .progress
            .as_ref()
            .map(|p| p.stage_completed(IndexJobCheckpoint::ChunksStored))
            .unwrap_or(false);

        let code_files: Vec<&DiscoveredFile> = files
            .iter()
            .filter(|f| f.class == FileClass::Code && f.language.is_some())
            .filter(|f| {
                !(durable
                    && ctx
                        .progress
                        .as_ref()
                        .map(|p| p.can_skip_file(&f.rel_path))
                        .unwrap_or(false))
            })
            .collect();

        let total = code_files.len();
        let mut parsed_count = 0usize;

        for (i, batch) in code_files.chunks(ctx.config.max_workers.max(1)).enumerate() {
            if ctx.is_cancelled() {
                tracing::info!(stage = "parsing", "stage_cancelled");
                if let Some(progress) = &mut ctx.progress {
                    progress.pause();
                }
                ctx.persist_progress().await;
                return false;
            }

            let outcomes: Vec<(String, Result<(ParsedFile, String), String>)> =
                if ctx.config.parallel {
                    batch
                        .par_iter()
                        .map(|file| (file.rel_path.clone(), parse_one(&self.registry, file)))
                        .collect()
                } else {
                    batch
                        .iter()
                        .map(|file| (file.rel_path.clone(), parse_one(&self.registry, file)))
                        .collect()
                };

            for (rel_path, outcome) in outcomes {
                match outcome {
                    Ok((parsed, text)) => {
                        parsed_count += 1;
                        ctx.source_map.insert(rel_path.clone(), parsed.clone());
                        ctx.file_texts.insert(rel_path.clone(), text);
                        ctx.parsed_files.push(parsed);
                        if let Some(progress) = &mut ctx.progress {
                            progress.processing_file = None;
                            progress.mark_file_completed(&rel_path);
                        }
                    }
                    Err(error) => {
                        result.files_failed += 1;
                        result.failed_parse_files.push(rel_path.clone());
                        if let Some(progress) = &mut ctx.progress {
                            progress.mark_file_failed(&rel_path, &error);
                        }
                        if !ctx.config.skip_parse_errors {
                            result.add_error(format!("parse failed: {}: {}", rel_path, error));
                        } else {
                            tracing::warn!(file = %rel_path, error = %error, "parse_failed");
                        }
                    }
                }
            }

            // Opportunistic persistence after every batch of file
            // completions
            ctx.persist_progress().await;

            let done = ((i + 1) * ctx.config.max_workers).min(total.max(1));
            ctx.report_progress(IndexingStage::Parsing, done as f64 / total.max(1) as f64 * 100.0);
        }

        result.files_processed += parsed_count;
        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::ParsingCompleted);
        }
        ctx.persist_progress().await;
        ctx.report_progress(IndexingStage::Parsing, 100.0);

        tracing::info!(
            parsed = parsed_count,
            failed = result.failed_parse_files.len(),
            "parsing_completed"
        );
        true
    }
}

fn parse_one(
    registry: &ParserRegistry,
    file: &DiscoveredFile,
) -> Result<(ParsedFile, String), String> {
    let language = file.language.ok_or_else(|| "unsupported language".to_string())?;
    if registry.get(language).is_none() {
        return Err(format!("no plugin for {}", language.name()));
    }

    let text = fs::read_to_string(&file.abs_path).map_err(|e| e.to_string())?;
    let source = SourceFile::new(file.rel_path.clone(), language, text.clone());
    let parsed = parse_source(&source).map_err(|e| e.to_string())?;
    Ok((parsed, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::discovery::FileDiscovery;
    use crate::session::IndexSessionContext;
    use std::collections::HashMap;
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    fn context(repo_path: std::path::PathBuf) -> HandlerContext {
        HandlerContext {
            repo_path,
            repo_id: "r".into(),
            snapshot_id: "s".into(),
            config: IndexingConfig::default(),
            incremental: false,
            change_set: None,
            session: IndexSessionContext::new(200),
            cancel: CancellationToken::new(),
            progress: None,
            progress_callback: None,
            progress_store: None,
            parsed_files: Vec::new(),
            source_map: HashMap::new(),
            file_texts: HashMap::new(),
            ir_doc: None,
            semantic_snapshot: None,
            semantic_index: None,
            graph_doc: None,
            chunk_ids: Vec::new(),
            deleted_chunk_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_parse_stage_populates_context() {
        let tmp = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(tmp.path().join("a.py")).unwrap();
        f.write_all(b"def f():\n    pass\n").unwrap();

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);

        let mut ctx = context(tmp.path().to_path_buf());
        let mut result = IndexingResult::new("r", "s", false);

        let handler = ParsingHandler::new(Arc::new(ParserRegistry::with_defaults()));
        let completed = handler.execute(&mut ctx, &mut result, &files).await;

        assert!(completed);
        assert_eq!(ctx.parsed_files.len(), 1);
        assert!(ctx.source_map.contains_key("a.py"));
        assert!(ctx.file_texts.contains_key("a.py"));
        assert_eq!(result.files_processed, 1);
    }

    #[tokio::test]
    async fn test_parse_stage_cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);

        let mut ctx = context(tmp.path().to_path_buf());
        ctx.cancel.cancel();
        let mut result = IndexingResult::new("r", "s", false);

        let handler = ParsingHandler::new(Arc::new(ParserRegistry::with_defaults()));
        let completed = handler.execute(&mut ctx, &mut result, &files).await;
        assert!(!completed);
        assert!(ctx.parsed_files.is_empty());
    }
}
