//! Chunk builder
//!
//! Graph + IR + source → chunk tree per file. Repositories with ten or more
//! files fan out across a bounded Rayon pool; emitted chunks are deduplicated
//! by ID within each save batch (last write wins).

use rayon::prelude::*;
use std::collections::HashMap;

use super::chunk::{Chunk, ChunkKind};
use super::id_generator::{ChunkIdContext, ChunkIdGenerator};
use crate::features::graph::GraphDocument;
use crate::shared::models::{IRDocument, Node, NodeKind};
use crate::shared::utils::content_hash;

/// Fan out per-file work once the repo reaches this size
pub const PARALLEL_THRESHOLD_FILES: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Build output: chunks plus the chunk→IR and chunk→graph mappings
#[derive(Debug, Default)]
pub struct ChunkBuildOutput {
    pub chunks: Vec<Chunk>,
    pub chunk_to_ir: HashMap<String, Vec<String>>,
    pub chunk_to_graph: HashMap<String, Vec<String>>,
    /// Files that failed chunk building, with errors
    pub failed_files: Vec<(String, String)>,
}

pub struct ChunkBuilder {
    concurrency: usize,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Build chunks for every file in the document.
    ///
    /// `file_texts` maps file path → source text; files without text are
    /// recorded as failures and skipped.
    pub fn build(
        &self,
        ir_doc: &IRDocument,
        graph_doc: &GraphDocument,
        file_texts: &HashMap<String, String>,
    ) -> ChunkBuildOutput {
        let mut nodes_by_file: HashMap<&str, Vec<&Node>> = HashMap::new();
        for node in &ir_doc.nodes {
            nodes_by_file.entry(&node.file_path).or_default().push(node);
        }

        let mut files: Vec<&str> = nodes_by_file.keys().copied().collect();
        files.sort_unstable();

        let id_gen = ChunkIdGenerator::new();

        let build_one = |file: &&str| -> (Vec<Chunk>, Option<(String, String)>) {
            let text = match file_texts.get(*file) {
                Some(t) => t,
                None => {
                    return (
                        Vec::new(),
                        Some(((*file).to_string(), "source text unavailable".to_string())),
                    )
                }
            };
            let chunks = build_file_chunks(
                ir_doc,
                &nodes_by_file[*file],
                file,
                text,
                &id_gen,
            );
            (chunks, None)
        };

        let per_file: Vec<(Vec<Chunk>, Option<(String, String)>)> =
            if files.len() >= PARALLEL_THRESHOLD_FILES {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.concurrency)
                    .build();
                match pool {
                    Ok(pool) => pool.install(|| files.par_iter().map(build_one).collect()),
                    Err(_) => files.iter().map(build_one).collect(),
                }
            } else {
                files.iter().map(build_one).collect()
            };

        let mut output = ChunkBuildOutput::default();

        // Dedup by chunk_id, last write wins
        let mut by_id: HashMap<String, Chunk> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for (chunks, failure) in per_file {
            if let Some(f) = failure {
                output.failed_files.push(f);
            }
            for chunk in chunks {
                if !by_id.contains_key(&chunk.chunk_id) {
                    order.push(chunk.chunk_id.clone());
                }
                by_id.insert(chunk.chunk_id.clone(), chunk);
            }
        }
        output.chunks = order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect();

        for chunk in &output.chunks {
            if let Some(symbol_id) = &chunk.symbol_id {
                output
                    .chunk_to_ir
                    .entry(chunk.chunk_id.clone())
                    .or_default()
                    .push(symbol_id.clone());
                if graph_doc.get_node(symbol_id).is_some() {
                    output
                        .chunk_to_graph
                        .entry(chunk.chunk_id.clone())
                        .or_default()
                        .push(symbol_id.clone());
                }
            }
        }

        tracing::info!(
            chunks = output.chunks.len(),
            failed_files = output.failed_files.len(),
            "chunk_build_completed"
        );

        output
    }
}

/// One file's chunk tree: file chunk → class chunks → function/method chunks
fn build_file_chunks(
    ir_doc: &IRDocument,
    nodes: &[&Node],
    file_path: &str,
    text: &str,
    id_gen: &ChunkIdGenerator,
) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    // IR node id → chunk index, for parent wiring
    let mut chunk_of_node: HashMap<&str, usize> = HashMap::new();

    let file_node = nodes.iter().find(|n| n.kind == NodeKind::File);
    let file_chunk_idx = if let Some(file_node) = file_node {
        let hash = content_hash::hash_text(text);
        let chunk_id = id_gen.generate(&ChunkIdContext {
            repo_id: &ir_doc.repo_id,
            kind: ChunkKind::File.as_str(),
            file_path,
            span: file_node.span,
            content_hash: Some(&hash),
        });
        let mut chunk = Chunk::new(
            chunk_id,
            &ir_doc.repo_id,
            &ir_doc.snapshot_id,
            file_path,
            ChunkKind::File,
            &file_node.fqn,
            file_node.span,
            hash,
        );
        chunk.language = Some(file_node.language.clone());
        chunk.symbol_id = Some(file_node.id.clone());
        chunk_of_node.insert(&file_node.id, chunks.len());
        chunks.push(chunk);
        Some(0)
    } else {
        None
    };

    // Deterministic order: by span start
    let mut symbol_nodes: Vec<&&Node> = nodes
        .iter()
        .filter(|n| {
            matches!(
                n.kind,
                NodeKind::Class | NodeKind::Interface | NodeKind::Function | NodeKind::Method
            )
        })
        .collect();
    symbol_nodes.sort_by_key(|n| (n.span.start_line, n.span.start_col));

    for node in symbol_nodes {
        let kind = match node.kind {
            NodeKind::Class | NodeKind::Interface => ChunkKind::Class,
            NodeKind::Method => ChunkKind::Method,
            _ => ChunkKind::Function,
        };

        let hash = content_hash::hash_lines(text, node.span.start_line, node.span.end_line);
        let chunk_id = id_gen.generate(&ChunkIdContext {
            repo_id: &ir_doc.repo_id,
            kind: kind.as_str(),
            file_path,
            span: node.span,
            content_hash: Some(&hash),
        });

        let mut chunk = Chunk::new(
            chunk_id.clone(),
            &ir_doc.repo_id,
            &ir_doc.snapshot_id,
            file_path,
            kind,
            &node.fqn,
            node.span,
            hash,
        );
        chunk.language = Some(node.language.clone());
        chunk.symbol_id = Some(node.id.clone());
        if let Some(vis) = node.attr_str("visibility") {
            chunk.attrs.insert("visibility".into(), vis.to_string());
        }

        // Parent: enclosing symbol chunk, else the file chunk
        let parent_idx = node
            .parent_id
            .as_deref()
            .and_then(|pid| chunk_of_node.get(pid).copied())
            .or(file_chunk_idx);
        if let Some(pi) = parent_idx {
            chunk.parent_id = Some(chunks[pi].chunk_id.clone());
            let child_id = chunk.chunk_id.clone();
            chunks[pi].add_child(child_id);
        }

        chunk_of_node.insert(&node.id, chunks.len());
        chunks.push(chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::graph::GraphBuilder;
    use crate::features::ir::IRBuilder;
    use crate::features::parsing::{parse_source, LanguageId, ParserRegistry, SourceFile};
    use std::sync::Arc;

    fn build_chunks(files: &[(&str, &str)]) -> ChunkBuildOutput {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let ir_builder = IRBuilder::new(registry);

        let mut parsed_files = Vec::new();
        let mut texts = HashMap::new();
        for (path, code) in files {
            parsed_files.push(
                parse_source(&SourceFile::new(*path, LanguageId::Python, *code)).unwrap(),
            );
            texts.insert(path.to_string(), code.to_string());
        }

        let (doc, _) = ir_builder.build_document(&parsed_files, "r", "s");
        let graph = GraphBuilder::new().build_full(&doc, None).unwrap();
        ChunkBuilder::new().build(&doc, &graph, &texts)
    }

    #[test]
    fn test_file_and_function_chunks() {
        let output = build_chunks(&[("a.py", "def f(x):\n    return x\n")]);
        assert!(output.chunks.iter().any(|c| c.kind == ChunkKind::File));
        let func = output
            .chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Function)
            .unwrap();
        assert_eq!(func.fqn, "f");
        assert!(func.parent_id.is_some());
    }

    #[test]
    fn test_method_parented_to_class_chunk() {
        let output = build_chunks(&[(
            "a.py",
            "class Svc:\n    def run(self):\n        pass\n",
        )]);
        let class_chunk = output
            .chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Class)
            .unwrap();
        let method_chunk = output
            .chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Method)
            .unwrap();
        assert_eq!(
            method_chunk.parent_id.as_deref(),
            Some(class_chunk.chunk_id.as_str())
        );
        assert!(class_chunk.children.contains(&method_chunk.chunk_id));
    }

    #[test]
    fn test_chunk_ids_span_stable() {
        // Whitespace-only edit inside the span keeps the ID, changes the hash
        let a = build_chunks(&[("a.py", "def f(x):\n    return x\n")]);
        let b = build_chunks(&[("a.py", "def f(x):\n    return  x\n")]);

        let fa = a.chunks.iter().find(|c| c.kind == ChunkKind::Function).unwrap();
        let fb = b.chunks.iter().find(|c| c.kind == ChunkKind::Function).unwrap();
        assert_eq!(fa.chunk_id, fb.chunk_id);
        assert_ne!(fa.content_hash, fb.content_hash);
    }

    #[test]
    fn test_deterministic_output_order() {
        let files = &[
            ("b.py", "def g():\n    pass\n"),
            ("a.py", "def f():\n    pass\n"),
        ];
        let o1 = build_chunks(files);
        let o2 = build_chunks(files);
        let ids1: Vec<&str> = o1.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let ids2: Vec<&str> = o2.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn test_chunk_mappings_populated() {
        let output = build_chunks(&[("a.py", "def f():\n    pass\n")]);
        let func = output
            .chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Function)
            .unwrap();
        assert!(output.chunk_to_ir.contains_key(&func.chunk_id));
        assert!(output.chunk_to_graph.contains_key(&func.chunk_id));
    }

    #[test]
    fn test_missing_text_recorded_as_failure() {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let ir_builder = IRBuilder::new(registry);
        let parsed = vec![
            parse_source(&SourceFile::new("a.py", LanguageId::Python, "def f():\n    pass\n"))
                .unwrap(),
        ];
        let (doc, _) = ir_builder.build_document(&parsed, "r", "s");
        let graph = GraphBuilder::new().build_full(&doc, None).unwrap();

        let output = ChunkBuilder::new().build(&doc, &graph, &HashMap::new());
        assert_eq!(output.failed_files.len(), 1);
        assert!(output.chunks.is_empty());
    }
}
