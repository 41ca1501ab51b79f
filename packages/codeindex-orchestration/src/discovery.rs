//! File discovery
//!
//! Walks the repository tree applying the configured filters: excluded
//! directories, excluded extensions, per-class size caps, and a NUL-probe
//! for binaries. Output is sorted by path so downstream batching is
//! reproducible.

use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use codeindex_ir::features::parsing::LanguageId;

use crate::config::IndexingConfig;

const BINARY_PROBE_BYTES: usize = 512;

/// How a discovered file will be treated downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Code,
    Document,
}

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the repo root
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub class: FileClass,
    pub language: Option<LanguageId>,
    pub size_bytes: u64,
}

pub struct FileDiscovery {
    config: IndexingConfig,
}

impl FileDiscovery {
    pub fn new(config: IndexingConfig) -> Self {
        Self { config }
    }

    /// Discover indexable files under `repo_path`. When `changed` is given,
    /// only those relative paths are considered (incremental mode).
    pub fn discover_files(
        &self,
        repo_path: &Path,
        changed: Option<&[String]>,
    ) -> Vec<DiscoveredFile> {
        let mut files = Vec::new();

        if let Some(changed) = changed {
            for rel in changed {
                let abs = repo_path.join(rel);
                if !abs.is_file() {
                    continue;
                }
                if let Some(file) = self.classify(repo_path, &abs) {
                    files.push(file);
                }
            }
        } else {
            let walker = WalkDir::new(repo_path).into_iter().filter_entry(|entry| {
                if entry.file_type().is_dir() {
                    let name = entry.file_name().to_string_lossy();
                    return !self.config.excluded_dirs.iter().any(|d| d == name.as_ref())
                        && !name.starts_with('.');
                }
                true
            });

            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(file) = self.classify(repo_path, entry.path()) {
                    files.push(file);
                }
            }
        }

        // Stable sort on path: deterministic batches per invocation
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        files
    }

    fn classify(&self, repo_path: &Path, abs_path: &Path) -> Option<DiscoveredFile> {
        let rel_path = abs_path
            .strip_prefix(repo_path)
            .ok()?
            .to_string_lossy()
            .replace('\\', "/");

        let ext = abs_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if self.config.excluded_extensions.iter().any(|e| *e == ext) {
            return None;
        }

        let metadata = fs::metadata(abs_path).ok()?;
        let size_bytes = metadata.len();

        let language = LanguageId::from_file_path(&rel_path);
        let class = if language.is_some() {
            FileClass::Code
        } else if matches!(ext.as_str(), ".md" | ".rst" | ".txt") {
            FileClass::Document
        } else {
            return None;
        };

        let size_limit_mb = match class {
            FileClass::Code => self.config.max_code_file_size_mb,
            FileClass::Document => self.config.max_document_file_size_mb,
        };
        if size_bytes > size_limit_mb * 1024 * 1024 {
            tracing::debug!(file = %rel_path, size_bytes, "file_rejected_size");
            return None;
        }

        if is_binary(abs_path) {
            tracing::debug!(file = %rel_path, "file_rejected_binary");
            return None;
        }

        Some(DiscoveredFile {
            rel_path,
            abs_path: abs_path.to_path_buf(),
            class,
            language,
            size_bytes,
        })
    }

    /// Per-language counts and total size, recorded into result metadata
    pub fn file_stats(&self, files: &[DiscoveredFile]) -> serde_json::Value {
        let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
        let mut total_bytes = 0u64;
        let mut documents = 0usize;

        for file in files {
            total_bytes += file.size_bytes;
            match file.class {
                FileClass::Code => {
                    let lang = file.language.map(|l| l.name()).unwrap_or("unknown");
                    *by_language.entry(lang).or_insert(0) += 1;
                }
                FileClass::Document => documents += 1,
            }
        }

        json!({
            "total_files": files.len(),
            "documents": documents,
            "by_language": by_language,
            "total_bytes": total_bytes,
        })
    }
}

/// NUL byte in the first 512 bytes means binary
fn is_binary(path: &Path) -> bool {
    let mut buf = [0u8; BINARY_PROBE_BYTES];
    match fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => buf[..n].contains(&0),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn test_discovery_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "b.py", b"x = 1\n");
        write_file(tmp.path(), "a.py", b"y = 2\n");
        write_file(tmp.path(), "node_modules/dep.py", b"z = 3\n");
        write_file(tmp.path(), "image.png", b"not checked");

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);

        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_binary_probe_rejects_nul() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "bin.py", b"abc\x00def");
        write_file(tmp.path(), "ok.py", b"x = 1\n");

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["ok.py"]);
    }

    #[test]
    fn test_changed_files_mode() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "a.py", b"x = 1\n");
        write_file(tmp.path(), "b.py", b"y = 2\n");

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), Some(&["b.py".to_string()]));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "b.py");
    }

    #[test]
    fn test_documents_classified() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "README.md", b"# hi\n");

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].class, FileClass::Document);
    }

    #[test]
    fn test_file_stats() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "a.py", b"x = 1\n");
        write_file(tmp.path(), "b.ts", b"const y = 2;\n");

        let discovery = FileDiscovery::new(IndexingConfig::default());
        let files = discovery.discover_files(tmp.path(), None);
        let stats = discovery.file_stats(&files);
        assert_eq!(stats["total_files"], 2);
        assert_eq!(stats["by_language"]["python"], 1);
        assert_eq!(stats["by_language"]["typescript"], 1);
    }
}
