//! Stable ID composition and parsing
//!
//! Node IDs encode their locator components so the same semantic entity
//! yields the same ID across re-indexing runs:
//!
//! - `func:{repo_id}:{file_path}:{func_name}:{start_line}`
//! - `method:{repo_id}:{file_path}:{class_name}:{method_name}:{start_line}`
//! - `class:{repo_id}:{file_path}:{class_name}:{start_line}`
//! - `lambda:{repo_id}:{file_path}:{start_line}`
//! - `file:{repo_id}:{file_path}`
//!
//! BFG block IDs mirror into CFG block IDs by prefix swap.

use crate::shared::models::{NodeKind, Span};

/// Compose a stable node ID
pub fn node_id(
    kind: NodeKind,
    repo_id: &str,
    file_path: &str,
    parent_name: Option<&str>,
    name: &str,
    span: &Span,
) -> String {
    let prefix = kind.id_prefix();
    match kind {
        NodeKind::File => format!("{}:{}:{}", prefix, repo_id, file_path),
        NodeKind::Module => format!("{}:{}:{}", prefix, repo_id, name),
        NodeKind::Lambda => format!("{}:{}:{}:{}", prefix, repo_id, file_path, span.start_line),
        NodeKind::Method => format!(
            "{}:{}:{}:{}:{}:{}",
            prefix,
            repo_id,
            file_path,
            parent_name.unwrap_or("_"),
            name,
            span.start_line
        ),
        _ => format!(
            "{}:{}:{}:{}:{}",
            prefix, repo_id, file_path, name, span.start_line
        ),
    }
}

/// Parsed components of a node ID
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNodeId {
    pub node_type: String,
    pub repo_id: String,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub parent_name: Option<String>,
    pub start_line: Option<u32>,
}

impl ParsedNodeId {
    pub fn is_valid(&self) -> bool {
        !self.node_type.is_empty() && !self.repo_id.is_empty() && !self.file_path.is_empty()
    }
}

/// Parse a node ID into its components. Returns None for malformed IDs.
pub fn parse_node_id(node_id: &str) -> Option<ParsedNodeId> {
    let parts: Vec<&str> = node_id.split(':').collect();
    if parts.len() < 3 {
        return None;
    }

    let node_type = parts[0].to_string();
    let repo_id = parts[1].to_string();
    let file_path = parts[2].to_string();

    let parsed = match (node_type.as_str(), parts.len()) {
        ("func" | "class" | "interface" | "var", n) if n >= 5 => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            symbol_name: Some(parts[3].to_string()),
            parent_name: None,
            start_line: parts[4].parse().ok(),
        },
        ("func" | "class" | "interface" | "var", 4) => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            symbol_name: Some(parts[3].to_string()),
            parent_name: None,
            start_line: None,
        },
        ("method", n) if n >= 6 => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            parent_name: Some(parts[3].to_string()),
            symbol_name: Some(parts[4].to_string()),
            start_line: parts[5].parse().ok(),
        },
        ("method", 5) => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            parent_name: Some(parts[3].to_string()),
            symbol_name: Some(parts[4].to_string()),
            start_line: None,
        },
        ("lambda", n) if n >= 4 => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            symbol_name: None,
            parent_name: None,
            start_line: parts[3].parse().ok(),
        },
        _ => ParsedNodeId {
            node_type,
            repo_id,
            file_path,
            symbol_name: None,
            parent_name: None,
            start_line: None,
        },
    };

    Some(parsed)
}

/// Extract the file path component of a node ID
pub fn extract_file_path(node_id: &str) -> Option<String> {
    parse_node_id(node_id).filter(|p| p.is_valid()).map(|p| p.file_path)
}

/// Convert a BFG block ID to its CFG counterpart
pub fn bfg_id_to_cfg_id(bfg_id: &str) -> String {
    if let Some(rest) = bfg_id.strip_prefix("bfg:") {
        format!("cfg:{}", rest)
    } else {
        format!("cfg:{}", bfg_id)
    }
}

/// Convert a CFG block ID back to its BFG counterpart
pub fn cfg_id_to_bfg_id(cfg_id: &str) -> String {
    if let Some(rest) = cfg_id.strip_prefix("cfg:") {
        format!("bfg:{}", rest)
    } else {
        format!("bfg:{}", cfg_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let span = Span::new(12, 0, 20, 0);
        let id = node_id(NodeKind::Function, "repo", "src/a.py", None, "run", &span);
        assert_eq!(id, "func:repo:src/a.py:run:12");

        let parsed = parse_node_id(&id).unwrap();
        assert_eq!(parsed.node_type, "func");
        assert_eq!(parsed.file_path, "src/a.py");
        assert_eq!(parsed.symbol_name.as_deref(), Some("run"));
        assert_eq!(parsed.start_line, Some(12));
    }

    #[test]
    fn test_method_id_includes_parent() {
        let span = Span::new(5, 0, 9, 0);
        let id = node_id(NodeKind::Method, "repo", "a.py", Some("Svc"), "call", &span);
        assert_eq!(id, "method:repo:a.py:Svc:call:5");

        let parsed = parse_node_id(&id).unwrap();
        assert_eq!(parsed.parent_name.as_deref(), Some("Svc"));
        assert_eq!(parsed.symbol_name.as_deref(), Some("call"));
    }

    #[test]
    fn test_bfg_cfg_conversion() {
        let bfg = "bfg:func:r:a.py:f:1:block:2";
        let cfg = bfg_id_to_cfg_id(bfg);
        assert_eq!(cfg, "cfg:func:r:a.py:f:1:block:2");
        assert_eq!(cfg_id_to_bfg_id(&cfg), bfg);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_node_id("garbage").is_none());
        assert!(parse_node_id("a:b").is_none());
    }

    #[test]
    fn test_extract_file_path() {
        assert_eq!(
            extract_file_path("func:r:src/m.py:f:3").as_deref(),
            Some("src/m.py")
        );
    }
}
