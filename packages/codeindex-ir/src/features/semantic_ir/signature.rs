//! Signature IR
//!
//! Signatures are separate entities so interface changes can be detected
//! without diffing function bodies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::shared::models::{IRDocument, NodeKind};
use crate::shared::utils::content_hash;

/// Access control (language-specific mapping)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Internal,
}

/// Function/method signature entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEntity {
    /// e.g. `sig:repo:a.py:Svc.plan(Query,int)->Plan`
    pub id: String,
    /// Node.id of the owning Function/Method/Lambda
    pub owner_node_id: String,
    pub name: String,
    /// Signature string as written
    pub raw: String,
    pub parameter_type_ids: Vec<String>,
    pub return_type_id: Option<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub visibility: Option<Visibility>,
    pub throws_type_ids: Vec<String>,
    /// Hash of `raw`, used for interface change detection
    pub signature_hash: Option<String>,
}

impl SignatureEntity {
    pub fn compute_hash(raw: &str) -> String {
        content_hash::hash_text(raw)
    }
}

/// Index: function node id → signature id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureIndex {
    pub function_to_signature: HashMap<String, String>,
}

/// Builds the signature table and index from structural IR.
///
/// Signatures are emitted during IR building; this builder re-collects them
/// and (re)builds the lookup index.
pub struct SignatureIrBuilder;

impl SignatureIrBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build_full(&self, ir_doc: &IRDocument) -> (Vec<SignatureEntity>, SignatureIndex) {
        let signatures = ir_doc.signatures.clone();

        let mut index = SignatureIndex::default();
        for node in &ir_doc.nodes {
            if matches!(
                node.kind,
                NodeKind::Function | NodeKind::Method | NodeKind::Lambda
            ) {
                if let Some(sig_id) = &node.signature_id {
                    index
                        .function_to_signature
                        .insert(node.id.clone(), sig_id.clone());
                }
            }
        }

        (signatures, index)
    }

    /// Signature extraction is cheap, so the delta path is a full rebuild.
    pub fn apply_delta(&self, ir_doc: &IRDocument) -> (Vec<SignatureEntity>, SignatureIndex) {
        self.build_full(ir_doc)
    }
}
