/*
 * Codeindex IR - code-aware indexing engine core
 *
 * Feature-First Architecture:
 * - shared/      : Common models (Node, Edge, Span, IRDocument)
 * - features/    : Vertical slices (parsing → ir → semantic_ir → data_flow
 *                  → graph → chunking → edge_validation → impact → query)
 *
 * The crate is synchronous at its core; per-file fan-out uses Rayon.
 * Store and index ports are async traits consumed by the orchestration
 * crate.
 */

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::new_without_default)]

/// Shared models and utilities
pub mod shared;

/// Feature modules (pipeline stages)
pub mod features;

pub use shared::models::{
    Edge, EdgeAttrs, EdgeKind, IRDocument, IndexError, Node, NodeBuilder, NodeKind, Result, Span,
};
