//! Data Flow Graph (DFG)
//!
//! Variables, read/write events, and value-flow edges, built from the
//! Expression IR. This feature never touches the AST; expressions already
//! carry the reads/defines information.

pub mod builder;
pub mod models;
pub mod resolver;

pub use builder::{DfgBuildOutput, DfgBuilder, DfgMetrics};
pub use models::{
    DataFlowEdge, DataFlowEdgeKind, DfgSnapshot, EventKind, ScopeKind, VariableEntity,
    VariableEvent, VariableKind,
};
pub use resolver::{resolve_or_create_variable, DfgContext, VarResolverState};
