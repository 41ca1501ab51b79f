//! Semantic IR feature
//!
//! Layers types, signatures, BFG, CFG, expressions, and (via the data_flow
//! feature) DFG on top of the structural IR.

pub mod bfg;
pub mod builder;
pub mod cfg;
pub mod expression;
pub mod signature;
pub mod types;

pub use builder::{SemanticIndex, SemanticIrBuilder, SemanticIrSnapshot};
