//! Chunking feature
//!
//! Partitions code into semantically addressable chunks with stable IDs.

pub mod builder;
pub mod chunk;
pub mod id_generator;
pub mod incremental;
pub mod merger;
pub mod overlay;
pub mod ports;

pub use builder::{ChunkBuildOutput, ChunkBuilder};
pub use chunk::{Chunk, ChunkKind};
pub use id_generator::{ChunkIdContext, ChunkIdGenerator};
pub use incremental::{ChunkDelta, ChunkIncrementalRefresher};
pub use merger::ChunkMerger;
pub use overlay::OverlayStore;
pub use ports::ChunkStore;
