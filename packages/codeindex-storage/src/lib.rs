//! Codeindex storage
//!
//! Implementations of the store ports:
//! - in-memory graph and chunk stores (tests, single-process runs)
//! - in-memory recording index fakes for the fan-out ports
//! - SQLite-backed job and progress stores that survive process restart

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{
    MemoryChunkStore, MemoryGraphStore, RecordingDomainIndex, RecordingEmbeddingQueue,
    RecordingFuzzyIndex, RecordingLexicalIndex, RecordingSymbolIndex, RecordingVectorIndex,
};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteJobStore, SqliteProgressStore};
