//! Multi-index ports

pub mod ports;

pub use ports::{
    DomainIndex, EmbeddingQueue, ExternalTypeAnalyzer, FuzzyIndex, HoverInfo, IndexDoc,
    LexicalDeltaIndex, LexicalIndex, SearchHit, SymbolDefinition, SymbolIndex, VectorDoc,
    VectorIndex,
};
