//! Symbol graph feature

pub mod builder;
pub mod document;
pub mod ports;

pub use builder::GraphBuilder;
pub use document::GraphDocument;
pub use ports::{GraphStore, SaveMode};
