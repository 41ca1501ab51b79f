//! Parsing feature
//!
//! Language plugins, the parser registry, and the thread-local parser pool.
//! Native tree-sitter parsers are not thread safe, so each worker thread
//! owns its parser instances.

pub mod plugins;
pub mod pool;
pub mod ports;
pub mod source;

pub use plugins::{PythonPlugin, TypeScriptPlugin};
pub use pool::parse_source;
pub use ports::{
    ControlFlowType, ExceptionHandlers, LanguageId, LanguagePlugin, ParserRegistry, SpanExt,
};
pub use source::{ParsedFile, SourceFile, SourceMap};
