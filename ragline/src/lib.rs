//! ragline - Knowledge-base retrieval for grounding a voice agent
//!
//! This is the convenience wrapper crate that re-exports the core pipeline
//! and the tool abstraction the agent calls through.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! ragline = "0.1"
//! ```

// Re-export core
pub use ragline_core::*;
pub use ragline_tool;

/// Prelude module for convenient imports
pub mod prelude {
    pub use ragline_core::config::Config;
    pub use ragline_core::rag::{
        ContextCache, IngestSummary, RagEngine, Retrieval, RetrieveOptions, NO_CONTEXT,
    };
    pub use ragline_core::tool::KnowledgeBaseTool;
    pub use ragline_tool::{Tool, ToolOutput, ToolRegistry};
}
