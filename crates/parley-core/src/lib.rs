pub mod analysis;
pub mod chat;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod llm;
pub mod session;
pub mod storage;

// Re-export key types
pub use chat::{ChatEngine, ChatEvent};
pub use config::Settings;
pub use context::{Context, ContextManager, ContextStats, Memory, MemoryKind, NewMemory};
pub use error::{ParleyError, ProviderError, Result};
pub use llm::{LlmClient, LlmResponse, Message, ProviderId, ProviderRegistry, Role, StreamEvent};
pub use session::{
    Branch, BranchMatch, DeletePolicy, ExportFormat, MergeStrategy, Session, SessionStats,
    SessionStore, SessionSummary,
};
