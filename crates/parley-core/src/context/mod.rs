mod export;
mod manager;
mod model;

pub use export::render as render_context;
pub use manager::{ContextManager, ContextStats};
pub use model::{Context, Memory, MemoryKind, MemoryMatch, NewMemory};
