mod branch;
mod export;
mod model;
mod store;

pub use branch::{BranchMatch, BranchTree, DeletePolicy, MergeStrategy, SessionStats};
pub use export::{render as render_export, ExportFormat};
pub use model::{Branch, Session, SessionSummary, UNTITLED};
pub use store::SessionStore;
