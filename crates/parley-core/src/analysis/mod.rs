mod linter;

pub use linter::{CodeAnalysis, CodeMetrics, Issue, Language, Linter, Severity};
