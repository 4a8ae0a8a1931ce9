use super::model::{Context, Memory};
use crate::error::Result;
use crate::session::ExportFormat;
use std::fmt::Write;

/// A context with its memories, most important first.
pub fn render(ctx: &Context, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(ctx)?),
        ExportFormat::Markdown => Ok(to_markdown(ctx)),
        ExportFormat::Text => Ok(to_text(ctx)),
    }
}

fn ranked(ctx: &Context) -> Vec<&Memory> {
    let mut memories: Vec<&Memory> = ctx.memories.iter().collect();
    memories.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    memories
}

fn to_markdown(ctx: &Context) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", ctx.name);
    let _ = writeln!(out, "**Description:** {}  ", ctx.description);
    let _ = writeln!(out, "**Context ID:** {}  ", ctx.id);
    let _ = writeln!(out, "**Created:** {}\n", ctx.created_at.to_rfc3339());
    if !ctx.tags.is_empty() {
        let tags: Vec<String> = ctx.tags.iter().map(|t| format!("`{t}`")).collect();
        let _ = writeln!(out, "**Tags:** {}\n", tags.join(", "));
    }

    out.push_str("## Memories\n\n");
    if ctx.memories.is_empty() {
        out.push_str("_No memories._\n");
    }
    for memory in ranked(ctx) {
        let _ = write!(
            out,
            "- **{}** ({:.2}) {}",
            memory.kind, memory.importance, memory.content
        );
        for tag in &memory.tags {
            let _ = write!(out, " `#{tag}`");
        }
        out.push('\n');
    }
    out
}

fn to_text(ctx: &Context) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", ctx.name);
    let _ = writeln!(out, "{}", ctx.description);
    let _ = writeln!(out, "Context ID: {}", ctx.id);
    let _ = writeln!(out, "Created: {}", ctx.created_at.to_rfc3339());
    let tags: Vec<&str> = ctx.tags.iter().map(String::as_str).collect();
    let _ = writeln!(out, "Tags: {}\n", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });

    for memory in ranked(ctx) {
        let _ = writeln!(
            out,
            "[{}] {:.2} {}",
            memory.kind, memory.importance, memory.content
        );
    }
    out
}
