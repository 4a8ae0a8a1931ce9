use super::model::Session;
use crate::error::{ParleyError, Result};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full fidelity; can be imported again.
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ParleyError::validation(format!(
                "unknown export format '{other}' (expected json, markdown or text)"
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

pub fn render(session: &Session, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(session)?),
        ExportFormat::Markdown => Ok(to_markdown(session)),
        ExportFormat::Text => Ok(to_text(session)),
    }
}

fn to_markdown(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", session.title);
    let _ = writeln!(out, "**Session ID:** {}  ", session.id);
    let _ = writeln!(out, "**Provider:** {}  ", session.provider);
    let _ = writeln!(out, "**Model:** {}  ", session.model);
    let _ = writeln!(out, "**Created:** {}  ", session.created_at.to_rfc3339());
    let _ = writeln!(out, "**Updated:** {}\n", session.updated_at.to_rfc3339());

    for (branch, _) in session.tree() {
        let marker = if branch.id == session.active_branch_id { " (active)" } else { "" };
        let _ = writeln!(out, "## Branch: {}{marker}\n", branch.title);
        if let Some(parent) = branch.parent_id.as_ref().and_then(|p| session.branches.get(p)) {
            let _ = writeln!(out, "_Forked from {}._\n", parent.title);
        }
        if branch.messages.is_empty() {
            out.push_str("_No messages._\n\n");
        }
        for msg in &branch.messages {
            let _ = writeln!(
                out,
                "### {} ({})\n\n{}\n\n---\n",
                msg.role.label(),
                msg.timestamp.format("%Y-%m-%d %H:%M:%S"),
                msg.content
            );
        }
    }
    out
}

fn to_text(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", session.title);
    let _ = writeln!(out, "Session ID: {}", session.id);
    let _ = writeln!(out, "Provider: {}", session.provider);
    let _ = writeln!(out, "Model: {}", session.model);
    let _ = writeln!(out, "Updated: {}\n", session.updated_at.to_rfc3339());

    for (branch, depth) in session.tree() {
        let _ = writeln!(out, "{}[{}]", "  ".repeat(depth), branch.title);
        for msg in &branch.messages {
            let _ = writeln!(out, "{}: {}", msg.role.label(), msg.content);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, ProviderId};

    #[test]
    fn test_parse_formats() {
        assert_eq!(ExportFormat::parse("MD").unwrap(), ExportFormat::Markdown);
        assert_eq!(ExportFormat::parse("txt").unwrap(), ExportFormat::Text);
        assert!(matches!(
            ExportFormat::parse("pdf"),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_markdown_and_text_are_deterministic() {
        let mut session = Session::new(ProviderId::OpenAI, "gpt-4o");
        session.append(Message::user("hello")).unwrap();
        session.append(Message::assistant("hi there")).unwrap();

        let md = render(&session, ExportFormat::Markdown).unwrap();
        assert_eq!(md, render(&session, ExportFormat::Markdown).unwrap());
        assert!(md.contains("## Branch: main (active)"));
        assert!(md.contains("### User"));
        assert!(md.contains("hi there"));

        let text = render(&session, ExportFormat::Text).unwrap();
        assert!(text.contains("User: hello"));
        assert!(text.contains("Assistant: hi there"));
    }
}
