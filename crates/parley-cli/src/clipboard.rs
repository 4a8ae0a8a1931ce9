use anyhow::{Context, Result};

/// Put `text` on the system clipboard.
pub fn copy(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard
        .set_text(text.to_string())
        .context("failed to write to the clipboard")?;
    tracing::debug!(chars = text.chars().count(), "copied to clipboard");
    Ok(())
}

/// Whether a clipboard can be opened at all (headless sessions often lack one).
pub fn available() -> bool {
    arboard::Clipboard::new().is_ok()
}
