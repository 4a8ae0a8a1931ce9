//! Terminal output: bordered panels, markdown and highlighted code.
//!
//! Everything writes to a caller-supplied `Write` so output can be captured
//! in tests. Styling goes through crossterm commands.

use crate::theme::Theme;
use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use lazy_static::lazy_static;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::io::{self, Write};
use syntect::{
    easy::HighlightLines,
    highlighting::ThemeSet,
    parsing::SyntaxSet,
    util::LinesWithEndings,
};

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEME_SET: ThemeSet = ThemeSet::load_defaults();
}

const MIN_WIDTH: usize = 40;
const MAX_WIDTH: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpanStyle {
    pub fg: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle::default(),
        }
    }

    pub fn colored(text: impl Into<String>, fg: Color) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle {
                fg: Some(fg),
                ..SpanStyle::default()
            },
        }
    }

    fn width(&self) -> usize {
        self.text.chars().count()
    }
}

/// One output row made of styled spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line(pub Vec<Span>);

impl Line {
    pub fn plain(text: impl Into<String>) -> Self {
        Self(vec![Span::plain(text)])
    }

    pub fn text(&self) -> String {
        self.0.iter().map(|s| s.text.as_str()).collect()
    }

    fn width(&self) -> usize {
        self.0.iter().map(Span::width).sum()
    }

    fn push(&mut self, span: Span) {
        if span.text.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(last) if last.style == span.style => last.text.push_str(&span.text),
            _ => self.0.push(span),
        }
    }
}

pub struct Renderer {
    theme: Theme,
    width: usize,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        let width = crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(80);
        Self::with_width(theme, width)
    }

    pub fn with_width(theme: Theme, width: usize) -> Self {
        Self {
            theme,
            width: width.clamp(MIN_WIDTH, MAX_WIDTH),
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    fn inner_width(&self) -> usize {
        self.width - 4
    }

    // ── Panels ───────────────────────────────────────────────────────────

    pub fn user(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        let lines: Vec<Line> = text.lines().map(Line::plain).collect();
        self.panel(out, "You", self.theme.user_color, &lines)
    }

    pub fn assistant(&self, out: &mut impl Write, text: &str, model: &str) -> io::Result<()> {
        let lines = self.markdown(text);
        self.panel(out, &format!("Assistant · {model}"), self.theme.assistant_color, &lines)
    }

    pub fn system(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        let lines: Vec<Line> = text.lines().map(Line::plain).collect();
        self.panel(out, "System", self.theme.system_color, &lines)
    }

    pub fn error(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        let lines: Vec<Line> = text
            .lines()
            .map(|l| Line(vec![Span::colored(l, self.theme.error)]))
            .collect();
        self.panel(out, "Error", self.theme.error, &lines)
    }

    /// A titled panel around pre-built lines.
    pub fn lines(&self, out: &mut impl Write, title: &str, lines: &[Line]) -> io::Result<()> {
        self.panel(out, title, self.theme.accent, lines)
    }

    pub fn code(&self, out: &mut impl Write, code: &str, language: &str) -> io::Result<()> {
        let lines = self.highlight(code, language);
        self.panel(out, language, self.theme.code_color, &lines)
    }

    fn panel(&self, out: &mut impl Write, title: &str, color: Color, lines: &[Line]) -> io::Result<()> {
        let inner = self.inner_width();
        let title: String = title.chars().take(inner.saturating_sub(2)).collect();
        let fill = (inner + 2).saturating_sub(title.chars().count() + 3);

        queue!(
            out,
            SetForegroundColor(color),
            Print("╭─ "),
            SetAttribute(Attribute::Bold),
            Print(&title),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(self.theme.border),
            Print(format!(" {}╮\n", "─".repeat(fill))),
        )?;

        for line in lines.iter().flat_map(|l| wrap(l, inner)) {
            queue!(out, SetForegroundColor(self.theme.border), Print("│ "), ResetColor)?;
            write_spans(out, &line, self.theme.fg)?;
            let pad = inner.saturating_sub(line.width());
            queue!(
                out,
                Print(" ".repeat(pad)),
                SetForegroundColor(self.theme.border),
                Print(" │\n"),
            )?;
        }

        queue!(
            out,
            SetForegroundColor(self.theme.border),
            Print(format!("╰{}╯\n", "─".repeat(inner + 2))),
            ResetColor,
        )?;
        out.flush()
    }

    /// A single muted line outside any panel.
    pub fn note(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        queue!(
            out,
            SetForegroundColor(self.theme.muted),
            Print(format!("{text}\n")),
            ResetColor,
        )?;
        out.flush()
    }

    // ── Streaming ────────────────────────────────────────────────────────

    pub fn stream_start(&self, out: &mut impl Write, model: &str) -> io::Result<()> {
        queue!(
            out,
            SetForegroundColor(self.theme.assistant_color),
            SetAttribute(Attribute::Bold),
            Print(format!("● Assistant · {model}\n")),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(self.theme.fg),
        )?;
        out.flush()
    }

    pub fn stream_delta(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        queue!(out, Print(text))?;
        out.flush()
    }

    pub fn stream_end(&self, out: &mut impl Write) -> io::Result<()> {
        queue!(out, ResetColor, Print("\n\n"))?;
        out.flush()
    }

    // ── Markdown and code ────────────────────────────────────────────────

    /// Render markdown into styled lines. Fenced code is syntax highlighted.
    pub fn markdown(&self, text: &str) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut current = Line::default();
        let mut stack: Vec<Tag> = Vec::new();
        let mut lists: Vec<Option<u64>> = Vec::new();
        let mut code: Option<(String, String)> = None;

        let flush = |current: &mut Line, lines: &mut Vec<Line>| {
            if !current.0.is_empty() {
                lines.push(std::mem::take(current));
            }
        };

        for event in Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES) {
            match event {
                Event::Start(tag) => {
                    match &tag {
                        Tag::CodeBlock(kind) => {
                            flush(&mut current, &mut lines);
                            let lang = match kind {
                                CodeBlockKind::Fenced(lang) => lang.to_string(),
                                CodeBlockKind::Indented => String::new(),
                            };
                            code = Some((lang, String::new()));
                        }
                        Tag::List(start) => {
                            flush(&mut current, &mut lines);
                            lists.push(*start);
                        }
                        Tag::Item => {
                            flush(&mut current, &mut lines);
                            let indent = "  ".repeat(lists.len().saturating_sub(1));
                            let bullet = match lists.last_mut() {
                                Some(Some(n)) => {
                                    let b = format!("{n}. ");
                                    *n += 1;
                                    b
                                }
                                _ => "• ".to_string(),
                            };
                            current.push(Span::plain(indent));
                            current.push(Span::colored(bullet, self.theme.accent));
                        }
                        Tag::Heading { .. } | Tag::Paragraph | Tag::BlockQuote(_) => {
                            flush(&mut current, &mut lines);
                            if quote_depth(&stack) > 0 || matches!(tag, Tag::BlockQuote(_)) {
                                let depth = quote_depth(&stack) + usize::from(matches!(tag, Tag::BlockQuote(_)));
                                current.push(Span::colored("▎ ".repeat(depth), self.theme.muted));
                            }
                        }
                        _ => {}
                    }
                    stack.push(tag);
                }
                Event::End(end) => {
                    stack.pop();
                    match end {
                        TagEnd::CodeBlock => {
                            if let Some((lang, body)) = code.take() {
                                lines.extend(self.highlight(&body, &lang));
                                lines.push(Line::default());
                            }
                        }
                        TagEnd::List(_) => {
                            lists.pop();
                            if lists.is_empty() {
                                lines.push(Line::default());
                            }
                        }
                        TagEnd::Paragraph | TagEnd::Heading(_) => {
                            flush(&mut current, &mut lines);
                            if lists.is_empty() {
                                lines.push(Line::default());
                            }
                        }
                        TagEnd::Item => flush(&mut current, &mut lines),
                        _ => {}
                    }
                }
                Event::Text(t) => match code.as_mut() {
                    Some((_, body)) => body.push_str(&t),
                    None => current.push(Span {
                        text: t.to_string(),
                        style: self.inline_style(&stack),
                    }),
                },
                Event::Code(t) => current.push(Span::colored(format!("`{t}`"), self.theme.warning)),
                Event::SoftBreak => current.push(Span::plain(" ")),
                Event::HardBreak => flush(&mut current, &mut lines),
                Event::Rule => {
                    flush(&mut current, &mut lines);
                    lines.push(Line(vec![Span::colored(
                        "─".repeat(self.inner_width()),
                        self.theme.muted,
                    )]));
                }
                Event::TaskListMarker(done) => {
                    current.push(Span::plain(if done { "[x] " } else { "[ ] " }))
                }
                _ => {}
            }
        }
        flush(&mut current, &mut lines);
        while lines.last().is_some_and(|l| l.0.is_empty()) {
            lines.pop();
        }
        lines
    }

    fn inline_style(&self, stack: &[Tag]) -> SpanStyle {
        let mut style = SpanStyle::default();
        for tag in stack {
            match tag {
                Tag::Heading { level, .. } => {
                    style.bold = true;
                    style.fg = Some(if *level == HeadingLevel::H1 {
                        self.theme.accent
                    } else {
                        self.theme.assistant_color
                    });
                }
                Tag::Strong => style.bold = true,
                Tag::Emphasis => style.italic = true,
                Tag::Link { .. } => {
                    style.underline = true;
                    style.fg = Some(self.theme.accent);
                }
                Tag::BlockQuote(_) => style.fg = Some(self.theme.muted),
                _ => {}
            }
        }
        style
    }

    /// Highlight `code` with syntect. Unknown languages fall back to plain text.
    pub fn highlight(&self, code: &str, language: &str) -> Vec<Line> {
        let syntax = SYNTAX_SET
            .find_syntax_by_token(language.trim())
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
        let Some(theme) = THEME_SET
            .themes
            .get(self.theme.syntax_theme)
            .or_else(|| THEME_SET.themes.values().next())
        else {
            return code.lines().map(Line::plain).collect();
        };

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines = Vec::new();
        for source in LinesWithEndings::from(code) {
            let mut line = Line::default();
            match highlighter.highlight_line(source, &SYNTAX_SET) {
                Ok(ranges) => {
                    for (style, text) in ranges {
                        let fg = style.foreground;
                        line.push(Span::colored(
                            text.trim_end_matches(['\n', '\r']),
                            Color::Rgb { r: fg.r, g: fg.g, b: fg.b },
                        ));
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "highlighting failed");
                    line.push(Span::plain(source.trim_end_matches(['\n', '\r'])));
                }
            }
            lines.push(line);
        }
        lines
    }
}

fn quote_depth(stack: &[Tag]) -> usize {
    stack.iter().filter(|t| matches!(t, Tag::BlockQuote(_))).count()
}

fn write_spans(out: &mut impl Write, line: &Line, default_fg: Color) -> io::Result<()> {
    for span in &line.0 {
        queue!(out, SetForegroundColor(span.style.fg.unwrap_or(default_fg)))?;
        if span.style.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if span.style.italic {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if span.style.underline {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        queue!(out, Print(&span.text), SetAttribute(Attribute::Reset))?;
    }
    Ok(())
}

/// Break a line into rows of at most `width` characters, preferring spaces.
pub fn wrap(line: &Line, width: usize) -> Vec<Line> {
    if line.width() <= width {
        return vec![line.clone()];
    }

    let mut rows = Vec::new();
    let mut row = Line::default();
    let mut used = 0;

    for span in &line.0 {
        for word in span.text.split_inclusive(' ') {
            let mut word = word.to_string();
            let mut len = word.chars().count();

            if used + len > width && used > 0 {
                rows.push(std::mem::take(&mut row));
                used = 0;
            }
            while len > width {
                let head: String = word.chars().take(width - used).collect();
                let tail: String = word.chars().skip(width - used).collect();
                row.push(Span {
                    text: head,
                    style: span.style,
                });
                rows.push(std::mem::take(&mut row));
                used = 0;
                word = tail;
                len = word.chars().count();
            }
            if !word.is_empty() {
                used += len;
                row.push(Span {
                    text: word,
                    style: span.style,
                });
            }
        }
    }
    if !row.0.is_empty() {
        rows.push(row);
    }
    rows
}
