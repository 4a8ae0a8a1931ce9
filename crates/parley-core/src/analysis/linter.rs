use regex::Regex;
use std::fmt;

#[derive(Debug, Clone)]
pub struct CodeAnalysis {
    pub language: Language,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub metrics: CodeMetrics,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Default)]
pub struct CodeMetrics {
    pub lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
    pub characters: usize,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: Vec<String>,
    pub complexity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    Html,
    Sql,
    Text,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "rs" | "rust" => Self::Rust,
            "py" | "python" => Self::Python,
            "js" | "jsx" | "javascript" => Self::JavaScript,
            "ts" | "tsx" | "typescript" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "hpp" | "c++" => Self::Cpp,
            "html" | "htm" => Self::Html,
            "sql" => Self::Sql,
            _ => Self::Text,
        }
    }

    /// Guess the language from the first lines of a snippet.
    pub fn detect(code: &str) -> Self {
        let head: Vec<&str> = code.trim().lines().take(10).collect();
        let any = |pred: &dyn Fn(&str) -> bool| head.iter().any(|l| pred(l));

        if any(&|l| {
            l.starts_with("fn ")
                || l.starts_with("pub fn ")
                || l.starts_with("use ")
                || l.contains("let mut ")
                || l.starts_with("impl ")
        }) {
            return Self::Rust;
        }
        if any(&|l| l.starts_with("package ") || l.starts_with("func ")) {
            return Self::Go;
        }
        if any(&|l| {
            l.starts_with("def ")
                || l.starts_with("class ") && l.trim_end().ends_with(':')
                || l.starts_with("import ") && !l.contains(" from ")
                || l.starts_with("from ") && l.contains(" import ")
        }) {
            return Self::Python;
        }
        if any(&|l| l.contains("public class ") || l.contains("public static void main")) {
            return Self::Java;
        }
        if any(&|l| {
            l.contains("function ")
                || l.contains("const ")
                || l.contains("let ")
                || l.contains("var ")
                || l.contains("=>")
                || l.starts_with("import ")
        }) {
            if any(&|l| l.contains("interface ") || l.starts_with("type ") || l.contains(": string")) {
                return Self::TypeScript;
            }
            return Self::JavaScript;
        }
        if any(&|l| l.contains("#include") || l.contains("int main(")) {
            if code.contains("cout") || code.contains("std::") || code.contains("class ") {
                return Self::Cpp;
            }
            return Self::C;
        }
        if head.iter().take(5).any(|l| {
            let t = l.trim();
            t.starts_with('<') && t.ends_with('>')
        }) {
            return Self::Html;
        }
        if head.iter().take(5).any(|l| {
            let upper = l.trim().to_ascii_uppercase();
            ["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP"]
                .iter()
                .any(|kw| upper.starts_with(kw))
        }) {
            return Self::Sql;
        }
        Self::Text
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "Rust",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Go => "Go",
            Self::Java => "Java",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Html => "HTML",
            Self::Sql => "SQL",
            Self::Text => "Text",
        }
    }

    /// File extension used to look up a syntax definition.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Rust => "rs",
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Html => "html",
            Self::Sql => "sql",
            Self::Text => "txt",
        }
    }

    fn line_comment(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["#"],
            Self::Sql => &["--"],
            Self::Html => &["<!--"],
            Self::Text => &[],
            _ => &["//", "/*", "*"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Linter;

impl Linter {
    /// Analyze a snippet, detecting its language when `language` is `None`.
    pub fn analyze(code: &str, language: Option<Language>) -> CodeAnalysis {
        let language = language.unwrap_or_else(|| Language::detect(code));
        let mut issues = Vec::new();

        match language {
            Language::Rust => Self::analyze_rust(code, &mut issues),
            Language::Python => Self::analyze_python(code, &mut issues),
            Language::JavaScript | Language::TypeScript => {
                Self::analyze_javascript(code, &mut issues)
            }
            _ => {}
        }
        Self::analyze_generic(code, &mut issues);

        let metrics = Self::metrics(code, language);
        let suggestions = Self::suggest(code, language, &metrics);

        CodeAnalysis {
            language,
            issues,
            suggestions,
            metrics,
        }
    }

    fn metrics(code: &str, language: Language) -> CodeMetrics {
        let comment_prefixes = language.line_comment();
        let (functions, classes, imports) = match language {
            Language::Rust => (
                captures(r"\bfn\s+(\w+)", code),
                captures(r"\b(?:struct|enum|trait)\s+(\w+)", code),
                captures(r"(?m)^\s*use\s+([^;]+);", code),
            ),
            Language::Python => (
                captures(r"(?m)^\s*(?:async\s+)?def\s+(\w+)", code),
                captures(r"(?m)^\s*class\s+(\w+)", code),
                captures(r"(?m)^\s*((?:from\s+\S+\s+)?import\s+.+)$", code),
            ),
            Language::JavaScript | Language::TypeScript => {
                let mut fns = captures(r"function\s+(\w+)\s*\(", code);
                fns.extend(captures(r"(\w+)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>", code));
                (
                    fns,
                    captures(r"\bclass\s+(\w+)", code),
                    captures(r#"import\s+.*?from\s+['"]([^'"]+)['"]"#, code),
                )
            }
            Language::Go => (
                captures(r"(?m)^func\s+(?:\([^)]*\)\s*)?(\w+)", code),
                captures(r"(?m)^type\s+(\w+)\s+struct", code),
                captures(r#""([\w./-]+)""#, code)
                    .into_iter()
                    .filter(|_| code.contains("import"))
                    .collect(),
            ),
            Language::Java => (
                captures(
                    r"(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\]]+\s+(\w+)\s*\(",
                    code,
                ),
                captures(r"\bclass\s+(\w+)", code),
                captures(r"import\s+(.+?);", code),
            ),
            Language::C | Language::Cpp => (
                captures(
                    r"(?m)^\s*(?:int|void|double|float|char|bool|string|auto)\s+(\w+)\s*\(",
                    code,
                ),
                captures(r"\bclass\s+(\w+)", code),
                captures(r#"#include\s*[<"]([^>"]+)[>"]"#, code),
            ),
            _ => (Vec::new(), Vec::new(), Vec::new()),
        };

        CodeMetrics {
            lines: code.lines().count(),
            blank_lines: code.lines().filter(|l| l.trim().is_empty()).count(),
            comment_lines: code
                .lines()
                .filter(|l| {
                    let t = l.trim_start();
                    comment_prefixes.iter().any(|p| t.starts_with(p))
                })
                .count(),
            characters: code.chars().count(),
            functions,
            classes,
            imports,
            complexity: Self::calculate_complexity(code),
        }
    }

    fn analyze_rust(code: &str, issues: &mut Vec<Issue>) {
        for (line_num, line) in code.lines().enumerate() {
            if line.contains(".unwrap()") {
                issues.push(Issue {
                    line: line_num + 1,
                    severity: Severity::Warning,
                    message: "unwrap() without error handling; prefer ? or unwrap_or_else".into(),
                });
            }
        }
    }

    fn analyze_python(code: &str, issues: &mut Vec<Issue>) {
        let Ok(bare_except) = Regex::new(r"except\s*:") else {
            return;
        };
        for (line_num, line) in code.lines().enumerate() {
            if bare_except.is_match(line) {
                issues.push(Issue {
                    line: line_num + 1,
                    severity: Severity::Warning,
                    message: "Bare except clause catches all exceptions".into(),
                });
            }
        }
    }

    fn analyze_javascript(code: &str, issues: &mut Vec<Issue>) {
        let Ok(var_re) = Regex::new(r"\bvar\s+") else {
            return;
        };
        for (line_num, line) in code.lines().enumerate() {
            if var_re.is_match(line) {
                issues.push(Issue {
                    line: line_num + 1,
                    severity: Severity::Warning,
                    message: "Using 'var' instead of 'let' or 'const'".into(),
                });
            }
        }
    }

    fn analyze_generic(code: &str, issues: &mut Vec<Issue>) {
        let marker = Regex::new(r"(?i)\b(TODO|FIXME|HACK)\b").ok();
        for (line_num, line) in code.lines().enumerate() {
            if marker.as_ref().is_some_and(|re| re.is_match(line)) {
                issues.push(Issue {
                    line: line_num + 1,
                    severity: Severity::Info,
                    message: "TODO/FIXME comment found".into(),
                });
            }
            let width = line.chars().count();
            if width > 120 {
                issues.push(Issue {
                    line: line_num + 1,
                    severity: Severity::Info,
                    message: format!("Line is too long ({width} characters)"),
                });
            }
        }
    }

    /// Branch points plus one, counted per keyword occurrence.
    fn calculate_complexity(code: &str) -> usize {
        let Ok(branch) = Regex::new(
            r"\b(?:if|elif|else if|for|while|match|case|catch|except)\b|&&|\|\||\band\b|\bor\b",
        ) else {
            return 1;
        };
        1 + code
            .lines()
            .map(|line| branch.find_iter(line).count())
            .sum::<usize>()
    }

    fn suggest(code: &str, language: Language, metrics: &CodeMetrics) -> Vec<String> {
        let mut suggestions = Vec::new();

        if metrics.complexity > 10 {
            suggestions.push(
                "Consider breaking complex functions into smaller, more manageable pieces".into(),
            );
        }
        if metrics.lines > 100 {
            suggestions
                .push("Code is quite long; consider splitting it into several functions or files".into());
        }
        if metrics.functions.len() > 20 {
            suggestions.push("Many functions detected; consider organizing them into modules".into());
        }

        match language {
            Language::Python => {
                if code.contains("import *") {
                    suggestions.push("Avoid wildcard imports; import specific names instead".into());
                }
                if metrics.functions.is_empty() && metrics.lines > 10 {
                    suggestions.push("Consider adding a main function or entry point".into());
                }
            }
            Language::JavaScript | Language::TypeScript => {
                if code.contains("var ") {
                    suggestions.push("Use 'const' or 'let' instead of 'var' for better scoping".into());
                }
                if code.contains("function ") && code.contains("=>") {
                    suggestions.push(
                        "Consider consistent function syntax (traditional or arrow functions)".into(),
                    );
                }
            }
            Language::Rust => {
                if code.contains(".unwrap()") {
                    suggestions.push("Propagate errors with ? instead of unwrap()".into());
                }
            }
            _ => {}
        }

        if suggestions.is_empty() {
            suggestions.push("Code looks well-structured. No major improvements needed.".into());
        }
        suggestions
    }
}

/// First capture group of every match.
fn captures(pattern: &str, code: &str) -> Vec<String> {
    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };
    re.captures_iter(code)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}
