use parley_core::{DeletePolicy, ExportFormat, MemoryKind, MergeStrategy, ParleyError};
use std::collections::BTreeSet;

type Result<T> = std::result::Result<T, ParleyError>;

/// Every slash command the REPL understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Clear,
    History,
    ToggleStream,
    Quit,
    Analyze(String),
    Highlight(String),
    Context(ContextCommand),
    Branch(BranchCommand),
    Memory(MemoryCommand),
    Save(Option<String>),
    Resume(String),
    ListSessions,
    Export {
        format: ExportFormat,
        session: Option<String>,
    },
    DeleteSession(String),
    SetProvider(String),
    SetModel(String),
    Models,
    Providers,
    Theme(Option<String>),
    Copy,
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextCommand {
    Create {
        name: String,
        description: String,
        tags: BTreeSet<String>,
    },
    Switch(String),
    Info,
    List,
    Delete(String),
    Export {
        format: ExportFormat,
        context: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchCommand {
    Create {
        title: String,
        parent: Option<String>,
    },
    Fork {
        title: Option<String>,
        from: Option<String>,
    },
    Switch(String),
    Tree,
    Info,
    Search(String),
    Merge {
        a: String,
        b: String,
        strategy: MergeStrategy,
    },
    Delete {
        branch: String,
        policy: DeletePolicy,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryCommand {
    Add {
        content: String,
        importance: f32,
        tags: BTreeSet<String>,
        kind: MemoryKind,
    },
    Search {
        query: String,
        context: Option<String>,
    },
    List,
    Delete(String),
}

/// Command names with their short aliases, in help order.
pub const COMMANDS: &[(&str, &[&str])] = &[
    ("/help", &["/h"]),
    ("/clear", &["/c"]),
    ("/history", &["/hist"]),
    ("/stream", &["/s"]),
    ("/quit", &["/q", "/exit", "/e"]),
    ("/analyze", &["/a"]),
    ("/highlight", &["/hl"]),
    ("/context", &["/ctx"]),
    ("/branch", &["/b"]),
    ("/memory", &["/mem"]),
    ("/save", &["/sv"]),
    ("/resume", &["/r"]),
    ("/list-sessions", &["/ls"]),
    ("/export", &["/exp"]),
    ("/delete-session", &["/del"]),
    ("/set-provider", &["/sp"]),
    ("/set-model", &["/sm"]),
    ("/models", &["/m"]),
    ("/providers", &["/p"]),
    ("/theme", &["/th"]),
    ("/copy", &["/cp"]),
    ("/stats", &["/st"]),
];

/// Parse one line of input. `Ok(None)` means it is a chat message.
pub fn parse_command(input: &str) -> Result<Option<Command>> {
    let input = input.trim();
    if !input.starts_with('/') {
        return Ok(None);
    }

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let Some(canonical) = canonical_name(name) else {
        return Err(ParleyError::UnknownCommand {
            command: name.to_string(),
            suggestion: suggest(name),
        });
    };
    tracing::debug!(command = canonical, "parsed command");

    let command = match canonical {
        "/help" => Command::Help,
        "/clear" => Command::Clear,
        "/history" => Command::History,
        "/stream" => Command::ToggleStream,
        "/quit" => Command::Quit,
        "/analyze" => Command::Analyze(required(rest, "/analyze <code>")?.to_string()),
        "/highlight" => Command::Highlight(required(rest, "/highlight <code>")?.to_string()),
        "/context" => Command::Context(parse_context(rest)?),
        "/branch" => Command::Branch(parse_branch(rest)?),
        "/memory" => Command::Memory(parse_memory(rest)?),
        "/save" => Command::Save(non_empty(rest)),
        "/resume" => Command::Resume(required(rest, "/resume <session-id>")?.to_string()),
        "/list-sessions" => Command::ListSessions,
        "/export" => {
            let args = split_args(rest)?;
            let format = match args.first() {
                Some(f) => ExportFormat::parse(f)?,
                None => return Err(usage("/export <json|markdown|text> [session-id]")),
            };
            Command::Export {
                format,
                session: args.get(1).cloned(),
            }
        }
        "/delete-session" => {
            Command::DeleteSession(required(rest, "/delete-session <session-id>")?.to_string())
        }
        "/set-provider" => {
            Command::SetProvider(required(rest, "/set-provider <openai|anthropic>")?.to_string())
        }
        "/set-model" => Command::SetModel(required(rest, "/set-model <model>")?.to_string()),
        "/models" => Command::Models,
        "/providers" => Command::Providers,
        "/theme" => Command::Theme(non_empty(rest)),
        "/copy" => Command::Copy,
        "/stats" => Command::Stats,
        other => {
            return Err(ParleyError::UnknownCommand {
                command: other.to_string(),
                suggestion: None,
            })
        }
    };
    Ok(Some(command))
}

fn canonical_name(name: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(cmd, aliases)| *cmd == name || aliases.contains(&name))
        .map(|(cmd, _)| *cmd)
}

/// Closest known command or alias within an edit distance of 3.
pub fn suggest(name: &str) -> Option<String> {
    COMMANDS
        .iter()
        .flat_map(|(cmd, aliases)| std::iter::once(*cmd).chain(aliases.iter().copied()))
        .map(|candidate| (edit_distance(name, candidate), candidate))
        .filter(|(d, _)| *d <= 3)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ── Subcommands ─────────────────────────────────────────────────────────

fn parse_context(rest: &str) -> Result<ContextCommand> {
    let args = split_args(rest)?;
    let (sub, args) = args
        .split_first()
        .ok_or_else(|| usage("/context <create|switch|info|list|delete|export> ..."))?;

    match sub.as_str() {
        "create" | "new" => {
            let (name, extra) = args
                .split_first()
                .ok_or_else(|| usage("/context create <name> [description] [#tag ...]"))?;
            let (tags, words) = take_tags(extra);
            Ok(ContextCommand::Create {
                name: name.clone(),
                description: words.join(" "),
                tags,
            })
        }
        "switch" | "use" => Ok(ContextCommand::Switch(
            single(args, "/context switch <name-or-id>")?,
        )),
        "info" => Ok(ContextCommand::Info),
        "list" | "ls" => Ok(ContextCommand::List),
        "delete" | "rm" => Ok(ContextCommand::Delete(single(
            args,
            "/context delete <name-or-id>",
        )?)),
        "export" => {
            let (format, name) = args
                .split_first()
                .ok_or_else(|| usage("/context export <json|markdown|text> [name-or-id]"))?;
            Ok(ContextCommand::Export {
                format: ExportFormat::parse(format)?,
                context: (!name.is_empty()).then(|| name.join(" ")),
            })
        }
        other => Err(usage(&format!(
            "unknown /context action '{other}' (create, switch, info, list, delete, export)"
        ))),
    }
}

fn parse_branch(rest: &str) -> Result<BranchCommand> {
    let args = split_args(rest)?;
    let (sub, args) = args
        .split_first()
        .ok_or_else(|| usage("/branch <create|fork|switch|tree|info|search|merge|delete> ..."))?;

    match sub.as_str() {
        "create" | "new" => {
            let (parent, words) = take_option(args, &["--parent", "-p"])?;
            if words.is_empty() {
                return Err(usage("/branch create <title> [--parent <branch>]"));
            }
            Ok(BranchCommand::Create {
                title: words.join(" "),
                parent,
            })
        }
        "fork" => {
            let (from, words) = take_option(args, &["--from", "-f"])?;
            Ok(BranchCommand::Fork {
                title: (!words.is_empty()).then(|| words.join(" ")),
                from,
            })
        }
        "switch" | "checkout" => Ok(BranchCommand::Switch(
            single(args, "/branch switch <branch>")?,
        )),
        "tree" => Ok(BranchCommand::Tree),
        "info" => Ok(BranchCommand::Info),
        "search" | "find" => Ok(BranchCommand::Search(single(args, "/branch search <query>")?)),
        "merge" => match args {
            [a, b] => Ok(BranchCommand::Merge {
                a: a.clone(),
                b: b.clone(),
                strategy: MergeStrategy::Append,
            }),
            [a, b, strategy] => Ok(BranchCommand::Merge {
                a: a.clone(),
                b: b.clone(),
                strategy: MergeStrategy::parse(strategy).ok_or_else(|| {
                    ParleyError::validation(format!(
                        "unknown merge strategy '{strategy}' (expected append or interleave)"
                    ))
                })?,
            }),
            _ => Err(usage("/branch merge <a> <b> [append|interleave]")),
        },
        "delete" | "rm" => match args {
            [branch] => Ok(BranchCommand::Delete {
                branch: branch.clone(),
                policy: DeletePolicy::default(),
            }),
            [branch, policy] => Ok(BranchCommand::Delete {
                branch: branch.clone(),
                policy: parse_policy(policy)?,
            }),
            _ => Err(usage("/branch delete <branch> [refuse|cascade|reparent]")),
        },
        other => Err(usage(&format!(
            "unknown /branch action '{other}' (create, fork, switch, tree, info, search, merge, delete)"
        ))),
    }
}

fn parse_policy(name: &str) -> Result<DeletePolicy> {
    match name.to_ascii_lowercase().as_str() {
        "refuse" => Ok(DeletePolicy::Refuse),
        "cascade" => Ok(DeletePolicy::Cascade),
        "reparent" => Ok(DeletePolicy::Reparent),
        other => Err(ParleyError::validation(format!(
            "unknown delete policy '{other}' (expected refuse, cascade or reparent)"
        ))),
    }
}

fn parse_memory(rest: &str) -> Result<MemoryCommand> {
    let args = split_args(rest)?;
    let (sub, args) = args
        .split_first()
        .ok_or_else(|| usage("/memory <add|search|list|delete> ..."))?;

    match sub.as_str() {
        "add" => {
            let (importance, args) = take_option(args, &["--importance", "-i"])?;
            let (kind, args) = take_option(&args, &["--kind", "-k"])?;
            let (tags, words) = take_tags(&args);
            if words.is_empty() {
                return Err(usage(
                    "/memory add [-i <0..1>] [-k fact|preference|instruction|example] [#tag ...] <content>",
                ));
            }

            let importance = match importance {
                Some(raw) => raw.parse::<f32>().map_err(|_| {
                    ParleyError::validation(format!("importance must be a number, got '{raw}'"))
                })?,
                None => 0.5,
            };
            let kind = match kind {
                Some(raw) => MemoryKind::parse(&raw).ok_or_else(|| {
                    ParleyError::validation(format!(
                        "unknown memory kind '{raw}' (fact, preference, instruction, example)"
                    ))
                })?,
                None => MemoryKind::Fact,
            };
            Ok(MemoryCommand::Add {
                content: words.join(" "),
                importance,
                tags,
                kind,
            })
        }
        "search" | "find" => {
            let (context, words) = take_option(args, &["--context", "-c"])?;
            if words.is_empty() {
                return Err(usage("/memory search <query> [--context <name>]"));
            }
            Ok(MemoryCommand::Search {
                query: words.join(" "),
                context,
            })
        }
        "list" | "ls" => Ok(MemoryCommand::List),
        "delete" | "rm" => Ok(MemoryCommand::Delete(single(args, "/memory delete <memory-id>")?)),
        other => Err(usage(&format!(
            "unknown /memory action '{other}' (add, search, list, delete)"
        ))),
    }
}

// ── Argument helpers ────────────────────────────────────────────────────

/// Split on whitespace, keeping double-quoted runs together.
pub fn split_args(input: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(ParleyError::validation("unterminated quote"));
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

/// Pull `--flag value` out of `args`, returning the value and the rest.
fn take_option(args: &[String], names: &[&str]) -> Result<(Option<String>, Vec<String>)> {
    let mut value = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if names.contains(&arg.as_str()) {
            let v = iter
                .next()
                .ok_or_else(|| ParleyError::validation(format!("{arg} needs a value")))?;
            value = Some(v.clone());
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((value, rest))
}

fn take_tags(args: &[String]) -> (BTreeSet<String>, Vec<String>) {
    let mut tags = BTreeSet::new();
    let mut words = Vec::new();
    for arg in args {
        match arg.strip_prefix('#') {
            Some(tag) if !tag.is_empty() => {
                tags.insert(tag.to_lowercase());
            }
            _ => words.push(arg.clone()),
        }
    }
    (tags, words)
}

fn single(args: &[String], usage_text: &str) -> Result<String> {
    if args.is_empty() {
        return Err(usage(usage_text));
    }
    Ok(args.join(" "))
}

fn required<'a>(rest: &'a str, usage_text: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(usage(usage_text))
    } else {
        Ok(rest)
    }
}

fn non_empty(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_string())
}

fn usage(text: &str) -> ParleyError {
    ParleyError::validation(format!("usage: {text}"))
}

pub fn help_text() -> String {
    "\
CHAT
  /help, /h                       Show this help
  /clear, /c                      Start a fresh branch (history stays in /branch tree)
  /history, /hist                 Show the active branch
  /stream, /s                     Toggle streaming responses
  /copy, /cp                      Copy the last response to the clipboard
  /stats, /st                     Branch, message and memory counts
  /quit, /q, /exit, /e            Quit

CODE
  /analyze, /a <code>             Analyze a snippet
  /highlight, /hl <code>          Syntax-highlight a snippet

SESSIONS
  /save, /sv [title]              Save the session
  /resume, /r <id>                Resume a saved session
  /list-sessions, /ls             List saved sessions
  /export, /exp <format> [id]     Export as json, markdown or text
  /delete-session, /del <id>      Delete a saved session

BRANCHES (/b)
  /branch create <title> [--parent <branch>]
  /branch fork [title] [--from <branch>]
  /branch switch <branch>
  /branch tree | info
  /branch search <query>
  /branch merge <a> <b> [append|interleave]
  /branch delete <branch> [refuse|cascade|reparent]

CONTEXTS AND MEMORY (/ctx, /mem)
  /context create <name> [description] [#tag ...]
  /context switch <name> | info | list | delete <name>
  /context export <json|markdown|text> [name]
  /memory add [-i 0.8] [-k preference] [#tag ...] <content>
  /memory search <query> [--context <name>] | list | delete <id>

PROVIDERS
  /set-provider, /sp <name>       Switch to openai or anthropic
  /set-model, /sm <model>         Switch model
  /models, /m                     List known models
  /providers, /p                  List providers and key status
  /theme, /th [name]              Show or change the color theme"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("/hlep", "/help"), 2);
        assert_eq!(edit_distance("", "/q"), 2);
        assert_eq!(edit_distance("/save", "/save"), 0);
    }

    #[test]
    fn test_split_args_quotes() {
        assert_eq!(
            split_args(r#"create "Data science" pandas"#).unwrap(),
            vec!["create", "Data science", "pandas"]
        );
        assert_eq!(split_args(r#"x """#).unwrap(), vec!["x", ""]);
        assert!(split_args(r#"open "quote"#).is_err());
    }

    #[test]
    fn test_every_alias_is_unique() {
        let mut seen = std::collections::HashSet::new();
        for (cmd, aliases) in COMMANDS {
            assert!(seen.insert(*cmd), "{cmd} listed twice");
            for alias in *aliases {
                assert!(seen.insert(*alias), "{alias} listed twice");
            }
        }
    }

    #[test]
    fn test_help_mentions_every_command() {
        let help = help_text();
        for (cmd, _) in COMMANDS {
            assert!(help.contains(cmd), "{cmd} missing from help");
        }
    }
}
