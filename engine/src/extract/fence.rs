//! Fenced code block scanner.
//!
//! A line-oriented state machine: find an opening fence, capture its info
//! string, accumulate body lines until the matching closing fence. Fences
//! with an info string inside a block open a nested level that a later bare
//! fence closes, so examples embedded in a file body stay part of it.
//! Blocks left open at the end of the text are dropped.

const MIN_FENCE: usize = 3;

const HINT_KEYWORDS: &[&str] = &["filename", "path", "file"];

/// One fenced region of a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FencedBlock {
    /// Raw hint from the info string, quotes removed.
    pub hint: Option<String>,
    /// Body with one leading and one trailing blank line removed; every line
    /// ends in `\n`.
    pub body: String,
}

struct OpenFence {
    len: usize,
    hint: Option<String>,
    depth: usize,
    lines: Vec<String>,
}

pub(crate) fn scan_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenFence> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        let ticks = trimmed.chars().take_while(|&c| c == '`').count();
        let info = &trimmed[ticks..];

        let Some(fence) = open.as_mut() else {
            if ticks >= MIN_FENCE && !info.contains('`') {
                open = Some(OpenFence {
                    len: ticks,
                    hint: parse_info(info),
                    depth: 0,
                    lines: Vec::new(),
                });
            }
            continue;
        };

        if ticks >= MIN_FENCE && !info.contains('`') {
            if info.trim().is_empty() {
                if fence.depth == 0 && ticks >= fence.len {
                    if let Some(done) = open.take() {
                        blocks.push(FencedBlock {
                            hint: done.hint,
                            body: join_body(done.lines),
                        });
                    }
                    continue;
                }
                fence.depth = fence.depth.saturating_sub(1);
            } else {
                fence.depth += 1;
            }
        }
        fence.lines.push(line.to_string());
    }

    if let Some(unclosed) = open {
        tracing::debug!(
            lines = unclosed.lines.len(),
            "Unterminated code fence ignored"
        );
    }
    blocks
}

fn join_body(mut lines: Vec<String>) -> String {
    if lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.iter().map(|l| format!("{l}\n")).collect()
}

/// Pull a filename hint out of a fence info string.
///
/// Accepted forms, in priority order:
/// - `filename="a b.py"`, `path: src/x.rs`, `file src/x.rs` (keyword anywhere)
/// - `python:src/app.py`
/// - `src/app.py` (first token looks like a path)
/// - `python app.py` (bare token after the language tag, which may carry a
///   version such as `python3.11`)
pub(crate) fn parse_info(info: &str) -> Option<String> {
    let tokens = tokenize(info);
    if tokens.is_empty() {
        return None;
    }

    if let Some(hint) = keyword_hint(&tokens) {
        return non_empty(hint);
    }

    let first = tokens[0].as_str();
    if let Some((lang, path)) = first.split_once(':')
        && lang.len() > 1
        && is_language_tag(lang)
    {
        return non_empty(path.to_string());
    }
    let versioned = is_versioned_language(first);
    if !versioned && (first.contains('/') || first.contains('.')) {
        return non_empty(first.to_string());
    }
    if (versioned || is_language_tag(first))
        && let Some(second) = tokens.get(1)
        && !second.contains('=')
    {
        return non_empty(second.clone());
    }
    None
}

fn keyword_hint(tokens: &[String]) -> Option<String> {
    for (idx, token) in tokens.iter().enumerate() {
        let lower = token.to_ascii_lowercase();
        for keyword in HINT_KEYWORDS {
            let Some(rest) = lower.strip_prefix(keyword) else {
                continue;
            };
            // Inline value: `filename=x` / `filename:x`.
            if let Some(sep) = rest.chars().next()
                && (sep == '=' || sep == ':')
            {
                let value = &token[keyword.len() + 1..];
                if !value.is_empty() {
                    return Some(value.to_string());
                }
                return tokens.get(idx + 1).cloned();
            }
            if !rest.is_empty() {
                continue;
            }
            // Separate value: `filename = x`, `filename =x`, `file x`.
            let next = tokens.get(idx + 1)?;
            return match next.as_str() {
                "=" | ":" => tokens.get(idx + 2).cloned(),
                other => match other.strip_prefix(['=', ':']) {
                    Some(value) => Some(value.to_string()),
                    None => Some(other.to_string()),
                },
            };
        }
    }
    None
}

fn is_language_tag(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_'))
}

/// A language tag with a dotted version, e.g. `python3.11` or `lua5.4`.
fn is_versioned_language(token: &str) -> bool {
    let Some(split) = token.find(|c: char| c.is_ascii_digit()) else {
        return false;
    };
    let (name, version) = token.split_at(split);
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || matches!(c, '+' | '-' | '#' | '_'))
        && version.contains('.')
        && !version.ends_with('.')
        && version.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Shell-like word splitting. Double quotes honour `\"` and `\\`; single
/// quotes are literal. An unterminated quote runs to the end of the line.
fn tokenize(info: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = info.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut token = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            chars.next();
            match ch {
                '"' => {
                    let mut escaped = false;
                    for inner in chars.by_ref() {
                        if escaped {
                            if !matches!(inner, '"' | '\\') {
                                token.push('\\');
                            }
                            token.push(inner);
                            escaped = false;
                        } else if inner == '\\' {
                            escaped = true;
                        } else if inner == '"' {
                            break;
                        } else {
                            token.push(inner);
                        }
                    }
                    if escaped {
                        token.push('\\');
                    }
                }
                '\'' => {
                    for inner in chars.by_ref() {
                        if inner == '\'' {
                            break;
                        }
                        token.push(inner);
                    }
                }
                other => token.push(other),
            }
        }
        tokens.push(token);
    }
    tokens
}
