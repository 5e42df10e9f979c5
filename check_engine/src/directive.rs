//! Line tokenizer for annotated SQL documents.
//!
//! Every source line becomes one [`Token`]. Lines of the form
//! `-- pn-<keyword> <value>` become [`TokenKind::Directive`] carrying a typed
//! [`Directive`] node; all other lines are blank, comment or SQL text. The
//! parser pattern-matches on these nodes instead of probing the raw text.
//!
//! Recognition rules:
//! - a directive is a line whose first non-blank characters are `--`,
//!   optionally followed by whitespace, then `pn-` and a keyword
//! - the value is the remainder of the line, trimmed (may be empty)
//! - keywords are matched case-insensitively
//! - `pn-password` and `pn-filePath` are placeholders, not directives; they
//!   only have meaning inside values and SQL text

use std::sync::OnceLock;

use regex::Regex;

/// Placeholder replaced with the check file's own directory at parse time.
pub const FILE_PATH_PLACEHOLDER: &str = "pn-filePath";

/// Placeholder replaced with the resolved credential at run time.
pub const PASSWORD_PLACEHOLDER: &str = "pn-password";

/// A typed directive node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `pn-connectionString <value>`
    ConnectionString(String),
    /// `pn-connectionUser <value>`
    ConnectionUser(String),
    /// `pn-sqlDialect <value>` (raw, validated by the parser)
    SqlDialect(String),
    /// `pn-skip [value]`
    Skip(bool),
    /// `pn-count`: the count query follows.
    Count,
    /// `pn-check`: starts a check block.
    Check,
    /// `pn-name <value>`
    Name(String),
    /// `pn-tag <value>`
    Tag(String),
    /// `pn-id-col <value>`
    IdColumn(String),
    /// `pn-approve-col <value>`
    ApproveColumn(String),
    /// `pn-expect <value>` (raw, validated by the parser)
    Expect(String),
    /// `pn-runScheduleCron <value>`: recognized, never acted on.
    RunScheduleCron(String),
    /// Any other `pn-` keyword.
    Unknown(String),
}

impl Directive {
    /// Canonical keyword spelling, used in diagnostics.
    #[must_use]
    pub fn keyword(&self) -> &str {
        match self {
            Self::ConnectionString(_) => "pn-connectionString",
            Self::ConnectionUser(_) => "pn-connectionUser",
            Self::SqlDialect(_) => "pn-sqlDialect",
            Self::Skip(_) => "pn-skip",
            Self::Count => "pn-count",
            Self::Check => "pn-check",
            Self::Name(_) => "pn-name",
            Self::Tag(_) => "pn-tag",
            Self::IdColumn(_) => "pn-id-col",
            Self::ApproveColumn(_) => "pn-approve-col",
            Self::Expect(_) => "pn-expect",
            Self::RunScheduleCron(_) => "pn-runScheduleCron",
            Self::Unknown(keyword) => keyword,
        }
    }

    fn from_parts(keyword: &str, value: &str) -> Self {
        let value = value.trim().to_owned();
        match keyword.to_lowercase().as_str() {
            "connectionstring" => Self::ConnectionString(value),
            "connectionuser" => Self::ConnectionUser(value),
            "sqldialect" => Self::SqlDialect(value),
            "skip" => Self::Skip(parse_flag(&value)),
            "count" => Self::Count,
            "check" => Self::Check,
            "name" => Self::Name(value),
            "tag" => Self::Tag(value),
            "id-col" => Self::IdColumn(value),
            "approve-col" => Self::ApproveColumn(value),
            "expect" => Self::Expect(value),
            "runschedulecron" => Self::RunScheduleCron(value),
            _ => Self::Unknown(format!("pn-{keyword}")),
        }
    }
}

/// A bare `pn-skip` means skip; explicit falsy values turn it off.
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.to_lowercase().as_str(),
        "false" | "no" | "0" | "off"
    )
}

/// Kind of a source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Empty or whitespace-only line.
    Blank,
    /// `-- pn-...` line.
    Directive(Directive),
    /// Any other line starting with `--`.
    Comment,
    /// Everything else.
    Sql,
}

/// One source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Classification of the line.
    pub kind: TokenKind,
    /// The line text without its terminator.
    pub text: &'a str,
    /// 1-based line number.
    pub line: u32,
}

impl Token<'_> {
    /// The directive carried by this line, if any.
    #[must_use]
    pub fn directive(&self) -> Option<&Directive> {
        match &self.kind {
            TokenKind::Directive(d) => Some(d),
            _ => None,
        }
    }
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*--\s*pn-([A-Za-z][A-Za-z0-9_-]*)(?:\s+(.*?))?\s*$")
            .expect("directive regex is valid")
    })
}

/// Tokenize a document into one token per line.
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| Token {
            kind: classify(line),
            text: line,
            line: (idx + 1) as u32,
        })
        .collect()
}

fn classify(line: &str) -> TokenKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return TokenKind::Blank;
    }
    if !trimmed.starts_with("--") {
        return TokenKind::Sql;
    }
    match directive_regex().captures(line) {
        Some(caps) => {
            let keyword = caps.get(1).map_or("", |m| m.as_str());
            // Placeholders on their own line are just comments.
            if keyword.eq_ignore_ascii_case("password") || keyword.eq_ignore_ascii_case("filePath")
            {
                return TokenKind::Comment;
            }
            let value = caps.get(2).map_or("", |m| m.as_str());
            TokenKind::Directive(Directive::from_parts(keyword, value))
        }
        None => TokenKind::Comment,
    }
}

/// A contiguous run of tokens bounded by `pn-check` markers.
///
/// Block 0 is the preamble before the first marker; every other block
/// starts at its marker.
#[derive(Debug, Clone)]
pub struct Block<'t, 'a> {
    /// 0 for the preamble, then 1, 2, ... per marker.
    pub order: usize,
    /// Line of the marker (1 for the preamble).
    pub marker_line: u32,
    /// Tokens of the block, marker included.
    pub tokens: &'t [Token<'a>],
}

/// Split a token stream at each `pn-check` marker.
#[must_use]
pub fn split_blocks<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<Block<'t, 'a>> {
    let marker_positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| matches!(t.directive(), Some(Directive::Check)))
        .map(|(i, _)| i)
        .collect();

    let mut blocks = Vec::with_capacity(marker_positions.len() + 1);
    let preamble_end = marker_positions.first().copied().unwrap_or(tokens.len());
    blocks.push(Block {
        order: 0,
        marker_line: 1,
        tokens: &tokens[..preamble_end],
    });

    for (idx, &start) in marker_positions.iter().enumerate() {
        let end = marker_positions.get(idx + 1).copied().unwrap_or(tokens.len());
        blocks.push(Block {
            order: idx + 1,
            marker_line: tokens[start].line,
            tokens: &tokens[start..end],
        });
    }

    blocks
}

fn statement_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // keyword must open the line, after optional whitespace and /* */ comments
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:/\*.*?\*/\s*)*(select|with)\b").expect("statement regex is valid")
    })
}

/// Recover the SQL statement that follows `tokens[from..]`.
///
/// Leading blank, comment and directive lines are skipped. The statement is
/// the paragraph that follows: it ends at the first blank line, the next
/// directive, or the end of the slice. The statement opens at the first line
/// beginning with `SELECT` or `WITH` (leading `/* */` comments allowed), and
/// trailing full-line comments are dropped. Returns `None` when the paragraph holds no such keyword.
#[must_use]
pub fn extract_statement(tokens: &[Token<'_>], from: usize) -> Option<String> {
    let rest = tokens.get(from..)?;
    let start = rest.iter().position(|t| t.kind == TokenKind::Sql)?;

    let paragraph: Vec<&Token<'_>> = rest[start..]
        .iter()
        .take_while(|t| matches!(t.kind, TokenKind::Sql | TokenKind::Comment))
        .collect();

    let mut lines: Vec<&str> = Vec::new();
    let mut started = false;
    for token in paragraph {
        if started {
            lines.push(token.text);
            continue;
        }
        if token.kind != TokenKind::Sql {
            continue;
        }
        if let Some(m) = statement_start_regex()
            .captures(token.text)
            .and_then(|c| c.get(1))
        {
            lines.push(&token.text[m.start()..]);
            started = true;
        }
    }

    while lines
        .last()
        .is_some_and(|l| l.trim_start().starts_with("--"))
    {
        lines.pop();
    }

    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n").trim_end().to_owned())
}
