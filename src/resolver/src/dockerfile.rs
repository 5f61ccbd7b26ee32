//! Dockerfile parser.
//!
//! Parses a Dockerfile into a sequence of typed instructions. Supports the
//! `# escape=` parser directive, line continuations, comments, leading
//! `--name=value` flags and the JSON (exec) form for ADD/COPY.
//!
//! Only the instructions that matter for dependency and port resolution get
//! a dedicated variant; every other keyword, known or not, is kept as
//! [`InstructionKind::Other`].

use std::collections::HashSet;
use std::io::Read;

use dfdeps_core::error::{DepsError, Result};

/// Default escape character for line continuations and word escaping.
pub const DEFAULT_ESCAPE: char = '\\';

/// Instruction keywords of the build format.
const KNOWN_INSTRUCTIONS: &[&str] = &[
    "ADD",
    "ARG",
    "CMD",
    "COPY",
    "ENTRYPOINT",
    "ENV",
    "EXPOSE",
    "FROM",
    "HEALTHCHECK",
    "LABEL",
    "MAINTAINER",
    "ONBUILD",
    "RUN",
    "SHELL",
    "STOPSIGNAL",
    "USER",
    "VOLUME",
    "WORKDIR",
];

/// A single parsed instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// What the instruction is, with its typed arguments
    pub kind: InstructionKind,
    /// Leading `--name[=value]` flags, verbatim
    pub flags: Vec<String>,
    /// 1-based line on which the instruction starts
    pub line: usize,
}

/// Typed instruction payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// `FROM <image> [AS <stage>]`
    From {
        image: String,
        stage: Option<String>,
    },
    /// `ADD [--flags] <src>... <dst>`
    Add(CopyArgs),
    /// `COPY [--flags] <src>... <dst>`
    Copy(CopyArgs),
    /// `ENV <key>=<value> ...` or `ENV <key> <value>`
    ///
    /// Values are kept raw; quotes and variable references are processed
    /// when the instruction is dispatched.
    Env { pairs: Vec<(String, String)> },
    /// `EXPOSE <port>[/<proto>] ...`
    Expose { ports: Vec<String> },
    /// Any other known instruction, with its raw argument text
    Other { keyword: String, args: String },
}

/// Argument tokens of an ADD or COPY instruction, destination included.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyArgs {
    pub tokens: Vec<String>,
}

impl CopyArgs {
    /// Source tokens: everything before the destination, ignoring any
    /// trailing `#` comment tokens.
    pub fn sources(&self) -> &[String] {
        let end = self
            .tokens
            .iter()
            .position(|t| t.starts_with('#'))
            .unwrap_or(self.tokens.len());
        &self.tokens[..end.saturating_sub(1)]
    }
}

impl Instruction {
    /// Upper-case instruction keyword.
    pub fn keyword(&self) -> &str {
        match &self.kind {
            InstructionKind::From { .. } => "FROM",
            InstructionKind::Add(_) => "ADD",
            InstructionKind::Copy(_) => "COPY",
            InstructionKind::Env { .. } => "ENV",
            InstructionKind::Expose { .. } => "EXPOSE",
            InstructionKind::Other { keyword, .. } => keyword,
        }
    }

    /// Value of a `--name=value` flag.
    pub fn flag(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{}=", name);
        self.flags
            .iter()
            .find_map(|f| f.strip_prefix(prefix.as_str()))
    }

    /// Whether the instruction copies from another build stage or image
    /// (`--from=<value>`) rather than from the build context.
    pub fn has_stage_source(&self) -> bool {
        self.flag("from").is_some()
    }
}

/// Parsed Dockerfile: a list of instructions in order.
#[derive(Debug, Clone)]
pub struct Dockerfile {
    pub instructions: Vec<Instruction>,
    /// Escape character selected by the `# escape=` directive
    pub escape: char,
}

impl Dockerfile {
    /// Parse a Dockerfile from its text content.
    pub fn parse(content: &str) -> Result<Self> {
        let escape = parse_directives(content)?;
        let mut instructions = Vec::new();

        for (line_num, line) in join_continuation_lines(content, escape) {
            instructions.push(parse_instruction(&line, line_num, escape)?);
        }

        if instructions.is_empty() {
            return Err(DepsError::Parse {
                line: 0,
                message: "Dockerfile is empty or contains no instructions".to_string(),
            });
        }

        Ok(Dockerfile {
            instructions,
            escape,
        })
    }

    /// Parse a Dockerfile from a reader.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let content = String::from_utf8(raw).map_err(|e| DepsError::Parse {
            line: 0,
            message: format!("Dockerfile is not valid UTF-8: {}", e),
        })?;
        Self::parse(&content)
    }

    /// Parse a standalone instruction, such as an ONBUILD trigger stored in
    /// an image configuration.
    pub fn parse_fragment(text: &str) -> Result<Instruction> {
        let mut lines = join_continuation_lines(text, DEFAULT_ESCAPE);
        match lines.len() {
            0 => Err(DepsError::Parse {
                line: 1,
                message: "instruction fragment is empty".to_string(),
            }),
            1 => {
                let (line_num, line) = lines.remove(0);
                parse_instruction(&line, line_num, DEFAULT_ESCAPE)
            }
            n => Err(DepsError::Parse {
                line: 1,
                message: format!("expected a single instruction, found {}", n),
            }),
        }
    }

    /// Base images referenced by `FROM`, skipping references to earlier
    /// build stages. Returned in file order, duplicates preserved.
    pub fn base_images(&self) -> Vec<&str> {
        let mut stages: HashSet<String> = HashSet::new();
        let mut images = Vec::new();

        for instruction in &self.instructions {
            if let InstructionKind::From { image, stage } = &instruction.kind {
                if stages.contains(&image.to_lowercase()) {
                    tracing::debug!(
                        stage = image.as_str(),
                        line = instruction.line,
                        "FROM names an earlier build stage, not an image"
                    );
                } else {
                    images.push(image.as_str());
                }
                if let Some(stage) = stage {
                    stages.insert(stage.to_lowercase());
                }
            }
        }

        images
    }
}

/// Read parser directives at the top of the file and return the escape
/// character they select.
fn parse_directives(content: &str) -> Result<char> {
    let mut escape = DEFAULT_ESCAPE;

    for (idx, line) in content.lines().enumerate() {
        let Some(body) = line.trim().strip_prefix('#') else {
            break;
        };
        let Some((name, value)) = body.split_once('=') else {
            break;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            break;
        }
        if name.eq_ignore_ascii_case("escape") {
            escape = match value.trim() {
                "\\" => '\\',
                "`" => '`',
                other => {
                    return Err(DepsError::Parse {
                        line: idx + 1,
                        message: format!(
                            "invalid escape token '{}' does not match ` or \\",
                            other
                        ),
                    })
                }
            };
        }
    }

    Ok(escape)
}

/// Join lines ending with the escape character into single logical lines.
///
/// Comment and blank lines are dropped, including inside a continuation.
/// Each logical line carries the 1-based number of its first physical line.
fn join_continuation_lines(content: &str, escape: char) -> Vec<(usize, String)> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if current.is_empty() {
            start = idx + 1;
        }

        let end_trimmed = line.trim_end();
        if let Some(body) = end_trimmed.strip_suffix(escape) {
            current.push_str(body);
        } else {
            current.push_str(line);
            logical_lines.push((start, current.trim().to_string()));
            current.clear();
        }
    }

    // Trailing continuation without a final line
    if !current.trim().is_empty() {
        logical_lines.push((start, current.trim().to_string()));
    }

    logical_lines
}

/// Parse a single logical line into an Instruction.
fn parse_instruction(line: &str, line_num: usize, escape: char) -> Result<Instruction> {
    let (keyword, rest) = split_first_word(line);
    let keyword_upper = keyword.to_uppercase();

    // Unknown keywords parse as `Other`
    if !KNOWN_INSTRUCTIONS.contains(&keyword_upper.as_str()) {
        tracing::debug!(
            keyword = %keyword,
            line = line_num,
            "Unknown instruction kept as-is"
        );
    }

    let (flags, rest) = split_flags(rest);

    let kind = match keyword_upper.as_str() {
        "FROM" => parse_from(rest, line_num)?,
        "ADD" => InstructionKind::Add(parse_copy_args("ADD", rest, line_num)?),
        "COPY" => InstructionKind::Copy(parse_copy_args("COPY", rest, line_num)?),
        "ENV" => parse_env(rest, line_num, escape)?,
        "EXPOSE" => parse_expose(rest, line_num)?,
        _ => InstructionKind::Other {
            keyword: keyword_upper,
            args: rest.to_string(),
        },
    };

    Ok(Instruction {
        kind,
        flags,
        line: line_num,
    })
}

/// Split a string into the first word and the rest.
fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Strip leading `--flag` words off an argument string.
fn split_flags(mut rest: &str) -> (Vec<String>, &str) {
    let mut flags = Vec::new();
    while rest.starts_with("--") {
        let (flag, after) = split_first_word(rest);
        flags.push(flag.to_string());
        rest = after;
    }
    (flags, rest)
}

// --- Individual instruction parsers ---

fn parse_from(rest: &str, line_num: usize) -> Result<InstructionKind> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        [image] => Ok(InstructionKind::From {
            image: image.to_string(),
            stage: None,
        }),
        [image, as_kw, stage] if as_kw.eq_ignore_ascii_case("AS") => Ok(InstructionKind::From {
            image: image.to_string(),
            stage: Some(stage.to_string()),
        }),
        [] => Err(DepsError::Parse {
            line: line_num,
            message: "FROM requires an image argument".to_string(),
        }),
        _ => Err(DepsError::Parse {
            line: line_num,
            message: "FROM requires either one or three arguments".to_string(),
        }),
    }
}

fn parse_copy_args(keyword: &str, rest: &str, line_num: usize) -> Result<CopyArgs> {
    let tokens = if rest.starts_with('[') {
        // Exec form when it is valid JSON, whitespace-separated otherwise
        match serde_json::from_str::<Vec<String>>(rest) {
            Ok(parsed) => parsed,
            Err(_) => split_whitespace(rest),
        }
    } else {
        split_whitespace(rest)
    };

    if tokens.len() < 2 {
        return Err(DepsError::Parse {
            line: line_num,
            message: format!(
                "{} requires at least one source and a destination",
                keyword
            ),
        });
    }

    Ok(CopyArgs { tokens })
}

fn parse_env(rest: &str, line_num: usize, escape: char) -> Result<InstructionKind> {
    let words = split_words(rest, escape);
    let Some(first) = words.first() else {
        return Err(DepsError::Parse {
            line: line_num,
            message: "ENV requires a key and value".to_string(),
        });
    };

    // Legacy form: ENV KEY VALUE
    if !first.contains('=') {
        let (key, value) = split_first_word(rest);
        if value.is_empty() {
            return Err(DepsError::Parse {
                line: line_num,
                message: format!("ENV {} is missing a value", key),
            });
        }
        return Ok(InstructionKind::Env {
            pairs: vec![(key.to_string(), value.to_string())],
        });
    }

    let mut pairs = Vec::with_capacity(words.len());
    for word in words {
        let Some((key, value)) = word.split_once('=') else {
            return Err(DepsError::Parse {
                line: line_num,
                message: format!(
                    "Syntax error - can't find = in \"{}\". Must be of the form: name=value",
                    word
                ),
            });
        };
        if key.is_empty() {
            return Err(DepsError::Parse {
                line: line_num,
                message: "ENV names can not be blank".to_string(),
            });
        }
        pairs.push((key.to_string(), value.to_string()));
    }

    Ok(InstructionKind::Env { pairs })
}

fn parse_expose(rest: &str, line_num: usize) -> Result<InstructionKind> {
    let ports = split_whitespace(rest);
    if ports.is_empty() {
        return Err(DepsError::Parse {
            line: line_num,
            message: "EXPOSE requires at least one port".to_string(),
        });
    }
    Ok(InstructionKind::Expose { ports })
}

// --- Helpers ---

fn split_whitespace(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

/// Split on whitespace outside of quotes. Quotes and escapes are kept in the
/// words so the expander can process them later.
fn split_words(s: &str, escape: char) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch.is_whitespace() && quote.is_none() {
            if !word.is_empty() {
                words.push(std::mem::take(&mut word));
            }
            continue;
        }

        if ch == escape {
            // A trailing escape is dropped
            if let Some(next) = chars.next() {
                word.push(ch);
                word.push(next);
            }
            continue;
        }

        match quote {
            Some(q) if ch == q => quote = None,
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            _ => {}
        }
        word.push(ch);
    }

    if !word.is_empty() {
        words.push(word);
    }
    words
}
