//! Shell word expansion for Dockerfile arguments.
//!
//! Processes one word the way the build format does: the escape character
//! escapes the next character, single quotes are literal, double quotes allow
//! variable references, and `$NAME` / `${NAME}` / `${NAME:-word}` /
//! `${NAME:+word}` / `${NAME:?message}` are substituted from an
//! [`Environment`]. Unset variables expand to the empty string.

use std::collections::BTreeMap;

use dfdeps_core::error::{DepsError, Result};

/// Variables set by `ENV` instructions, in a flat file-wide scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, overwriting any earlier value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

/// Expand a single word against `env`.
pub fn expand_word(word: &str, env: &Environment, escape: char) -> Result<String> {
    let mut lexer = WordLexer {
        word,
        chars: word.chars().collect(),
        pos: 0,
        env,
        escape,
    };
    lexer.process(None)
}

struct WordLexer<'a> {
    word: &'a str,
    chars: Vec<char>,
    pos: usize,
    env: &'a Environment,
    escape: char,
}

impl<'a> WordLexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> DepsError {
        DepsError::Expansion {
            word: self.word.to_string(),
            message: message.into(),
        }
    }

    /// Process until the end of the word, or until `stop` (consumed) when
    /// inside a `${...}` modifier.
    fn process(&mut self, stop: Option<char>) -> Result<String> {
        let mut out = String::new();

        loop {
            let Some(ch) = self.next() else {
                return match stop {
                    Some(c) => Err(self.error(format!("missing '{}' in substitution", c))),
                    None => Ok(out),
                };
            };

            if Some(ch) == stop {
                return Ok(out);
            }

            match ch {
                '\'' => out.push_str(&self.single_quoted()?),
                '"' => out.push_str(&self.double_quoted()?),
                '$' => out.push_str(&self.dollar()?),
                c if c == self.escape => {
                    // A trailing escape is dropped
                    if let Some(next) = self.next() {
                        out.push(next);
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn single_quoted(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.next() {
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    return Err(self.error(
                        "unexpected end of statement while looking for matching single-quote",
                    ))
                }
            }
        }
    }

    fn double_quoted(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.next() {
                Some('"') => return Ok(out),
                Some('$') => out.push_str(&self.dollar()?),
                Some(c) if c == self.escape => match self.peek() {
                    Some(n) if n == '"' || n == '$' || n == self.escape => {
                        self.pos += 1;
                        out.push(n);
                    }
                    _ => out.push(c),
                },
                Some(c) => out.push(c),
                None => {
                    return Err(self.error(
                        "unexpected end of statement while looking for matching double-quote",
                    ))
                }
            }
        }
    }

    /// Called after a `$` has been consumed.
    fn dollar(&mut self) -> Result<String> {
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                self.braced()
            }
            Some(c) if is_name_start(c) || c.is_ascii_digit() => {
                let name = self.name();
                Ok(self.lookup(&name).unwrap_or_default().to_string())
            }
            _ => Ok("$".to_string()),
        }
    }

    fn braced(&mut self) -> Result<String> {
        let name = self.name();
        if name.is_empty() {
            return Err(self.error("bad substitution"));
        }

        match self.next() {
            Some('}') => Ok(self.lookup(&name).unwrap_or_default().to_string()),
            Some(':') => {
                let modifier = self.next();
                let word = self.process(Some('}'))?;
                let value = self.lookup(&name).filter(|v| !v.is_empty());
                match modifier {
                    Some('-') => Ok(value.map(str::to_string).unwrap_or(word)),
                    Some('+') => Ok(if value.is_some() { word } else { String::new() }),
                    Some('?') => match value {
                        Some(v) => Ok(v.to_string()),
                        None if word.is_empty() => {
                            Err(self.error(format!("{}: is not allowed to be empty", name)))
                        }
                        None => Err(self.error(format!("{}: {}", name, word))),
                    },
                    Some(c) => Err(self.error(format!(
                        "unsupported modifier ({}) in substitution",
                        c
                    ))),
                    None => Err(self.error("missing '}' in substitution")),
                }
            }
            Some(_) => Err(self.error("missing ':' in substitution")),
            None => Err(self.error("missing '}' in substitution")),
        }
    }

    fn name(&mut self) -> String {
        let mut name = String::new();
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    name.push(c);
                    self.pos += 1;
                }
            }
            _ => {
                while let Some(c) = self.peek().filter(|c| is_name_char(*c)) {
                    name.push(c);
                    self.pos += 1;
                }
            }
        }
        name
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        self.env.get(name)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        [("APP", "myapp"), ("EMPTY", ""), ("DIR", "src/main")]
            .into_iter()
            .collect()
    }

    fn expand(word: &str) -> Result<String> {
        expand_word(word, &env(), '\\')
    }

    #[test]
    fn test_plain_word() {
        assert_eq!(expand("app.go").unwrap(), "app.go");
    }

    #[test]
    fn test_simple_variable() {
        assert_eq!(expand("$APP/main.go").unwrap(), "myapp/main.go");
        assert_eq!(expand("${APP}.tar").unwrap(), "myapp.tar");
    }

    #[test]
    fn test_unset_variable_is_empty() {
        assert_eq!(expand("pre${MISSING}post").unwrap(), "prepost");
        assert_eq!(expand("$MISSING").unwrap(), "");
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        assert_eq!(expand("cost$").unwrap(), "cost$");
        assert_eq!(expand("a$-b").unwrap(), "a$-b");
    }

    #[test]
    fn test_default_modifier() {
        assert_eq!(expand("${MISSING:-fallback}").unwrap(), "fallback");
        assert_eq!(expand("${EMPTY:-fallback}").unwrap(), "fallback");
        assert_eq!(expand("${APP:-fallback}").unwrap(), "myapp");
        assert_eq!(expand("${MISSING:-$DIR}/x").unwrap(), "src/main/x");
    }

    #[test]
    fn test_alternate_modifier() {
        assert_eq!(expand("${APP:+set}").unwrap(), "set");
        assert_eq!(expand("${EMPTY:+set}").unwrap(), "");
        assert_eq!(expand("${MISSING:+set}").unwrap(), "");
    }

    #[test]
    fn test_required_modifier() {
        assert_eq!(expand("${APP:?must be set}").unwrap(), "myapp");
        let err = expand("${MISSING:?must be set}").unwrap_err();
        assert!(err.to_string().contains("MISSING: must be set"));
    }

    #[test]
    fn test_escaped_dollar_is_literal() {
        assert_eq!(expand(r"\$APP").unwrap(), "$APP");
        assert_eq!(expand(r"a\ b").unwrap(), "a b");
    }

    #[test]
    fn test_trailing_escape_dropped() {
        assert_eq!(expand("abc\\").unwrap(), "abc");
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(expand("'$APP dir'").unwrap(), "$APP dir");
    }

    #[test]
    fn test_double_quotes_expand() {
        assert_eq!(expand("\"$APP dir\"").unwrap(), "myapp dir");
        assert_eq!(expand(r#""a\"b""#).unwrap(), "a\"b");
        assert_eq!(expand(r#""a\nb""#).unwrap(), "a\\nb");
    }

    #[test]
    fn test_custom_escape_character() {
        let result = expand_word(r"C:\src\`$APP", &env(), '`').unwrap();
        assert_eq!(result, r"C:\src\$APP");
    }

    #[test]
    fn test_unterminated_quotes() {
        assert!(matches!(
            expand("\"abc"),
            Err(DepsError::Expansion { .. })
        ));
        assert!(matches!(expand("'abc"), Err(DepsError::Expansion { .. })));
    }

    #[test]
    fn test_malformed_substitution() {
        assert!(expand("${APP").is_err());
        assert!(expand("${}").is_err());
        assert!(expand("${APP-x}").is_err());
        assert!(expand("${APP:=x}").is_err());
        assert!(expand("${MISSING:-x").is_err());
    }

    #[test]
    fn test_environment_from_pairs() {
        let env: Environment = [("B", "2"), ("A", "1")].into_iter().collect();
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_environment_overwrite() {
        let mut env = Environment::new();
        env.set("A", "1");
        env.set("A", "2");
        assert_eq!(env.get("A"), Some("2"));
        assert_eq!(env.len(), 1);
    }
}
