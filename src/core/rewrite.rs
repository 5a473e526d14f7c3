//! Regex based request path rewriting.
//!
//! A [`PathRewrite`] pairs a capture-group pattern with a replacement template
//! such as `/${segment}`. Templates are parsed and checked against the
//! pattern's groups when the route table is built, so a rewrite can only fail
//! at request time when the path does not match or an optional group did not
//! participate in the match.
use std::{fmt, str::FromStr};

use hyper::http::uri::PathAndQuery;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::core::error::RouteConfigError;

/// Request-time rewrite failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RewriteError {
    #[error("path '{path}' does not match rewrite pattern '{pattern}'")]
    NoMatch { path: String, pattern: String },

    #[error("group '{group}' of pattern '{pattern}' did not capture anything")]
    UnresolvedGroup { group: String, pattern: String },

    #[error("rewritten path '{path}' is invalid: {reason}")]
    InvalidPath { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Named(String),
    Index(usize),
}

impl fmt::Display for TemplatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplatePart::Literal(text) => f.write_str(text),
            TemplatePart::Named(name) => write!(f, "${{{name}}}"),
            TemplatePart::Index(index) => write!(f, "${{{index}}}"),
        }
    }
}

/// Parsed replacement template.
///
/// Supports `$name`, `${name}`, `$1`, `${1}` and `$$` for a literal dollar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteTemplate {
    source: String,
    parts: Vec<TemplatePart>,
}

impl RewriteTemplate {
    pub fn parse(template: &str) -> Result<Self, RouteConfigError> {
        let malformed = |reason: &str| RouteConfigError::MalformedTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            let reference = match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                    continue;
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(malformed("unterminated '${'")),
                        }
                    }
                    name
                }
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => {
                    let mut name = String::new();
                    while let Some(&ch) = chars.peek() {
                        if ch.is_ascii_alphanumeric() || ch == '_' {
                            name.push(ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    name
                }
                _ => return Err(malformed("'$' must be followed by a group reference or '$'")),
            };

            if reference.is_empty() {
                return Err(malformed("empty group reference"));
            }
            if !reference
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            {
                return Err(malformed(&format!("invalid group name '{reference}'")));
            }

            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            match reference.parse::<usize>() {
                Ok(index) => parts.push(TemplatePart::Index(index)),
                Err(_) => parts.push(TemplatePart::Named(reference)),
            }
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Reject references to groups the pattern does not define.
    fn check_against(&self, pattern: &Regex) -> Result<(), RouteConfigError> {
        for part in &self.parts {
            let known = match part {
                TemplatePart::Literal(_) => true,
                TemplatePart::Named(name) => pattern.capture_names().flatten().any(|n| n == name),
                TemplatePart::Index(index) => *index < pattern.captures_len(),
            };
            if !known {
                let group = match part {
                    TemplatePart::Named(name) => name.clone(),
                    other => other.to_string(),
                };
                return Err(RouteConfigError::UnknownGroup {
                    template: self.source.clone(),
                    group,
                    pattern: pattern.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    fn expand(&self, captures: &Captures<'_>, pattern: &str, out: &mut String) -> Result<(), RewriteError> {
        for part in &self.parts {
            let value = match part {
                TemplatePart::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                TemplatePart::Named(name) => captures.name(name),
                TemplatePart::Index(index) => captures.get(*index),
            };
            let value = value.ok_or_else(|| RewriteError::UnresolvedGroup {
                group: match part {
                    TemplatePart::Named(name) => name.clone(),
                    other => other.to_string(),
                },
                pattern: pattern.to_string(),
            })?;
            out.push_str(value.as_str());
        }
        Ok(())
    }
}

/// A compiled `pattern -> template` path transformation.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pattern: Regex,
    template: RewriteTemplate,
}

impl PathRewrite {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, RouteConfigError> {
        let regex = Regex::new(pattern).map_err(|source| RouteConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        let template = RewriteTemplate::parse(replacement)?;
        template.check_against(&regex)?;

        Ok(Self {
            pattern: regex,
            template,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn template(&self) -> &str {
        self.template.as_str()
    }

    /// Replace the first match of the pattern in `path` with the expanded
    /// template. Text outside the match is kept as is.
    pub fn rewrite(&self, path: &str) -> Result<String, RewriteError> {
        let captures = self
            .pattern
            .captures(path)
            .ok_or_else(|| RewriteError::NoMatch {
                path: path.to_string(),
                pattern: self.pattern.as_str().to_string(),
            })?;
        // group 0 always participates in a successful match
        let (start, end) = captures
            .get(0)
            .map(|m| (m.start(), m.end()))
            .unwrap_or((0, path.len()));

        let mut rewritten = String::with_capacity(path.len());
        rewritten.push_str(&path[..start]);
        self.template
            .expand(&captures, self.pattern.as_str(), &mut rewritten)?;
        rewritten.push_str(&path[end..]);

        if !rewritten.starts_with('/') {
            return Err(RewriteError::InvalidPath {
                path: rewritten,
                reason: "must start with '/'".to_string(),
            });
        }
        if rewritten.contains('?') {
            return Err(RewriteError::InvalidPath {
                path: rewritten,
                reason: "must not contain a query".to_string(),
            });
        }
        if let Err(e) = PathAndQuery::from_str(&rewritten) {
            return Err(RewriteError::InvalidPath {
                reason: e.to_string(),
                path: rewritten,
            });
        }

        Ok(rewritten)
    }
}
