//! `<name>` placeholder rendering for JSON query templates.
//!
//! A template is ordinary JSON text with tokens of the form `<identifier>`
//! where the identifier is one or more ASCII letters, digits or
//! underscores. Anything else between angle brackets is left alone.
//!
//! Replacement values are escaped for a JSON string context and are never
//! scanned again, so a value that itself looks like `<token>` stays
//! literal.
//!
//! ```rust
//! use std::collections::HashMap;
//! use archive_sync_core::template::QueryTemplate;
//!
//! let tmpl = QueryTemplate::new(r#"{"query":{"term":{"_id":"<id>"}}}"#);
//! let params = HashMap::from([("id".to_string(), "abc".to_string())]);
//! assert_eq!(tmpl.render(&params).unwrap(), r#"{"query":{"term":{"_id":"abc"}}}"#);
//! ```

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{BatchError, BatchResult};

/// Parameters for one item, keyed by token name.
pub type Params = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(String),
}

/// A query template, pre-split into literal text and tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl QueryTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = split_segments(&source);
        Self { source, segments }
    }

    /// The template text as supplied.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Token names in first-to-last order, duplicates included.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every token from `params`.
    ///
    /// Fails with [`BatchError::MissingParameter`] on the first token
    /// without a value.
    pub fn render(&self, params: &Params) -> BatchResult<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| BatchError::MissingParameter(name.clone()))?;
                    push_escaped(&mut out, value);
                }
            }
        }
        Ok(out)
    }
}

fn split_segments(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = source;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let ident_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());

        if ident_len > 0 && after[ident_len..].starts_with('>') {
            literal.push_str(&rest[..open]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(after[..ident_len].to_string()));
            rest = &after[ident_len + 1..];
        } else {
            literal.push_str(&rest[..=open]);
            rest = after;
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Append `value` as the inside of a JSON string literal.
fn push_escaped(out: &mut String, value: &str) {
    let quoted = Value::from(value).to_string();
    out.push_str(&quoted[1..quoted.len() - 1]);
}
