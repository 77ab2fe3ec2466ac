//! Report templates with named placeholders.
//!
//! A template is literal text with `{name}` or `{name:.N}` / `{name:.Nf}` placeholders,
//! where `N` is the number of fractional digits. `{{` and `}}` stand for literal braces.

use std::fmt::{self, Write};
use std::mem;
use std::time::Duration;

use crate::{Error, Result};

/// A value that can be substituted into a placeholder.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Value<'a> {
    Text(&'a str),
    Seconds(Duration),
    Count(u64),
}

#[derive(Debug)]
enum Piece {
    Literal(String),
    Field {
        index: usize,
        precision: Option<usize>,
    },
}

/// A parsed template that refers to its placeholders by position in a field list.
#[derive(Debug)]
pub(crate) struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    /// Parses `source`, accepting only the placeholders named in `fields`.
    ///
    /// Values are later supplied to [`render()`](Self::render) in the same order as `fields`.
    pub(crate) fn parse(source: &str, fields: &[&str]) -> Result<Self> {
        let invalid = |problem: String| Error::InvalidTemplate {
            template: source.to_string(),
            problem,
        };

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(position) = rest.find(['{', '}']) {
            let (before, from_brace) = rest.split_at(position);
            literal.push_str(before);

            if let Some(after) = from_brace.strip_prefix("{{") {
                literal.push('{');
                rest = after;
            } else if let Some(after) = from_brace.strip_prefix("}}") {
                literal.push('}');
                rest = after;
            } else if let Some(after) = from_brace.strip_prefix('{') {
                let (body, after_body) = after
                    .split_once('}')
                    .ok_or_else(|| invalid("placeholder is not closed with '}'".to_string()))?;

                let (name, spec) = body.split_once(':').unwrap_or((body, ""));

                let index = fields
                    .iter()
                    .position(|field| *field == name)
                    .ok_or_else(|| {
                        invalid(format!(
                            "unknown placeholder '{name}', expected one of: {}",
                            fields.join(", ")
                        ))
                    })?;

                let precision = parse_spec(spec).ok_or_else(|| {
                    invalid(format!(
                        "unsupported format specification '{spec}' for '{name}'"
                    ))
                })?;

                if !literal.is_empty() {
                    pieces.push(Piece::Literal(mem::take(&mut literal)));
                }
                pieces.push(Piece::Field { index, precision });

                rest = after_body;
            } else {
                return Err(invalid("single '}' is not allowed, use '}}'".to_string()));
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self { pieces })
    }

    /// Appends the template to `out`, taking placeholder values from `values`.
    ///
    /// `values` must be in the same order as the field list the template was parsed with.
    pub(crate) fn render(&self, values: &[Value<'_>], out: &mut String) {
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field { index, precision } => {
                    if let Some(value) = values.get(*index) {
                        write_value(out, *value, *precision)
                            .expect("writing to a String cannot fail");
                    }
                }
            }
        }
    }

    /// Renders the template into a new string.
    pub(crate) fn render_to_string(&self, values: &[Value<'_>]) -> String {
        let mut out = String::new();
        self.render(values, &mut out);
        out
    }
}

// Accepts "", ".N" and ".Nf". The outer `None` means the spec is malformed.
#[expect(
    clippy::option_option,
    reason = "distinguishes a malformed spec from a spec without precision"
)]
fn parse_spec(spec: &str) -> Option<Option<usize>> {
    if spec.is_empty() {
        return Some(None);
    }

    let digits = spec.strip_prefix('.')?;
    let digits = digits.strip_suffix('f').unwrap_or(digits);

    digits.parse::<usize>().ok().map(Some)
}

fn write_value(out: &mut String, value: Value<'_>, precision: Option<usize>) -> fmt::Result {
    match (value, precision) {
        (Value::Text(text), None) => write!(out, "{text}"),
        (Value::Text(text), Some(max_chars)) => {
            out.extend(text.chars().take(max_chars));
            Ok(())
        }
        (Value::Seconds(duration), None) => write!(out, "{}", duration.as_secs_f64()),
        (Value::Seconds(duration), Some(digits)) => {
            write!(out, "{:.digits$}", duration.as_secs_f64())
        }
        (Value::Count(count), None) => write!(out, "{count}"),
        (Value::Count(count), Some(digits)) => {
            #[expect(
                clippy::cast_precision_loss,
                reason = "counts shown with fractional digits are for display only"
            )]
            let count = count as f64;
            write!(out, "{count:.digits$}")
        }
    }
}
