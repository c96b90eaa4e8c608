// Local crates
use crate::parser::fields::{FieldValue, ParsedFields, field};

// External crates
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while compiling or learning a line pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern `{pattern}` at byte {position}: {reason}")]
    Syntax {
        pattern: String,
        position: usize,
        reason: String,
    },

    #[error("pattern `{pattern}` declares unknown field type `{kind}`")]
    UnknownType { pattern: String, kind: String },

    #[error("pattern `{pattern}` captures field `{field}` more than once")]
    DuplicateField { pattern: String, field: String },

    #[error("pattern `{pattern}` has no literal separating `{field}` from the previous field")]
    AdjacentCaptures { pattern: String, field: String },

    #[error("pattern `{pattern}` does not capture any field")]
    NoCaptures { pattern: String },

    #[error("pattern `{pattern}` compiled to an invalid regular expression")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no candidate pattern matches sample line `{sample}`")]
    NoPatternMatches { sample: String },
}

/// Type of a named capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    String,
    Int,
    Float,
    Duration,
    /// `"METHOD URI PROTOCOL"`, exploded into three string fields.
    Request,
}

impl FieldKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(FieldKind::String),
            "int" | "integer" => Some(FieldKind::Int),
            "float" => Some(FieldKind::Float),
            "duration" => Some(FieldKind::Duration),
            _ => None,
        }
    }
}

/// One element of a line pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Capture { field: String, kind: FieldKind },
}

/// Variables with a built-in type and canonical field name. Unknown
/// variables are captured as strings under their own name.
const WELL_KNOWN: &[(&str, &str, FieldKind)] = &[
    ("remote_addr", field::REMOTE_ADDR, FieldKind::String),
    ("remote_user", field::REMOTE_USER, FieldKind::String),
    ("time_local", "time_local", FieldKind::String),
    ("time_iso8601", "time_iso8601", FieldKind::String),
    ("request", field::REQUEST, FieldKind::Request),
    ("request_method", field::METHOD, FieldKind::String),
    ("method", field::METHOD, FieldKind::String),
    ("request_uri", field::URI, FieldKind::String),
    ("uri", field::URI, FieldKind::String),
    ("server_protocol", field::PROTOCOL, FieldKind::String),
    ("protocol", field::PROTOCOL, FieldKind::String),
    ("status", field::STATUS, FieldKind::Int),
    ("body_bytes_sent", field::BYTES_SENT, FieldKind::Int),
    ("bytes_sent", field::BYTES_SENT, FieldKind::Int),
    ("request_length", field::REQUEST_LENGTH, FieldKind::Int),
    ("request_time", field::REQUEST_TIME, FieldKind::Duration),
    (
        "upstream_response_time",
        field::UPSTREAM_RESPONSE_TIME,
        FieldKind::Duration,
    ),
    ("host", field::VHOST, FieldKind::String),
    ("vhost", field::VHOST, FieldKind::String),
    ("http_referer", "referer", FieldKind::String),
    ("http_user_agent", "user_agent", FieldKind::String),
    ("request_id", "request_id", FieldKind::String),
    ("user_defined", field::USER_DEFINED, FieldKind::String),
];

#[derive(Debug, Clone)]
struct Capture {
    group: String,
    field: String,
    kind: FieldKind,
}

/// A compiled line pattern. Immutable once built.
///
/// Patterns are written the way nginx writes a `log_format`:
///
/// ```text
/// $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent
/// ```
///
/// `${name:type}` overrides the type of a capture (`string`, `int`,
/// `float`, `duration`). Everything that is not a capture is a literal.
#[derive(Debug, Clone)]
pub struct Pattern {
    name: String,
    source: String,
    captures: Vec<Capture>,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern, validating only its syntax.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, PatternError> {
        let tokens = tokenize(source)?;
        check_fields(source, &tokens)?;

        let mut expression = String::from("^");
        let mut captures = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match token {
                Token::Literal(text) => expression.push_str(&regex::escape(text)),
                Token::Capture { field, kind } => {
                    let stop = match tokens.get(index + 1) {
                        Some(Token::Literal(text)) => text.chars().next(),
                        _ => None,
                    };
                    let group = format!("f{index}");
                    expression.push_str(&format!("(?P<{group}>{})", capture_body(*kind, stop)));
                    captures.push(Capture {
                        group,
                        field: field.clone(),
                        kind: *kind,
                    });
                }
            }
        }
        expression.push('$');

        let regex = Regex::new(&expression).map_err(|err| PatternError::Regex {
            pattern: source.to_string(),
            source: err,
        })?;

        Ok(Self {
            name: name.into(),
            source: source.to_string(),
            captures,
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Canonical field names this pattern produces, in line order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(|c| c.field.as_str())
    }

    /// Whether the whole line conforms to this pattern.
    pub fn is_match(&self, line: &str) -> bool {
        self.parse(line).is_some()
    }

    /// Apply the pattern to one line. `None` means the line is unmatched.
    pub fn parse(&self, line: &str) -> Option<ParsedFields> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = self.regex.captures(line)?;
        let mut fields = ParsedFields::default();

        for capture in &self.captures {
            let raw = caps.name(&capture.group)?.as_str();

            match capture.kind {
                FieldKind::String => {
                    fields.insert(capture.field.clone(), FieldValue::Str(raw.to_string()));
                }
                FieldKind::Request => {
                    fields.insert(capture.field.clone(), FieldValue::Str(raw.to_string()));
                    // A malformed request line ("-", garbage from scanners) keeps
                    // the raw value but contributes no method/uri/protocol.
                    let mut parts = raw.split_whitespace();
                    if let (Some(method), Some(uri), Some(protocol), None) =
                        (parts.next(), parts.next(), parts.next(), parts.next())
                    {
                        fields.insert(field::METHOD, FieldValue::Str(method.to_string()));
                        fields.insert(field::URI, FieldValue::Str(uri.to_string()));
                        fields.insert(field::PROTOCOL, FieldValue::Str(protocol.to_string()));
                    }
                }
                FieldKind::Int => {
                    if raw != "-" {
                        fields.insert(capture.field.clone(), FieldValue::Int(raw.parse().ok()?));
                    }
                }
                FieldKind::Float => {
                    if raw != "-" {
                        fields.insert(capture.field.clone(), FieldValue::Float(raw.parse().ok()?));
                    }
                }
                FieldKind::Duration => {
                    if raw != "-" {
                        fields.insert(capture.field.clone(), FieldValue::Duration(parse_duration(raw)?));
                    }
                }
            }
        }

        Some(fields)
    }
}

/// Parse a logged duration. Values with a decimal point are seconds
/// (nginx), bare integers are microseconds (Apache `%D`). Multiple upstream
/// attempts (`0.010, 0.020` or `0.010 : 0.020`) are summed.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;

    for part in raw.split([',', ':']) {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        let value = match part.split_once('.') {
            Some((whole, fraction)) => parse_decimal_seconds(whole, fraction)?,
            None => Duration::from_micros(part.parse().ok()?),
        };
        total = total.checked_add(value)?;
    }

    Some(total)
}

// Decimal seconds are parsed digit by digit; going through f64 turns
// values like 0.3 into 299.999ms.
fn parse_decimal_seconds(whole: &str, fraction: &str) -> Option<Duration> {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if fraction.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return None;
    }

    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let digits = &fraction[..fraction.len().min(9)];
    let nanos: u32 = format!("{digits:0<9}").parse().ok()?;

    Some(Duration::new(secs, nanos))
}

fn capture_body(kind: FieldKind, stop: Option<char>) -> String {
    match kind {
        FieldKind::Int => r"-?\d+|-".to_string(),
        FieldKind::Float => r"-?\d+(?:\.\d+)?|-".to_string(),
        FieldKind::Duration => r"\d+(?:\.\d+)?(?:(?:, | : )\d+(?:\.\d+)?)*|-".to_string(),
        FieldKind::String | FieldKind::Request => match stop {
            Some(c) => format!("[^{}]*", regex::escape(&c.to_string())),
            None => ".*".to_string(),
        },
    }
}

fn resolve(name: &str, explicit: Option<FieldKind>) -> (String, FieldKind) {
    match WELL_KNOWN.iter().find(|(var, _, _)| *var == name) {
        Some((_, canonical, kind)) => (canonical.to_string(), explicit.unwrap_or(*kind)),
        None => (name.to_string(), explicit.unwrap_or(FieldKind::String)),
    }
}

fn syntax(pattern: &str, position: usize, reason: &str) -> PatternError {
    PatternError::Syntax {
        pattern: pattern.to_string(),
        position,
        reason: reason.to_string(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, PatternError> {
    if source.trim().is_empty() {
        return Err(syntax(source, 0, "pattern is empty"));
    }

    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }

        let (name, explicit) = if matches!(chars.peek(), Some((_, '{'))) {
            chars.next();
            let mut body = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                body.push(c);
            }
            if !closed {
                return Err(syntax(source, position, "unterminated `${`"));
            }
            match body.split_once(':') {
                Some((name, kind)) => {
                    let kind = kind.trim();
                    let parsed = FieldKind::from_name(kind).ok_or_else(|| PatternError::UnknownType {
                        pattern: source.to_string(),
                        kind: kind.to_string(),
                    })?;
                    (name.trim().to_string(), Some(parsed))
                }
                None => (body.trim().to_string(), None),
            }
        } else {
            let mut name = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            (name, None)
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(syntax(source, position, "expected a field name after `$`"));
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        } else if matches!(tokens.last(), Some(Token::Capture { .. })) {
            return Err(PatternError::AdjacentCaptures {
                pattern: source.to_string(),
                field: name,
            });
        }

        let (field, kind) = resolve(&name, explicit);
        tokens.push(Token::Capture { field, kind });
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(tokens)
}

fn check_fields(source: &str, tokens: &[Token]) -> Result<(), PatternError> {
    let mut seen = HashSet::new();
    let mut any = false;

    for token in tokens {
        let Token::Capture { field, kind } = token else {
            continue;
        };
        any = true;

        let produced: &[&str] = if *kind == FieldKind::Request {
            &[field::METHOD, field::URI, field::PROTOCOL]
        } else {
            &[]
        };

        for name in std::iter::once(field.as_str()).chain(produced.iter().copied()) {
            if !seen.insert(name.to_string()) {
                return Err(PatternError::DuplicateField {
                    pattern: source.to_string(),
                    field: name.to_string(),
                });
            }
        }
    }

    if !any {
        return Err(PatternError::NoCaptures {
            pattern: source.to_string(),
        });
    }

    Ok(())
}
