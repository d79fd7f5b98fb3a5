//! Fault-tolerant JSON parsing for model-generated text.
//!
//! Models asked for "strict JSON" still wrap replies in markdown fences, add
//! prose around the object, leave trailing commas, use single quotes or bare
//! keys, and sometimes stop before closing every bracket. This parser repairs
//! those cases and reports `ParseOutcome::Empty` instead of an error when the
//! text cannot be salvaged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("code fence pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Value),
    Empty,
}

impl ParseOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            ParseOutcome::Parsed(value) => Some(value),
            ParseOutcome::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ParseOutcome::Empty)
    }
}

/// Remove markdown code-fence delimiters such as "```json" and "```".
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

pub fn parse(text: &str) -> ParseOutcome {
    let stripped = strip_code_fences(text);
    let trimmed = stripped.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return ParseOutcome::Parsed(value);
    }

    let Some(candidate) = extract_balanced(trimmed) else {
        return ParseOutcome::Empty;
    };

    match serde_json::from_str(&normalize(&candidate)) {
        Ok(value) => ParseOutcome::Parsed(value),
        Err(e) => {
            tracing::debug!(error = %e, "lenient JSON parse gave up");
            ParseOutcome::Empty
        }
    }
}

/// First object or array in `text`, closing any brackets left open.
fn extract_balanced(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                if stack.is_empty() {
                    let end = start + offset + c.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }

    // Truncated reply: close whatever is still open.
    let mut repaired = text[start..].to_string();
    if let Some(q) = quote {
        repaired.push(q);
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    Some(repaired)
}

/// Rewrite relaxed JSON (comments, single quotes, bare words, trailing commas)
/// into strict JSON.
fn normalize(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                out.push(c);
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.') && next.is_some_and(|n| n.is_ascii_digit())) =>
            {
                while i < chars.len() && is_number_char(chars[i]) {
                    out.push(chars[i]);
                    i += 1;
                }
                continue;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_key = chars[i..]
                    .iter()
                    .find(|c| !c.is_whitespace())
                    .is_some_and(|c| *c == ':');

                if is_key {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    match word.as_str() {
                        "true" | "True" => out.push_str("true"),
                        "false" | "False" => out.push_str("false"),
                        "null" | "None" | "undefined" | "NaN" | "Infinity" => out.push_str("null"),
                        _ => {
                            out.push('"');
                            out.push_str(&word);
                            out.push('"');
                        }
                    }
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')
}

/// Copy a single- or double-quoted string as a double-quoted JSON string.
/// Returns the index just past the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    // \' is not a JSON escape
                    Some('\'') => out.push('\''),
                    Some(escaped) => {
                        out.push('\\');
                        out.push(*escaped);
                    }
                    None => {}
                }
                i += 2;
                continue;
            }
            c if c == quote => {
                out.push('"');
                return i + 1;
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    out.push('"');
    chars.len()
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}
