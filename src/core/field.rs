/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt::{self, Display};

use crate::core::address::{parse_address_list, Addr};
use crate::core::date;

/// Default column where field bodies are folded on emission.
pub const DEFAULT_WRAP: usize = 72;

/// One RFC 2822 header field.
///
/// The body is stored in its folded form; continuation lines are separated
/// by `\n` followed by the continuation's leading whitespace. Lookups on the
/// name are case-insensitive, display keeps the original capitalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    body: String,
}

impl Field {
    /// Creates a field, folding the body when it exceeds the wrap width.
    ///
    /// Returns `None` when the name contains characters not allowed in a
    /// field name.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Option<Field> {
        let name = name.into();
        if name.is_empty()
            || !name
                .bytes()
                .all(|ch| ch.is_ascii_graphic() && ch != b':')
        {
            return None;
        }
        let body = body.into();
        let body = if body.trim().contains('\n') || body.len() + name.len() + 2 > DEFAULT_WRAP {
            fold_body(name.len() + 2, body.trim(), DEFAULT_WRAP)
        } else {
            body.trim().to_string()
        };
        Some(Field { name, body })
    }

    /// Builds a field from parser output, keeping the folded body verbatim.
    pub fn parse(name: impl Into<String>, folded_body: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            body: folded_body.into(),
        }
    }

    /// Display-case field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercase name used for lookups.
    pub fn lname(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The folded body as stored.
    pub fn folded_body(&self) -> &str {
        &self.body
    }

    /// The body with folding removed.
    pub fn unfolded_body(&self) -> String {
        unfold(&self.body)
    }

    /// The unfolded body up to the first top-level `;`.
    pub fn body(&self) -> String {
        let unfolded = self.unfolded_body();
        match top_level_semicolon(&unfolded) {
            Some(pos) => unfolded[..pos].trim_end().to_string(),
            None => unfolded,
        }
    }

    /// Whatever follows the first top-level `;`, if anything.
    pub fn comment(&self) -> Option<String> {
        let unfolded = self.unfolded_body();
        top_level_semicolon(&unfolded).map(|pos| unfolded[pos + 1..].trim().to_string())
    }

    /// `key=value` pairs from the attribute section of a structured body.
    ///
    /// Quoted-string values lose their quotes; backslash escapes inside them
    /// are resolved. Keys compare case-insensitively, so they are returned
    /// lowercased.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let unfolded = self.unfolded_body();
        let section = match top_level_semicolon(&unfolded) {
            Some(pos) => &unfolded[pos + 1..],
            None => return Vec::new(),
        };
        parse_attributes(section)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Sets or replaces one attribute, rewriting the attribute section.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let base = self.body();
        let mut attributes = self.attributes();
        let lname = name.to_ascii_lowercase();
        if let Some(entry) = attributes.iter_mut().find(|(key, _)| *key == lname) {
            entry.1 = value.to_string();
        } else {
            attributes.push((lname, value.to_string()));
        }

        let mut body = base;
        for (key, value) in &attributes {
            body.push_str("; ");
            body.push_str(key);
            body.push('=');
            if needs_quoting(value) {
                body.push('"');
                for ch in value.chars() {
                    if ch == '"' || ch == '\\' {
                        body.push('\\');
                    }
                    body.push(ch);
                }
                body.push('"');
            } else {
                body.push_str(value);
            }
        }
        self.body = if body.len() + self.name.len() + 2 > DEFAULT_WRAP {
            fold_body(self.name.len() + 2, &body, DEFAULT_WRAP)
        } else {
            body
        };
    }

    /// Parses the body as an RFC 2822 address list; groups are flattened.
    pub fn addresses(&self) -> Vec<Addr> {
        parse_address_list(&self.unfolded_body())
    }

    /// The body with comments and folding whitespace removed.
    pub fn strip_cfws(&self) -> String {
        strip_cfws(&self.unfolded_body())
    }

    /// The body parsed as an RFC 2822 date, as seconds since the epoch.
    pub fn timestamp(&self) -> Option<i64> {
        date::parse_date(&self.unfolded_body())
    }

    /// Whether this field may be shown to third parties. False only for
    /// `Bcc` and `Resent-Bcc`.
    pub fn to_disclose(&self) -> bool {
        !self.matches("bcc") && !self.matches("resent-bcc")
    }

    /// Whether the field body has a defined structure.
    pub fn is_structured(&self) -> bool {
        is_structured(&self.name)
    }

    /// The canonical display capitalization of the field name.
    pub fn wellformed_name(&self) -> String {
        wellformed_name(&self.name)
    }

    /// Writes the field using the given line separator.
    pub fn write(&self, out: &mut impl std::io::Write, eol: &str) -> std::io::Result<()> {
        out.write_all(self.name.as_bytes())?;
        out.write_all(b": ")?;
        let mut first = true;
        for line in self.body.split('\n') {
            if !first {
                out.write_all(eol.as_bytes())?;
            }
            first = false;
            out.write_all(line.as_bytes())?;
        }
        out.write_all(eol.as_bytes())
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\n", self.name, self.body)
    }
}

/// Removes folding: every newline plus the following whitespace run becomes
/// a single space.
pub fn unfold(folded: &str) -> String {
    let mut out = String::with_capacity(folded.len());
    let mut lines = folded.split('\n');
    if let Some(first) = lines.next() {
        out.push_str(first.trim_end_matches('\r'));
    }
    for line in lines {
        out.push(' ');
        out.push_str(line.trim_start().trim_end_matches('\r'));
    }
    out.trim().to_string()
}

/// Folds a body to the wrap width, breaking after commas and otherwise
/// before whitespace. `first_indent` is the width already taken by
/// `Name: ` on the first line.
pub fn fold_body(first_indent: usize, body: &str, wrap: usize) -> String {
    let body = unfold(body);
    let mut out = String::with_capacity(body.len() + 16);
    let mut line_len = first_indent;
    let mut pending = String::new();

    let mut flush = |out: &mut String, line_len: &mut usize, pending: &mut String| {
        if pending.is_empty() {
            return;
        }
        if *line_len + pending.trim_start().len() > wrap && *line_len > first_indent.min(10) {
            out.push_str("\n ");
            *line_len = 1;
            let trimmed = pending.trim_start();
            out.push_str(trimmed);
            *line_len += trimmed.len();
        } else {
            out.push_str(pending);
            *line_len += pending.len();
        }
        pending.clear();
    };

    let mut chunk_start = 0;
    let bytes = body.as_bytes();
    for (pos, &ch) in bytes.iter().enumerate() {
        // A chunk ends after a comma or right before whitespace.
        if ch == b',' {
            pending.push_str(&body[chunk_start..=pos]);
            chunk_start = pos + 1;
            flush(&mut out, &mut line_len, &mut pending);
        } else if ch == b' ' && pos > chunk_start {
            pending.push_str(&body[chunk_start..pos]);
            chunk_start = pos;
            flush(&mut out, &mut line_len, &mut pending);
        }
    }
    pending.push_str(&body[chunk_start..]);
    flush(&mut out, &mut line_len, &mut pending);

    if out.is_empty() {
        body
    } else {
        out
    }
}

/// Position of the first `;` outside of quoted strings and comments.
fn top_level_semicolon(value: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut comment_depth = 0u32;
    let mut escaped = false;
    for (pos, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' if comment_depth == 0 => in_quote = !in_quote,
            '(' if !in_quote => comment_depth += 1,
            ')' if !in_quote && comment_depth > 0 => comment_depth -= 1,
            ';' if !in_quote && comment_depth == 0 => return Some(pos),
            _ => {}
        }
    }
    None
}

fn parse_attributes(section: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut chars = section.chars().peekable();

    loop {
        // key
        let mut key = String::new();
        for ch in chars.by_ref() {
            if ch == '=' {
                break;
            }
            if ch == ';' {
                key.clear();
                continue;
            }
            if !ch.is_whitespace() {
                key.push(ch);
            }
        }
        if key.is_empty() {
            break;
        }

        // value, possibly quoted
        while matches!(chars.peek(), Some(ch) if ch.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for ch in chars.by_ref() {
                if escaped {
                    value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    break;
                } else {
                    value.push(ch);
                }
            }
            // skip to the next separator
            for ch in chars.by_ref() {
                if ch == ';' {
                    break;
                }
            }
        } else {
            for ch in chars.by_ref() {
                if ch == ';' {
                    break;
                }
                value.push(ch);
            }
            value = value.trim().to_string();
        }

        attributes.push((key.to_ascii_lowercase(), value));
    }

    attributes
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|ch| !ch.is_ascii_alphanumeric() && !matches!(ch, '-' | '_' | '.' | '+' | '/'))
}

/// Removes comments and reduces folding whitespace in a structured value.
pub fn strip_cfws(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut comment_depth = 0u32;
    let mut in_quote = false;
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            if comment_depth == 0 {
                out.push(ch);
            }
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                if comment_depth == 0 && in_quote {
                    out.push(ch);
                }
            }
            '"' if comment_depth == 0 => {
                in_quote = !in_quote;
                out.push(ch);
            }
            '(' if !in_quote => comment_depth += 1,
            ')' if !in_quote && comment_depth > 0 => comment_depth -= 1,
            _ if comment_depth > 0 => {}
            _ => out.push(ch),
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut last_space = false;
    for ch in out.trim().chars() {
        if ch.is_whitespace() {
            if !last_space {
                collapsed.push(' ');
            }
            last_space = true;
        } else {
            collapsed.push(ch);
            last_space = false;
        }
    }
    collapsed
}

// Names whose canonical display form is not produced by capitalizing each
// dash-separated part.
static WELLFORMED: &[(&str, &str)] = &[
    ("content-id", "Content-ID"),
    ("content-md5", "Content-MD5"),
    ("in-reply-to", "In-Reply-To"),
    ("list-id", "List-ID"),
    ("message-id", "Message-ID"),
    ("mime-version", "MIME-Version"),
    ("resent-message-id", "Resent-Message-ID"),
];

/// Canonical display capitalization for a field name.
pub fn wellformed_name(name: &str) -> String {
    let lname = name.to_ascii_lowercase();
    if let Some((_, display)) = WELLFORMED.iter().find(|(key, _)| *key == lname) {
        return display.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut capitalize = true;
    for ch in lname.chars() {
        if capitalize {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        capitalize = ch == '-';
    }
    out
}

static STRUCTURED: &[&str] = &[
    "bcc",
    "cc",
    "content-description",
    "content-disposition",
    "content-id",
    "content-length",
    "content-transfer-encoding",
    "content-type",
    "date",
    "from",
    "in-reply-to",
    "keywords",
    "lines",
    "message-id",
    "mime-version",
    "received",
    "references",
    "reply-to",
    "resent-bcc",
    "resent-cc",
    "resent-date",
    "resent-from",
    "resent-message-id",
    "resent-sender",
    "resent-to",
    "return-path",
    "sender",
    "status",
    "to",
    "x-status",
];

pub fn is_structured(name: &str) -> bool {
    let lname = name.to_ascii_lowercase();
    STRUCTURED.binary_search(&lname.as_str()).is_ok()
}
