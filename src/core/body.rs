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

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;

use crate::core::field::Field;
use crate::core::message::Message;
use crate::decoders::{base64, quoted_printable};
use crate::parsers::source::{split_lines, MailSource};
use crate::{Error, LineEnding, Result};

/// MIME transfer encoding of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Not encoded at all; the plain form bodies converge to when decoded.
    #[default]
    None,
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl Encoding {
    pub fn from_token(token: &str) -> Encoding {
        match token.trim().to_ascii_lowercase().as_str() {
            "7bit" => Encoding::SevenBit,
            "8bit" => Encoding::EightBit,
            "binary" => Encoding::Binary,
            "quoted-printable" => Encoding::QuotedPrintable,
            "base64" => Encoding::Base64,
            _ => Encoding::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::None => "none",
            Encoding::SevenBit => "7bit",
            Encoding::EightBit => "8bit",
            Encoding::Binary => "binary",
            Encoding::QuotedPrintable => "quoted-printable",
            Encoding::Base64 => "base64",
        }
    }

    /// Whether the stored form differs from the decoded form.
    pub fn is_coded(&self) -> bool {
        matches!(self, Encoding::QuotedPrintable | Encoding::Base64)
    }
}

/// A body that still lives in the folder file as a byte range.
#[derive(Debug, Clone)]
pub struct Delayed {
    pub begin: u64,
    pub end: u64,
    pub lines: Option<u32>,
    /// The range covers a whole message file whose header must be skipped
    /// at load time (one-file-per-message folders).
    pub(crate) skip_header: bool,
    pub(crate) source: Weak<RefCell<MailSource>>,
}

/// An ordered list of parts with optional preamble and epilogue.
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    pub preamble: Option<Box<Body>>,
    pub parts: Vec<Message>,
    pub epilogue: Option<Box<Body>>,
}

/// A file-backed payload, streamed on demand.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub(crate) file: Rc<NamedTempFile>,
    pub size: u64,
    pub lines: u32,
}

/// The payload representation of a [`Body`].
#[derive(Debug, Clone)]
pub enum BodyContent {
    /// Fully in memory, one string per line, terminators included.
    Lines(Vec<String>),
    /// Fully in memory as a single string.
    Text(String),
    /// Backed by a temporary file outside the folder.
    File(FileContent),
    /// Not read yet; loading goes through the folder's parser.
    Delayed(Delayed),
    /// Child parts separated by a boundary.
    Multipart(Multipart),
    /// Exactly one encapsulated `message/rfc822` message.
    Nested(Box<Message>),
}

impl Default for BodyContent {
    fn default() -> Self {
        BodyContent::Text(String::new())
    }
}

static BODY_SEQ: AtomicU64 = AtomicU64::new(0);
static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seqnr() -> u64 {
    BODY_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Synthesizes a boundary token unlikely to appear in content.
pub fn create_boundary() -> String {
    format!(
        "boundary-{}-{}",
        std::process::id(),
        BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// A message payload with its MIME metadata.
///
/// Content is effectively immutable: every transformation returns a new
/// body. Only metadata (ranges, flags) mutates in place. The exception is
/// the delayed-to-concrete transition, which swaps the representation
/// without changing the logical content.
#[derive(Debug, Clone)]
pub struct Body {
    content: BodyContent,
    mime_type: Field,
    encoding: Encoding,
    disposition: Option<Field>,
    eol: LineEnding,
    checked: bool,
    modified: bool,
    range: Option<(u64, u64)>,
    seqnr: u64,
}

impl Default for Body {
    fn default() -> Self {
        Body {
            content: BodyContent::default(),
            mime_type: Field::parse("Content-Type", "text/plain; charset=us-ascii"),
            encoding: Encoding::None,
            disposition: None,
            eol: LineEnding::default(),
            checked: false,
            modified: false,
            range: None,
            seqnr: next_seqnr(),
        }
    }
}

impl Body {
    pub fn from_text(text: impl Into<String>) -> Body {
        Body {
            content: BodyContent::Text(text.into()),
            ..Body::default()
        }
    }

    pub fn from_lines(lines: Vec<String>) -> Body {
        Body {
            content: BodyContent::Lines(lines),
            ..Body::default()
        }
    }

    pub fn from_file(file: NamedTempFile, size: u64, lines: u32) -> Body {
        Body {
            content: BodyContent::File(FileContent {
                file: Rc::new(file),
                size,
                lines,
            }),
            ..Body::default()
        }
    }

    pub fn delayed(
        begin: u64,
        end: u64,
        lines: Option<u32>,
        source: Weak<RefCell<MailSource>>,
    ) -> Body {
        Body {
            content: BodyContent::Delayed(Delayed {
                begin,
                end,
                lines,
                skip_header: false,
                source,
            }),
            range: Some((begin, end)),
            ..Body::default()
        }
    }

    /// A delayed body covering a whole message file; the header is skipped
    /// when the body is finally read.
    pub fn delayed_file(file_size: u64, source: Weak<RefCell<MailSource>>) -> Body {
        Body {
            content: BodyContent::Delayed(Delayed {
                begin: 0,
                end: file_size,
                lines: None,
                skip_header: true,
                source,
            }),
            range: Some((0, file_size)),
            ..Body::default()
        }
    }

    pub fn multipart(multipart: Multipart) -> Body {
        let mut body = Body {
            content: BodyContent::Multipart(multipart),
            mime_type: Field::parse("Content-Type", "multipart/mixed"),
            ..Body::default()
        };
        body.ensure_boundary();
        body
    }

    pub fn nested(message: Message) -> Body {
        Body {
            content: BodyContent::Nested(Box::new(message)),
            mime_type: Field::parse("Content-Type", "message/rfc822"),
            ..Body::default()
        }
    }

    pub fn with_mime_type(mut self, mime_type: Field) -> Body {
        self.mime_type = mime_type;
        if self.is_multipart() {
            self.ensure_boundary();
        }
        self
    }

    pub fn with_type(self, value: &str) -> Body {
        self.with_mime_type(Field::parse("Content-Type", value))
    }

    pub fn with_charset(mut self, charset: &str) -> Body {
        self.mime_type.set_attribute("charset", charset);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Body {
        self.encoding = encoding;
        self
    }

    pub fn with_disposition(mut self, disposition: Field) -> Body {
        self.disposition = Some(disposition);
        self
    }

    pub fn with_eol(mut self, eol: LineEnding) -> Body {
        self.eol = eol;
        self
    }

    pub fn mime_type(&self) -> &Field {
        &self.mime_type
    }

    /// The type without attributes, e.g. `text/plain`.
    pub fn type_name(&self) -> String {
        let name = self.mime_type.body();
        if name.is_empty() {
            "text/plain".to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    pub fn charset(&self) -> Option<String> {
        self.mime_type.attribute("charset")
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn disposition(&self) -> Option<&Field> {
        self.disposition.as_ref()
    }

    pub fn eol(&self) -> LineEnding {
        self.eol
    }

    pub fn seqnr(&self) -> u64 {
        self.seqnr
    }

    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub fn set_range(&mut self, range: Option<(u64, u64)>) {
        self.range = range;
    }

    pub(crate) fn move_location(&mut self, delta: i64) {
        if let Some((begin, end)) = self.range {
            self.range = Some((
                begin.wrapping_add_signed(delta),
                end.wrapping_add_signed(delta),
            ));
        }
        if let BodyContent::Delayed(delayed) = &mut self.content {
            delayed.begin = delayed.begin.wrapping_add_signed(delta);
            delayed.end = delayed.end.wrapping_add_signed(delta);
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
            || match &self.content {
                BodyContent::Multipart(mp) => mp.parts.iter().any(|part| part.is_modified()),
                BodyContent::Nested(inner) => inner.is_modified(),
                _ => false,
            }
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
        match &mut self.content {
            BodyContent::Multipart(mp) => {
                for part in &mut mp.parts {
                    part.reset_modified();
                }
            }
            BodyContent::Nested(inner) => inner.reset_modified(),
            _ => {}
        }
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self.content, BodyContent::Delayed(_))
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.content, BodyContent::Multipart(_))
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.content, BodyContent::Nested(_))
    }

    pub fn is_text(&self) -> bool {
        self.type_name().starts_with("text/")
    }

    pub fn is_binary(&self) -> bool {
        !self.is_text() && !self.is_multipart() && !self.is_nested()
    }

    pub fn content(&self) -> &BodyContent {
        &self.content
    }

    pub fn as_multipart(&self) -> Option<&Multipart> {
        match &self.content {
            BodyContent::Multipart(mp) => Some(mp),
            _ => None,
        }
    }

    pub fn as_multipart_mut(&mut self) -> Option<&mut Multipart> {
        match &mut self.content {
            BodyContent::Multipart(mp) => Some(mp),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Message> {
        match &self.content {
            BodyContent::Nested(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_nested_mut(&mut self) -> Option<&mut Message> {
        match &mut self.content {
            BodyContent::Nested(inner) => Some(inner),
            _ => None,
        }
    }

    /// The boundary attribute of a multipart type, when present.
    pub fn boundary(&self) -> Option<String> {
        self.mime_type.attribute("boundary")
    }

    /// Guarantees a boundary attribute, synthesizing one when missing.
    pub fn ensure_boundary(&mut self) -> String {
        match self.mime_type.attribute("boundary") {
            Some(boundary) if !boundary.is_empty() => boundary,
            _ => {
                let boundary = create_boundary();
                self.mime_type.set_attribute("boundary", &boundary);
                boundary
            }
        }
    }

    /// Loads a delayed body in place. Loading is idempotent; anything
    /// already concrete is left alone.
    pub fn load(&mut self) -> Result<()> {
        let delayed = match &self.content {
            BodyContent::Delayed(delayed) => delayed.clone(),
            _ => return Ok(()),
        };
        let source = delayed
            .source
            .upgrade()
            .ok_or_else(|| Error::Usage("delayed body outlived its folder".into()))?;
        let mut source = source.borrow_mut();
        let was_open = source.is_open();
        if !was_open {
            source.start(false)?;
        }
        let text = if delayed.skip_header {
            source.seek_to(delayed.begin)?;
            let _ = source.read_header()?;
            let (_, text) = source.body_as_string(None, None)?;
            text
        } else {
            source.read_range_as_string(delayed.begin, delayed.end)?
        };
        if !was_open {
            source.stop();
        }
        self.content = BodyContent::Text(text);
        self.checked = true;
        Ok(())
    }

    /// The body as lines, terminators included. Deleted parts of a
    /// multipart are elided.
    pub fn lines(&mut self) -> Result<Vec<String>> {
        self.load()?;
        if self.is_multipart() || self.is_nested() {
            let mut buffer = Vec::new();
            self.write_content(&mut buffer)?;
            return Ok(split_lines(&buffer));
        }
        match &self.content {
            BodyContent::Lines(lines) => Ok(lines.clone()),
            BodyContent::Text(text) => Ok(split_lines(text.as_bytes())),
            BodyContent::File(content) => {
                let mut data = Vec::with_capacity(content.size as usize);
                content.file.reopen()?.read_to_end(&mut data)?;
                Ok(split_lines(&data))
            }
            _ => unreachable!("loaded above"),
        }
    }

    /// The body as one string, the concatenation of its lines.
    pub fn string(&mut self) -> Result<String> {
        self.load()?;
        if let BodyContent::Text(text) = &self.content {
            return Ok(text.clone());
        }
        Ok(self.lines()?.concat())
    }

    /// A readable stream over the body bytes.
    pub fn reader(&mut self) -> Result<Box<dyn Read>> {
        self.load()?;
        if let BodyContent::File(content) = &self.content {
            return Ok(Box::new(content.file.reopen()?));
        }
        Ok(Box::new(std::io::Cursor::new(
            self.string()?.into_bytes(),
        )))
    }

    /// Size in bytes under the current line-ending discipline. Delayed
    /// bodies answer from their recorded range without loading.
    pub fn size(&self) -> u64 {
        match &self.content {
            BodyContent::Lines(lines) => lines.iter().map(|l| l.len() as u64).sum(),
            BodyContent::Text(text) => text.len() as u64,
            BodyContent::File(content) => content.size,
            BodyContent::Delayed(delayed) => delayed.end - delayed.begin,
            BodyContent::Multipart(mp) => {
                let boundary_len = self.boundary().map(|b| b.len()).unwrap_or(8) as u64 + 4;
                let mut size = mp
                    .preamble
                    .as_ref()
                    .map(|preamble| preamble.size())
                    .unwrap_or(0);
                for part in mp.parts.iter().filter(|part| !part.is_deleted()) {
                    size += boundary_len + part.size();
                }
                size + boundary_len
                    + 2
                    + mp.epilogue.as_ref().map(|epilogue| epilogue.size()).unwrap_or(0)
            }
            BodyContent::Nested(inner) => inner.size(),
        }
    }

    /// Number of lines; includes the inner header for nested messages.
    pub fn nr_lines(&self) -> u32 {
        match &self.content {
            BodyContent::Lines(lines) => lines.len() as u32,
            BodyContent::Text(text) => text.bytes().filter(|&b| b == b'\n').count() as u32
                + if text.ends_with('\n') || text.is_empty() {
                    0
                } else {
                    1
                },
            BodyContent::File(content) => content.lines,
            BodyContent::Delayed(delayed) => delayed.lines.unwrap_or(0),
            BodyContent::Multipart(mp) => {
                let mut lines = mp
                    .preamble
                    .as_ref()
                    .map(|preamble| preamble.nr_lines())
                    .unwrap_or(0);
                for part in mp.parts.iter().filter(|part| !part.is_deleted()) {
                    lines += 1 + part.nr_lines();
                }
                lines
                    + 1
                    + mp.epilogue
                        .as_ref()
                        .map(|epilogue| epilogue.nr_lines())
                        .unwrap_or(0)
            }
            BodyContent::Nested(inner) => inner.nr_lines(),
        }
    }

    /// Serializes the stored (still encoded) content.
    pub fn write_content(&mut self, out: &mut impl Write) -> Result<()> {
        self.load()?;
        let eol = self.eol.as_str().to_string();

        if self.is_multipart() {
            let boundary = self.ensure_boundary();
            let mp = self.as_multipart_mut().expect("checked above");
            if let Some(preamble) = mp.preamble.as_mut() {
                preamble.write_content(out)?;
            }
            for part in mp.parts.iter_mut().filter(|part| !part.is_deleted()) {
                write!(out, "--{}{}", boundary, eol)?;
                part.write_to(out)?;
            }
            write!(out, "--{}--{}", boundary, eol)?;
            if let Some(epilogue) = mp.epilogue.as_mut() {
                epilogue.write_content(out)?;
            }
            return Ok(());
        }
        if let BodyContent::Nested(inner) = &mut self.content {
            return inner.write_to(out);
        }

        match &mut self.content {
            BodyContent::Lines(lines) => {
                for line in lines {
                    out.write_all(line.as_bytes())?;
                }
            }
            BodyContent::Text(text) => out.write_all(text.as_bytes())?,
            BodyContent::File(content) => {
                std::io::copy(&mut content.file.reopen()?, out)?;
            }
            _ => unreachable!("loaded above"),
        }
        Ok(())
    }

    /// A body with transfer encoding `none` and, by default, type
    /// `text/plain; charset=us-ascii`.
    pub fn decoded(&mut self) -> Result<Body> {
        self.decoded_as(Field::parse("Content-Type", "text/plain; charset=us-ascii"))
    }

    /// Like [`decoded`], with a caller-specified result type.
    pub fn decoded_as(&mut self, mime_type: Field) -> Result<Body> {
        if !self.encoding.is_coded() {
            let mut body = self.clone();
            body.encoding = Encoding::None;
            body.checked = true;
            body.seqnr = next_seqnr();
            return Ok(body);
        }
        let text = self.string()?;
        let bytes = match self.encoding {
            Encoding::Base64 => base64::decode(&text)
                .ok_or_else(|| Error::Format("invalid base64 body".into()))?,
            Encoding::QuotedPrintable => quoted_printable::decode(&text),
            _ => unreachable!(),
        };
        let mut body = Body::from_text(String::from_utf8_lossy(&bytes).into_owned())
            .with_mime_type(mime_type)
            .with_eol(self.eol);
        body.checked = true;
        Ok(body)
    }

    /// Returns a body matching the requested type, charset and transfer
    /// encoding. Already-matching bodies come back unchanged in content.
    pub fn encode_to(
        &mut self,
        mime_type: Option<Field>,
        charset: Option<&str>,
        encoding: Encoding,
    ) -> Result<Body> {
        if self.encoding == encoding && mime_type.is_none() && charset.is_none() {
            return Ok(self.clone());
        }

        // back to plain first
        let plain = if self.encoding.is_coded() {
            self.decoded_as(mime_type.clone().unwrap_or_else(|| self.mime_type.clone()))?
        } else {
            self.clone()
        };

        let mut result = match encoding {
            Encoding::Base64 => {
                let mut plain = plain;
                let data = plain.string()?;
                let lines = base64::encode_wrapped(data.as_bytes(), self.eol.as_str());
                Body::from_lines(lines)
            }
            Encoding::QuotedPrintable => {
                let mut plain = plain;
                let mut lines = Vec::new();
                for line in plain.lines()? {
                    let content = line.trim_end_matches(['\r', '\n']);
                    lines.extend(quoted_printable::encode_line(
                        content.as_bytes(),
                        self.eol.as_str(),
                    ));
                }
                Body::from_lines(lines)
            }
            _ => plain,
        };

        result.encoding = encoding;
        result.eol = self.eol;
        result.mime_type = mime_type.unwrap_or_else(|| self.mime_type.clone());
        result.disposition = self.disposition.clone();
        if let Some(charset) = charset {
            result.mime_type.set_attribute("charset", charset);
        }
        result.checked = true;
        result.seqnr = next_seqnr();
        Ok(result)
    }

    /// Guarantees printable-on-the-wire content: binary data becomes
    /// base64, long or eight-bit text becomes quoted-printable.
    pub fn encoded(&mut self) -> Result<Body> {
        if self.encoding.is_coded() || self.is_multipart() || self.is_nested() {
            return Ok(self.clone());
        }
        let lines = self.lines()?;
        let has_binary = lines
            .iter()
            .any(|line| line.bytes().any(|b| b == 0 || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))));
        let has_eightbit = lines.iter().any(|line| !line.is_ascii());
        let has_long = lines.iter().any(|line| line.len() > 500);

        if has_binary {
            self.encode_to(None, None, Encoding::Base64)
        } else if has_eightbit || has_long {
            self.encode_to(None, None, Encoding::QuotedPrintable)
        } else {
            let mut body = self.clone();
            body.checked = true;
            Ok(body)
        }
    }

    /// A body with the trailing signature block removed. The signature
    /// starts at the last `-- ` line within `max_lines` of the end.
    pub fn strip_signature(&mut self, max_lines: usize) -> Result<Body> {
        self.strip_signature_matching(
            |line| {
                line.starts_with("--")
                    && matches!(line.as_bytes().get(2).copied(), Some(b' ' | b'\t') | None)
            },
            max_lines,
        )
    }

    pub fn strip_signature_matching(
        &mut self,
        matches: impl Fn(&str) -> bool,
        max_lines: usize,
    ) -> Result<Body> {
        let lines = self.lines()?;
        let window_start = lines.len().saturating_sub(max_lines);
        let cut = lines
            .iter()
            .enumerate()
            .skip(window_start)
            .find(|(_, line)| matches(line.trim_end_matches(['\r', '\n'])))
            .map(|(pos, _)| pos);

        match cut {
            Some(pos) => {
                let mut body = Body::from_lines(lines[..pos].to_vec())
                    .with_mime_type(self.mime_type.clone())
                    .with_eol(self.eol)
                    .with_encoding(self.encoding);
                body.checked = self.checked;
                Ok(body)
            }
            None => Ok(self.clone()),
        }
    }

    /// A body with every line converted to the given ending.
    pub fn convert_eol(&mut self, eol: LineEnding) -> Result<Body> {
        let separator = eol.as_str();
        let lines = self
            .lines()?
            .into_iter()
            .map(|line| {
                let mut converted = line.trim_end_matches(['\r', '\n']).to_string();
                converted.push_str(separator);
                converted
            })
            .collect();
        let mut body = Body::from_lines(lines)
            .with_mime_type(self.mime_type.clone())
            .with_encoding(self.encoding)
            .with_eol(eol);
        body.checked = self.checked;
        Ok(body)
    }

    /// A body produced by applying `f` to each line (terminator included).
    pub fn foreach_line(&mut self, mut f: impl FnMut(&str) -> String) -> Result<Body> {
        let lines = self.lines()?.iter().map(|line| f(line)).collect();
        let mut body = Body::from_lines(lines)
            .with_mime_type(self.mime_type.clone())
            .with_eol(self.eol);
        body.modified = true;
        Ok(body)
    }

    /// Joins bodies into one, keeping the metadata of the first.
    pub fn concatenate(bodies: Vec<Body>) -> Result<Body> {
        let mut out_lines = Vec::new();
        let mut template: Option<Body> = None;
        for mut body in bodies {
            out_lines.extend(body.lines()?);
            if template.is_none() {
                template = Some(body);
            }
        }
        let template = template.unwrap_or_default();
        Ok(Body::from_lines(out_lines)
            .with_mime_type(template.mime_type.clone())
            .with_encoding(template.encoding)
            .with_eol(template.eol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_lines() {
        let mut body = Body::from_text("one\ntwo\nthree\n");
        let lines = body.lines().unwrap();
        assert_eq!(lines, vec!["one\n", "two\n", "three\n"]);
        assert_eq!(
            body.size(),
            lines.iter().map(|l| l.len() as u64).sum::<u64>()
        );
        assert_eq!(body.nr_lines(), 3);
        assert_eq!(body.string().unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn eol_conversion_recomputes_size() {
        let mut body = Body::from_text("one\ntwo\n");
        assert_eq!(body.size(), 8);
        let mut crlf = body.convert_eol(LineEnding::CrLf).unwrap();
        assert_eq!(crlf.size(), 10);
        assert_eq!(crlf.string().unwrap(), "one\r\ntwo\r\n");
        let back = crlf.convert_eol(LineEnding::Lf).unwrap();
        assert_eq!(back.size(), 8);
    }

    #[test]
    fn decode_base64() {
        let mut body = Body::from_text("aGVsbG8gd29ybGQ=\n").with_encoding(Encoding::Base64);
        let mut decoded = body.decoded().unwrap();
        assert_eq!(decoded.string().unwrap(), "hello world");
        assert_eq!(decoded.encoding(), Encoding::None);
        assert_eq!(decoded.type_name(), "text/plain");

        // idempotent
        let mut again = decoded.decoded().unwrap();
        assert_eq!(again.string().unwrap(), "hello world");
    }

    #[test]
    fn encode_roundtrip() {
        let mut body = Body::from_text("caf\u{e9} content\nsecond line\n");
        let mut encoded = body.encode_to(None, None, Encoding::QuotedPrintable).unwrap();
        assert_eq!(encoded.encoding(), Encoding::QuotedPrintable);
        assert!(encoded.string().unwrap().contains("=C3=A9"));

        let mut decoded = encoded
            .decoded_as(Field::parse("Content-Type", "text/plain; charset=utf-8"))
            .unwrap();
        assert_eq!(decoded.string().unwrap(), "caf\u{e9} content\nsecond line\n");
    }

    #[test]
    fn encoded_picks_an_encoding() {
        let mut plain = Body::from_text("just ascii\n");
        let wire = plain.encoded().unwrap();
        assert_eq!(wire.encoding(), Encoding::None);

        let mut eightbit = Body::from_text("sm\u{f8}rrebr\u{f8}d\n");
        let wire = eightbit.encoded().unwrap();
        assert_eq!(wire.encoding(), Encoding::QuotedPrintable);

        let mut binary = Body::from_text("nul\u{0} here\n");
        let wire = binary.encoded().unwrap();
        assert_eq!(wire.encoding(), Encoding::Base64);
    }

    #[test]
    fn signature_stripping() {
        let mut body = Body::from_text("real content\nmore content\n-- \nsig line 1\nsig line 2\n");
        let mut stripped = body.strip_signature(10).unwrap();
        assert_eq!(stripped.string().unwrap(), "real content\nmore content\n");

        // out of window: untouched
        let stripped = body.strip_signature(2).unwrap();
        assert_eq!(stripped.nr_lines(), 5);

        let mut no_sig = Body::from_text("nothing here\n");
        let stripped = no_sig.strip_signature(10).unwrap();
        assert_eq!(stripped.nr_lines(), 1);
    }

    #[test]
    fn foreach_line_rewrites() {
        let mut body = Body::from_text("a\nb\n");
        let mut quoted = body.foreach_line(|line| format!("> {line}")).unwrap();
        assert_eq!(quoted.string().unwrap(), "> a\n> b\n");
    }

    #[test]
    fn concatenate_bodies() {
        let joined = Body::concatenate(vec![
            Body::from_text("one\n"),
            Body::from_text("two\n"),
        ])
        .unwrap();
        let mut joined = joined;
        assert_eq!(joined.string().unwrap(), "one\ntwo\n");
    }

    #[test]
    fn boundary_synthesis() {
        let mut body = Body::multipart(Multipart::default());
        let boundary = body.boundary().unwrap();
        assert!(!boundary.is_empty());
        // stable once set
        assert_eq!(body.ensure_boundary(), boundary);

        let with_own = Body::multipart(Multipart::default())
            .with_mime_type(Field::parse("Content-Type", "multipart/mixed; boundary=fixed"));
        assert_eq!(with_own.boundary().unwrap(), "fixed");
    }

    #[test]
    fn file_backed_body() {
        use std::io::Write;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"from a file\n").unwrap();
        file.flush().unwrap();
        let mut body = Body::from_file(file, 12, 1);
        assert_eq!(body.size(), 12);
        assert_eq!(body.string().unwrap(), "from a file\n");
        let mut stream = String::new();
        body.reader().unwrap().read_to_string(&mut stream).unwrap();
        assert_eq!(stream, "from a file\n");
    }
}
