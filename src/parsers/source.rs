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

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::core::field;
use crate::report::{Reporter, Severity};
use crate::{Access, Error, LineEnding, Result};

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// A line pattern that terminates the current read.
///
/// Separators nest: an mbox folder keeps `FromLine` at the bottom of the
/// stack and pushes a `Boundary` for every multipart level it descends into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Separator {
    /// The mbox envelope, `From ` at the start of a line.
    FromLine,
    /// A MIME boundary; matches `--boundary` and the `--boundary--`
    /// terminator.
    Boundary(String),
}

enum SeparatorMatch {
    No,
    Part,
    Terminator,
}

/// An incremental byte-level reader over one folder or message file.
///
/// The source records size and modification time when started and verifies
/// them again when stopped, so concurrent mutation by a non-cooperating
/// process is at least detected.
pub struct MailSource {
    path: Option<PathBuf>,
    access: Access,
    input: Option<BufReader<Box<dyn ReadSeek>>>,
    pos: u64,
    size: u64,
    known: Option<(u64, Option<SystemTime>)>,
    changed: bool,
    separators: Vec<Separator>,
    eol: Option<LineEnding>,
    unescape_from: bool,
    reporter: Reporter,
}

impl std::fmt::Debug for MailSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSource")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("pos", &self.pos)
            .field("size", &self.size)
            .field("known", &self.known)
            .field("changed", &self.changed)
            .field("separators", &self.separators)
            .field("eol", &self.eol)
            .field("unescape_from", &self.unescape_from)
            .finish()
    }
}

impl MailSource {
    /// A source bound to a file; nothing is opened until [`start`].
    pub fn new(path: impl Into<PathBuf>, access: Access) -> MailSource {
        MailSource {
            path: Some(path.into()),
            access,
            input: None,
            pos: 0,
            size: 0,
            known: None,
            changed: false,
            separators: Vec::new(),
            eol: None,
            unescape_from: false,
            reporter: Reporter::default(),
        }
    }

    /// A source over an in-memory buffer, used for nested messages and for
    /// message files that were slurped whole.
    pub fn from_bytes(data: Vec<u8>) -> MailSource {
        let size = data.len() as u64;
        MailSource {
            path: None,
            access: Access::Read,
            input: Some(BufReader::new(
                Box::new(Cursor::new(data)) as Box<dyn ReadSeek>
            )),
            pos: 0,
            size,
            known: None,
            changed: false,
            separators: Vec::new(),
            eol: None,
            unescape_from: false,
            reporter: Reporter::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    /// Line separator of the file, detected from the first complete line.
    pub fn eol(&self) -> LineEnding {
        self.eol.unwrap_or_default()
    }

    /// Enables `>From ` unescaping on body reads (mbox folders).
    pub fn set_unescape_from(&mut self, unescape: bool) {
        self.unescape_from = unescape;
    }

    /// Opens the file and records its size and mtime.
    ///
    /// When the source was stopped earlier and `trust_file` is false, a
    /// size or mtime different from the recorded one fails with
    /// [`Error::FileChanged`].
    pub fn start(&mut self, trust_file: bool) -> Result<()> {
        if self.input.is_some() {
            return Ok(());
        }
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::Usage("source has no file to reopen".into()))?;

        let file: File = if self.access.writable() {
            OpenOptions::new().read(true).write(true).open(&path)?
        } else {
            File::open(&path)?
        };
        let meta = file.metadata()?;
        let size = meta.len();
        let mtime = meta.modified().ok();

        if !trust_file {
            if let Some((known_size, known_mtime)) = self.known {
                if known_size != size || known_mtime != mtime {
                    self.reporter.report(
                        Severity::Error,
                        format!("file {} changed while unused", path.display()),
                    );
                    return Err(Error::FileChanged(path));
                }
            }
        }

        self.size = size;
        self.known = Some((size, mtime));
        self.changed = false;
        self.pos = 0;
        self.input = Some(BufReader::new(Box::new(file) as Box<dyn ReadSeek>));
        Ok(())
    }

    /// Closes the file, rechecking size and mtime. A mismatch is reported
    /// as an error and remembered, but does not fail the stop itself.
    pub fn stop(&mut self) {
        self.input = None;
        if let (Some(path), Some((size, mtime))) = (self.path.as_ref(), self.known) {
            if let Ok(meta) = fs::metadata(path) {
                if meta.len() != size || meta.modified().ok() != mtime {
                    self.changed = true;
                    self.reporter.report(
                        Severity::Error,
                        format!("file {} changed while in use", path.display()),
                    );
                }
            }
        }
    }

    /// Forgets the recorded size and mtime, accepting the file as it is now.
    pub fn accept_changes(&mut self) {
        self.known = None;
        self.changed = false;
    }

    /// Whether a mutation by someone else was detected at the last stop.
    pub fn was_changed(&self) -> bool {
        self.changed
    }

    pub fn push_separator(&mut self, separator: Separator) {
        self.separators.push(separator);
    }

    pub fn pop_separator(&mut self) -> Option<Separator> {
        self.separators.pop()
    }

    pub fn current_separator(&self) -> Option<&Separator> {
        self.separators.last()
    }

    pub fn file_position(&self) -> u64 {
        self.pos
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        let input = self.input_mut()?;
        input.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn input_mut(&mut self) -> Result<&mut BufReader<Box<dyn ReadSeek>>> {
        self.input
            .as_mut()
            .ok_or_else(|| Error::Usage("read from a stopped source".into()))
    }

    /// Reads one line including its terminator; returns the number of bytes
    /// consumed. Detects the line separator on the first complete line.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        let read = self.input_mut()?.read_until(b'\n', buf)?;
        self.pos += read as u64;
        if read > 0 && self.eol.is_none() && buf.last() == Some(&b'\n') {
            self.eol = Some(if buf.len() >= 2 && buf[buf.len() - 2] == b'\r' {
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            });
        }
        Ok(read)
    }

    fn match_separator(&self, line: &[u8]) -> SeparatorMatch {
        match self.separators.last() {
            None => SeparatorMatch::No,
            Some(Separator::FromLine) => {
                if line.starts_with(b"From ") {
                    SeparatorMatch::Part
                } else {
                    SeparatorMatch::No
                }
            }
            Some(Separator::Boundary(boundary)) => {
                let trimmed = trim_line(line);
                if trimmed.len() >= boundary.len() + 2
                    && &trimmed[..2] == b"--"
                    && &trimmed[2..2 + boundary.len()] == boundary.as_bytes()
                {
                    if trimmed[2 + boundary.len()..].starts_with(b"--") {
                        SeparatorMatch::Terminator
                    } else if trimmed.len() == boundary.len() + 2 {
                        SeparatorMatch::Part
                    } else {
                        SeparatorMatch::No
                    }
                } else {
                    SeparatorMatch::No
                }
            }
        }
    }

    /// Matches a line against every separator on the stack; a missing inner
    /// terminator must not run past an outer one.
    fn match_any_separator(&self, line: &[u8]) -> bool {
        self.separators.iter().any(|separator| match separator {
            Separator::FromLine => line.starts_with(b"From "),
            Separator::Boundary(boundary) => {
                let trimmed = trim_line(line);
                trimmed.len() >= boundary.len() + 2
                    && &trimmed[..2] == b"--"
                    && &trimmed[2..2 + boundary.len()] == boundary.as_bytes()
                    && (trimmed.len() == boundary.len() + 2
                        || trimmed[2 + boundary.len()..].starts_with(b"--"))
            }
        })
    }

    /// Skips blank lines up to the active separator line and consumes it.
    ///
    /// Returns the separator line's offset and its text without the line
    /// terminator, or `None` at end of file or when something that is not a
    /// separator follows (the position is restored in that case).
    pub fn read_separator(&mut self) -> Result<Option<(u64, String)>> {
        let mut line = Vec::with_capacity(80);
        loop {
            let start = self.pos;
            let read = self.read_line(&mut line)?;
            if read == 0 {
                return Ok(None);
            }
            if trim_line(&line).is_empty() {
                continue;
            }
            return match self.match_separator(&line) {
                SeparatorMatch::Part | SeparatorMatch::Terminator => {
                    let text = String::from_utf8_lossy(trim_line(&line)).into_owned();
                    Ok(Some((start, text)))
                }
                SeparatorMatch::No => {
                    self.seek_to(start)?;
                    Ok(None)
                }
            };
        }
    }

    /// Reads header fields up to and including the blank line.
    ///
    /// Returns the offset of the first header byte and `(name, folded
    /// body)` pairs; continuation lines stay embedded in the body separated
    /// by `\n`. A continuation without a preceding field and a line without
    /// a colon are recovered with a warning.
    pub fn read_header(&mut self) -> Result<(u64, Vec<(String, String)>)> {
        let start = self.pos;
        let mut fields: Vec<(String, String)> = Vec::with_capacity(16);
        let mut line = Vec::with_capacity(160);

        loop {
            let line_start = self.pos;
            let read = self.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            let content = trim_line(&line);
            if content.is_empty() {
                break;
            }
            if self.match_any_separator(&line) {
                // Malformed: the header ran into the next message.
                self.seek_to(line_start)?;
                break;
            }

            if line[0] == b' ' || line[0] == b'\t' {
                let text = String::from_utf8_lossy(content).into_owned();
                match fields.last_mut() {
                    Some((_, body)) => {
                        body.push('\n');
                        // keep the continuation's leading whitespace
                        let full = String::from_utf8_lossy(&line);
                        let indent_len = full.len() - full.trim_start().len();
                        body.push_str(&full[..indent_len.min(full.len())]);
                        body.push_str(text.trim_start());
                    }
                    None => {
                        self.reporter.report(
                            Severity::Warning,
                            "continuation line without a field, dropped",
                        );
                    }
                }
                continue;
            }

            match content.iter().position(|&ch| ch == b':') {
                Some(colon) => {
                    let name = String::from_utf8_lossy(&content[..colon])
                        .trim()
                        .to_string();
                    let body = String::from_utf8_lossy(&content[colon + 1..])
                        .trim_start()
                        .to_string();
                    // empty bodies are permitted
                    fields.push((name, body));
                }
                None => {
                    self.reporter.report(
                        Severity::Warning,
                        format!(
                            "header line without a colon, attached to previous: {}",
                            String::from_utf8_lossy(content)
                        ),
                    );
                    if let Some((_, body)) = fields.last_mut() {
                        body.push('\n');
                        body.push(' ');
                        body.push_str(String::from_utf8_lossy(content).as_ref());
                    }
                }
            }
        }

        Ok((start, fields))
    }

    fn unescape(&self, line: &mut Vec<u8>) {
        if self.unescape_from
            && line.first() == Some(&b'>')
            && line
                .iter()
                .skip_while(|&&ch| ch == b'>')
                .take(5)
                .copied()
                .collect::<Vec<u8>>()
                == b"From "
        {
            line.remove(0);
        }
    }

    /// Reads raw body bytes up to the innermost separator (which stays
    /// unconsumed) or the end of the file.
    fn body_bytes(&mut self, chars_hint: Option<u64>) -> Result<(u64, Vec<u8>, u32)> {
        let begin = self.pos;
        let mut out = Vec::with_capacity(chars_hint.unwrap_or(1024).min(1 << 22) as usize);
        let mut lines = 0u32;
        let mut line = Vec::with_capacity(160);

        loop {
            let line_start = self.pos;
            let read = self.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if self.match_any_separator(&line) {
                self.seek_to(line_start)?;
                break;
            }
            self.unescape(&mut line);
            lines += 1;
            out.extend_from_slice(&line);
        }
        Ok((begin, out, lines))
    }

    /// Reads the body as one string.
    pub fn body_as_string(
        &mut self,
        chars_hint: Option<u64>,
        _lines_hint: Option<u32>,
    ) -> Result<(u64, String)> {
        let (begin, bytes, _) = self.body_bytes(chars_hint)?;
        Ok((begin, String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Reads the body as lines, each keeping its terminator.
    pub fn body_as_lines(
        &mut self,
        chars_hint: Option<u64>,
        lines_hint: Option<u32>,
    ) -> Result<(u64, Vec<String>)> {
        let (begin, bytes, lines) = self.body_bytes(chars_hint)?;
        let mut out = Vec::with_capacity(lines_hint.unwrap_or(lines).max(lines) as usize);
        out.extend(split_lines(&bytes));
        Ok((begin, out))
    }

    /// Streams the body into an unlinked temporary file.
    pub fn body_as_file(
        &mut self,
        chars_hint: Option<u64>,
        _lines_hint: Option<u32>,
    ) -> Result<(u64, NamedTempFile, u64, u32)> {
        let (begin, bytes, lines) = self.body_bytes(chars_hint)?;
        let mut file = NamedTempFile::new()?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok((begin, file, bytes.len() as u64, lines))
    }

    /// Skips the body, returning `(begin, end, lines)` for a delayed load.
    ///
    /// A character hint from `Content-Length` lets the scan jump ahead and
    /// merely verify that a separator follows.
    pub fn body_delayed(
        &mut self,
        chars_hint: Option<u64>,
        lines_hint: Option<u32>,
    ) -> Result<(u64, u64, u32)> {
        let begin = self.pos;

        if let Some(hint) = chars_hint {
            let guess = begin + hint;
            if guess <= self.size && self.seek_to(guess).is_ok() {
                let mut line = Vec::with_capacity(160);
                let read = self.read_line(&mut line)?;
                if read == 0 && guess == self.size {
                    return Ok((begin, guess, lines_hint.unwrap_or(0)));
                }
                if read > 0 && self.match_any_separator(&line) {
                    self.seek_to(guess)?;
                    return Ok((begin, guess, lines_hint.unwrap_or(0)));
                }
            }
            self.seek_to(begin)?;
        }

        let mut lines = 0u32;
        let mut line = Vec::with_capacity(160);
        loop {
            let line_start = self.pos;
            let read = self.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if self.match_any_separator(&line) {
                self.seek_to(line_start)?;
                break;
            }
            lines += 1;
        }
        Ok((begin, self.pos, lines))
    }

    /// Raw bytes of a range, exactly as stored.
    pub fn read_range(&mut self, begin: u64, end: u64) -> Result<Vec<u8>> {
        self.seek_to(begin)?;
        let mut out = vec![0u8; (end - begin) as usize];
        self.input_mut()?.read_exact(&mut out)?;
        self.pos = end;
        Ok(out)
    }

    /// A range as body text, with `>From ` unescaping applied when enabled.
    pub fn read_range_as_string(&mut self, begin: u64, end: u64) -> Result<String> {
        let bytes = self.read_range(begin, end)?;
        if !self.unescape_from {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        let mut out = Vec::with_capacity(bytes.len());
        for mut line in split_raw_lines(&bytes) {
            self.unescape(&mut line);
            out.extend_from_slice(&line);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Folds a structured header body to the given width; folding happens
    /// after commas and before whitespace.
    pub fn fold_header_line(line: &str, length: usize) -> String {
        field::fold_body(0, line, length)
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Splits into lines keeping each terminator attached.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    split_raw_lines(bytes)
        .into_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

fn split_raw_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (pos, &ch) in bytes.iter().enumerate() {
        if ch == b'\n' {
            out.push(bytes[start..=pos].to_vec());
            start = pos + 1;
        }
    }
    if start < bytes.len() {
        out.push(bytes[start..].to_vec());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(data: &[u8]) -> MailSource {
        MailSource::from_bytes(data.to_vec())
    }

    #[test]
    fn header_with_continuations() {
        let mut src = source(
            b"From: me@example.com\nReceived: from a.example\n\tby b.example\nSubject: hi\n\nbody\n",
        );
        let (start, fields) = src.read_header().unwrap();
        assert_eq!(start, 0);
        assert_eq!(
            fields,
            vec![
                ("From".to_string(), "me@example.com".to_string()),
                (
                    "Received".to_string(),
                    "from a.example\n\tby b.example".to_string()
                ),
                ("Subject".to_string(), "hi".to_string()),
            ]
        );
        // position is at the body now
        let (begin, body) = src.body_as_string(None, None).unwrap();
        assert_eq!(body, "body\n");
        assert!(begin > 0);
    }

    #[test]
    fn continuation_without_field_is_dropped() {
        let mut src = source(b"  dangling\nSubject: ok\n\n");
        let (_, fields) = src.read_header().unwrap();
        assert_eq!(fields, vec![("Subject".to_string(), "ok".to_string())]);
        assert_eq!(src.reporter().reports().len(), 1);
    }

    #[test]
    fn empty_field_bodies_permitted() {
        let mut src = source(b"X-Empty:\nX-Also-Empty: \n\n");
        let (_, fields) = src.read_header().unwrap();
        assert_eq!(
            fields,
            vec![
                ("X-Empty".to_string(), "".to_string()),
                ("X-Also-Empty".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn from_line_separator() {
        let data = b"From a@example.com Sat Jan  3 01:05:34 1996\nSubject: one\n\nbody one\n\nFrom b@example.com Tue Jul 23 19:39:23 2002\nSubject: two\n\nbody two\n";
        let mut src = source(data);
        src.push_separator(Separator::FromLine);

        let (offset, line) = src.read_separator().unwrap().unwrap();
        assert_eq!(offset, 0);
        assert!(line.starts_with("From a@example.com"));

        let (_, fields) = src.read_header().unwrap();
        assert_eq!(fields[0].1, "one");

        let (_, body) = src.body_as_string(None, None).unwrap();
        assert_eq!(body, "body one\n\n");

        let (offset, line) = src.read_separator().unwrap().unwrap();
        assert!(line.starts_with("From b@example.com"));
        assert_eq!(data[offset as usize..].starts_with(b"From b"), true);

        let (_, fields) = src.read_header().unwrap();
        assert_eq!(fields[0].1, "two");
        let (_, body) = src.body_as_string(None, None).unwrap();
        assert_eq!(body, "body two\n");

        assert!(src.read_separator().unwrap().is_none());
    }

    #[test]
    fn boundary_separator_nests() {
        let data = b"preamble\n--outer\ninner part\n--outer\nsecond\n--outer--\nepilogue\n";
        let mut src = source(data);
        src.push_separator(Separator::Boundary("outer".to_string()));

        let (_, preamble) = src.body_as_string(None, None).unwrap();
        assert_eq!(preamble, "preamble\n");

        let (_, line) = src.read_separator().unwrap().unwrap();
        assert_eq!(line, "--outer");

        let (_, part) = src.body_as_string(None, None).unwrap();
        assert_eq!(part, "inner part\n");

        let (_, line) = src.read_separator().unwrap().unwrap();
        assert_eq!(line, "--outer");
        let (_, part) = src.body_as_string(None, None).unwrap();
        assert_eq!(part, "second\n");

        let (_, line) = src.read_separator().unwrap().unwrap();
        assert_eq!(line, "--outer--");

        src.pop_separator();
        let (_, epilogue) = src.body_as_string(None, None).unwrap();
        assert_eq!(epilogue, "epilogue\n");
    }

    #[test]
    fn delayed_skip_counts() {
        let data = b"line one\nline two\nFrom next@example.com Sat Jan  3 01:05:34 1996\n";
        let mut src = source(data);
        src.push_separator(Separator::FromLine);

        let (begin, end, lines) = src.body_delayed(None, None).unwrap();
        assert_eq!(begin, 0);
        assert_eq!(end, 18);
        assert_eq!(lines, 2);
        // position parked at the From line
        let (_, line) = src.read_separator().unwrap().unwrap();
        assert!(line.starts_with("From next@"));
    }

    #[test]
    fn delayed_skip_trusts_hint() {
        let data = b"line one\nline two\nFrom next@example.com Sat Jan  3 01:05:34 1996\n";
        let mut src = source(data);
        src.push_separator(Separator::FromLine);

        let (begin, end, lines) = src.body_delayed(Some(18), Some(2)).unwrap();
        assert_eq!((begin, end, lines), (0, 18, 2));

        // a lying hint falls back to the scan
        let mut src = source(data);
        src.push_separator(Separator::FromLine);
        let (begin, end, _) = src.body_delayed(Some(4), None).unwrap();
        assert_eq!((begin, end), (0, 18));
    }

    #[test]
    fn unescapes_from_lines() {
        let data = b">From escaped\n>>From deeper\n> not escaped\nFrom x Sat Jan  3 01:05:34 1996\n";
        let mut src = source(data);
        src.set_unescape_from(true);
        src.push_separator(Separator::FromLine);
        let (_, body) = src.body_as_string(None, None).unwrap();
        assert_eq!(body, "From escaped\n>From deeper\n> not escaped\n");
    }

    #[test]
    fn eol_detection() {
        let mut src = source(b"Subject: x\r\n\r\n");
        let _ = src.read_header().unwrap();
        assert_eq!(src.eol(), LineEnding::CrLf);

        let mut src = source(b"Subject: x\n\n");
        let _ = src.read_header().unwrap();
        assert_eq!(src.eol(), LineEnding::Lf);
    }

    #[test]
    fn start_checks_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folder");
        fs::write(&path, b"Subject: x\n\nbody\n").unwrap();

        let mut src = MailSource::new(&path, Access::Read);
        src.start(false).unwrap();
        let (_, fields) = src.read_header().unwrap();
        assert_eq!(fields.len(), 1);
        src.stop();
        assert!(!src.was_changed());

        // mutate behind its back
        fs::write(&path, b"Subject: y\n\nlonger body\n").unwrap();
        assert!(matches!(src.start(false), Err(Error::FileChanged(_))));
        assert!(src.start(true).is_ok());
    }
}
