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
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::core::address::Addr;
use crate::core::body::{Body, BodyContent, Encoding, Multipart};
use crate::core::date;
use crate::core::field::Field;
use crate::core::header::{create_message_id, Header, HeaderState};
use crate::parsers::source::{MailSource, Separator};
use crate::{Error, Result};

/// One RFC 2822 message: a header, a body, labels and flags.
///
/// Messages live inside a folder (their sequence number is their index
/// there), inside another message (as a multipart or nested part), or on
/// their own.
#[derive(Debug, Clone, Default)]
pub struct Message {
    head: Header,
    body: Body,
    labels: HashMap<String, bool>,
    deleted: Option<i64>,
    modified: bool,
    seqnr: usize,
    is_part: bool,
    /// Keeps the per-file parser alive for lazily loaded content.
    pub(crate) source: Option<Rc<RefCell<MailSource>>>,
    /// Byte range of the whole message in the folder file, envelope
    /// included.
    pub(crate) range: Option<(u64, u64)>,
    /// Byte range of the header, for delayed heads.
    pub(crate) head_range: Option<(u64, u64)>,
    /// The mbox envelope line, without its terminator.
    pub(crate) from_line: Option<String>,
    /// MH message file number, when stored in an MH folder.
    pub(crate) file_number: Option<u32>,
    /// Maildir file name (with its flag suffix), when stored in a Maildir.
    pub(crate) file_name: Option<String>,
}

impl Message {
    pub fn new() -> Message {
        Message::default()
    }

    pub fn from_parts(head: Header, body: Body) -> Message {
        Message {
            head,
            body,
            ..Message::default()
        }
    }

    /// Parses a complete message from raw bytes, descending into multipart
    /// and nested structure.
    pub fn parse(bytes: &[u8]) -> Result<Message> {
        let mut source = MailSource::from_bytes(bytes.to_vec());
        let (_, raw_fields) = source.read_header()?;
        let head = Header::from_fields(
            raw_fields
                .into_iter()
                .map(|(name, body)| Field::parse(name, body))
                .collect(),
        );
        let eol = source.eol();
        let (_, text) = source.body_as_string(None, None)?;
        let mut message = Message::from_parts(head, Body::from_text(text).with_eol(eol));
        message.apply_content_headers();
        message.unpack()?;
        Ok(message)
    }

    /// Reads one message from raw bytes the way a folder does: parse,
    /// convert `Status`/`X-Status` into labels (removing the fields unless
    /// told otherwise) and make sure it carries a message id.
    pub fn read(bytes: &[u8], strip_status_fields: bool) -> Result<Message> {
        let mut message = Message::parse(bytes)?;
        message.labels_from_status();
        if strip_status_fields {
            if message.head.get("status").is_some() {
                message.head.delete("status");
            }
            if message.head.get("x-status").is_some() {
                message.head.delete("x-status");
            }
            message.head.reset_modified();
        }
        message.ensure_message_id();
        Ok(message)
    }

    pub fn head(&self) -> &Header {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut Header {
        &mut self.head
    }

    /// Replaces the head, returning the old one.
    pub fn set_head(&mut self, head: Header) -> Header {
        self.modified = true;
        std::mem::replace(&mut self.head, head)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Attaches a body, re-encoding it for the wire and updating the
    /// `Content-*` fields in the head. Returns the previous body.
    pub fn set_body(&mut self, mut body: Body) -> Result<Body> {
        let wire = body.encoded()?;
        self.head
            .set(Field::parse("Content-Type", wire.mime_type().folded_body()));
        self.head.set(Field::parse(
            "Content-Transfer-Encoding",
            wire.encoding().as_str(),
        ));
        match wire.disposition() {
            Some(disposition) => {
                self.head.set(Field::parse(
                    "Content-Disposition",
                    disposition.folded_body(),
                ));
            }
            None => {
                self.head.set(Field::parse("Content-Disposition", "none"));
            }
        }
        self.modified = true;
        Ok(std::mem::replace(&mut self.body, wire))
    }

    /// Detaches the body, resetting the `Content-*` fields.
    pub fn take_body(&mut self) -> Body {
        self.head.delete("content-type");
        self.head.delete("content-transfer-encoding");
        self.head.delete("content-disposition");
        self.modified = true;
        std::mem::take(&mut self.body)
    }

    /// Copies the `Content-*` description from the head onto the body.
    pub fn apply_content_headers(&mut self) {
        let mut body = std::mem::take(&mut self.body);
        if let Some(content_type) = self.head.get("content-type") {
            body = body.with_mime_type(content_type.clone());
        }
        if let Some(encoding) = self.head.get("content-transfer-encoding") {
            body = body.with_encoding(Encoding::from_token(&encoding.body()));
        }
        if let Some(disposition) = self.head.get("content-disposition") {
            body = body.with_disposition(disposition.clone());
        }
        self.body = body;
    }

    /// Expands an in-memory textual body into multipart or nested structure
    /// when the content type calls for it. Recursive; anything else is left
    /// alone.
    pub fn unpack(&mut self) -> Result<()> {
        let type_name = self.body.type_name();
        if type_name.starts_with("multipart/") && !self.body.is_multipart() {
            let boundary = match self.body.boundary() {
                Some(boundary) if !boundary.is_empty() => boundary,
                // no boundary to split on: keep the text as is
                _ => return Ok(()),
            };
            let eol = self.body.eol();
            let text = self.body.string()?;
            let mut source = MailSource::from_bytes(text.into_bytes());
            source.push_separator(Separator::Boundary(boundary));

            let (_, preamble) = source.body_as_string(None, None)?;
            let mut multipart = Multipart {
                preamble: if preamble.is_empty() {
                    None
                } else {
                    Some(Box::new(Body::from_text(preamble).with_eol(eol)))
                },
                parts: Vec::new(),
                epilogue: None,
            };

            loop {
                match source.read_separator()? {
                    Some((_, line)) if line.ends_with("--") => {
                        source.pop_separator();
                        let (_, epilogue) = source.body_as_string(None, None)?;
                        if !epilogue.is_empty() {
                            multipart.epilogue =
                                Some(Box::new(Body::from_text(epilogue).with_eol(eol)));
                        }
                        break;
                    }
                    Some(_) => {
                        let (_, raw_fields) = source.read_header()?;
                        let head = Header::from_fields(
                            raw_fields
                                .into_iter()
                                .map(|(name, body)| Field::parse(name, body))
                                .collect(),
                        );
                        let (_, body_text) = source.body_as_string(None, None)?;
                        let mut part =
                            Message::from_parts(head, Body::from_text(body_text).with_eol(eol));
                        part.is_part = true;
                        part.seqnr = multipart.parts.len();
                        part.apply_content_headers();
                        part.unpack()?;
                        multipart.parts.push(part);
                    }
                    None => break,
                }
            }

            let mime_type = self.body.mime_type().clone();
            let encoding = self.body.encoding();
            self.body = Body::multipart(multipart)
                .with_mime_type(mime_type)
                .with_encoding(encoding)
                .with_eol(eol);
        } else if type_name == "message/rfc822" && !self.body.is_nested() {
            let eol = self.body.eol();
            let text = self.body.string()?;
            let mut inner = Message::parse(text.as_bytes())?;
            inner.is_part = true;
            let mime_type = self.body.mime_type().clone();
            self.body = Body::nested(inner).with_mime_type(mime_type).with_eol(eol);
        } else if self.body.is_multipart() || self.body.is_nested() {
            // already structured; descend for delayed children
            if let Some(multipart) = self.body.as_multipart_mut() {
                for part in &mut multipart.parts {
                    part.unpack()?;
                }
            }
        }
        Ok(())
    }

    /// The message id, angle brackets and whitespace stripped.
    pub fn message_id(&self) -> Option<String> {
        self.head.get("message-id").map(|field| {
            field
                .unfolded_body()
                .chars()
                .filter(|ch| !ch.is_whitespace() && *ch != '<' && *ch != '>')
                .collect()
        })
    }

    /// The message id, generating and storing one when absent, so that the
    /// identity survives a folder rewrite.
    pub fn ensure_message_id(&mut self) -> String {
        if let Some(id) = self.message_id().filter(|id| !id.is_empty()) {
            return id;
        }
        let id = create_message_id();
        self.head.set(Field::parse("Message-ID", &id));
        id.trim_matches(['<', '>']).to_string()
    }

    pub fn subject(&self) -> Option<String> {
        self.head.get_body("subject")
    }

    /// The sender, preferring `From` over `Sender`.
    pub fn sender(&self) -> Option<Addr> {
        self.head
            .get("from")
            .or_else(|| self.head.get("sender"))
            .and_then(|field| field.addresses().into_iter().next())
    }

    pub fn timestamp(&self) -> i64 {
        self.head.timestamp()
    }

    pub fn guess_timestamp(&self) -> Option<i64> {
        self.head.guess_timestamp()
    }

    // ---- labels and flags

    pub fn label(&self, name: &str) -> bool {
        if name == "deleted" {
            return self.deleted.is_some();
        }
        self.labels.get(name).copied().unwrap_or(false)
    }

    /// Sets a label; returns the previous value.
    pub fn set_label(&mut self, name: &str, value: bool) -> bool {
        if name == "deleted" {
            let old = self.deleted.is_some();
            if value {
                self.delete();
            } else {
                self.undelete();
            }
            return old;
        }
        self.modified = true;
        self.labels.insert(name.to_string(), value).unwrap_or(false)
    }

    pub fn labels(&self) -> &HashMap<String, bool> {
        &self.labels
    }

    pub(crate) fn init_label(&mut self, name: &str, value: bool) {
        self.labels.insert(name.to_string(), value);
    }

    /// Marks the message deleted, recording when. Idempotent.
    pub fn delete(&mut self) {
        if self.deleted.is_none() {
            self.deleted = Some(date::now());
            self.modified = true;
        }
    }

    /// Flags the message deleted while reading a folder, without touching
    /// the modification state.
    pub(crate) fn init_deleted(&mut self) {
        self.deleted = Some(date::now());
    }

    pub fn undelete(&mut self) {
        if self.deleted.take().is_some() {
            self.modified = true;
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    /// When the message was marked deleted, as a timestamp.
    pub fn deleted_at(&self) -> Option<i64> {
        self.deleted
    }

    /// Imports labels from `Status` and `X-Status` fields.
    pub fn labels_from_status(&mut self) {
        if let Some(status) = self.head.get_body("status") {
            self.labels.insert("seen".into(), status.contains('R'));
            self.labels.insert("old".into(), status.contains('O'));
        }
        if let Some(status) = self.head.get_body("x-status") {
            self.labels.insert("replied".into(), status.contains('A'));
            self.labels.insert("flagged".into(), status.contains('F'));
        }
    }

    /// Writes the current labels back into `Status`/`X-Status` fields.
    pub fn status_from_labels(&mut self) {
        let mut status = String::new();
        if self.label("seen") {
            status.push('R');
        }
        if self.label("old") {
            status.push('O');
        }
        let mut x_status = String::new();
        if self.label("replied") {
            x_status.push('A');
        }
        if self.label("flagged") {
            x_status.push('F');
        }

        if status.is_empty() {
            if self.head.get("status").is_some() {
                self.head.delete("status");
            }
        } else {
            self.head.set(Field::parse("Status", status));
        }
        if x_status.is_empty() {
            if self.head.get("x-status").is_some() {
                self.head.delete("x-status");
            }
        } else {
            self.head.set(Field::parse("X-Status", x_status));
        }
    }

    // ---- state

    pub fn seqnr(&self) -> usize {
        self.seqnr
    }

    pub(crate) fn set_seqnr(&mut self, seqnr: usize) {
        self.seqnr = seqnr;
    }

    pub fn is_part(&self) -> bool {
        self.is_part
    }

    pub(crate) fn set_is_part(&mut self, is_part: bool) {
        self.is_part = is_part;
    }

    pub fn is_modified(&self) -> bool {
        self.modified || self.head.is_modified() || self.body.is_modified()
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
        self.head.reset_modified();
        self.body.reset_modified();
    }

    /// Whether any content still waits on the folder file.
    pub fn is_delayed(&self) -> bool {
        if self.head.state() != HeaderState::Complete {
            return true;
        }
        body_is_delayed(&self.body)
    }

    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub fn from_line(&self) -> Option<&str> {
        self.from_line.as_deref()
    }

    /// Shifts all recorded byte locations after a folder rewrite.
    pub(crate) fn move_location(&mut self, delta: i64) {
        if let Some((begin, end)) = self.range {
            self.range = Some((
                begin.wrapping_add_signed(delta),
                end.wrapping_add_signed(delta),
            ));
        }
        if let Some((begin, end)) = self.head_range {
            self.head_range = Some((
                begin.wrapping_add_signed(delta),
                end.wrapping_add_signed(delta),
            ));
        }
        self.body.move_location(delta);
    }

    /// Loads a delayed head from the folder file.
    pub fn load_head(&mut self) -> Result<()> {
        if self.head.state() == HeaderState::Complete {
            return Ok(());
        }
        let (begin, _) = self
            .head_range
            .ok_or_else(|| Error::Usage("delayed head without a byte range".into()))?;
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::Usage("delayed head outlived its folder".into()))?;
        let mut source = source.borrow_mut();
        let was_open = source.is_open();
        if !was_open {
            source.start(false)?;
        }
        source.seek_to(begin)?;
        let (_, raw_fields) = source.read_header()?;
        if !was_open {
            source.stop();
        }

        let mut head = Header::from_fields(
            raw_fields
                .into_iter()
                .map(|(name, body)| Field::parse(name, body))
                .collect(),
        );
        head.set_state(HeaderState::Complete);
        self.head = head;
        self.labels_from_status();
        self.apply_content_headers();
        Ok(())
    }

    /// The direct children of this message: the parts of a multipart body,
    /// or the single encapsulated message of a nested one.
    pub fn parts(&self) -> Vec<&Message> {
        match self.body.content() {
            BodyContent::Multipart(multipart) => multipart.parts.iter().collect(),
            BodyContent::Nested(inner) => vec![inner],
            _ => Vec::new(),
        }
    }

    /// Every part of the structure, recursively, in serialization order.
    pub fn all_parts(&self) -> Vec<&Message> {
        let mut out = Vec::new();
        for part in self.parts() {
            out.push(part);
            out.extend(part.all_parts());
        }
        out
    }

    /// Loads everything still delayed, recursively, leaving the message
    /// independent of its folder file.
    pub fn load_all(&mut self) -> Result<()> {
        self.load_head()?;
        self.body.load()?;
        self.unpack()?;
        if let Some(multipart) = self.body.as_multipart_mut() {
            for part in &mut multipart.parts {
                part.load_all()?;
            }
        } else if let Some(inner) = self.body.as_nested_mut() {
            inner.load_all()?;
        }
        self.source = None;
        Ok(())
    }

    // ---- sizes

    /// Byte size of the serialized message: header, blank line and body.
    pub fn size(&self) -> u64 {
        let eol_len = self.body.eol().as_str().len() as u64;
        let mut size = 0;
        for field in self.head.ordered_fields() {
            size += field.name().len() as u64 + 2;
            for (nr, line) in field.folded_body().split('\n').enumerate() {
                if nr > 0 {
                    size += eol_len;
                }
                size += line.len() as u64;
            }
            size += eol_len;
        }
        size + eol_len + self.body.size()
    }

    pub fn nr_lines(&self) -> u32 {
        let mut lines = 1; // blank separator
        for field in self.head.ordered_fields() {
            lines += field.folded_body().split('\n').count() as u32;
        }
        lines + self.body.nr_lines()
    }

    /// Serializes the message: header, blank line, body. The mbox envelope
    /// is the folder's business.
    pub fn write_to(&mut self, out: &mut impl Write) -> Result<()> {
        let eol = self.body.eol().as_str();
        self.head.write(out, eol)?;
        out.write_all(eol.as_bytes())?;
        self.body.write_content(out)
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size() as usize + 64);
        self.write_to(&mut out)?;
        Ok(out)
    }
}

fn body_is_delayed(body: &Body) -> bool {
    match body.content() {
        BodyContent::Delayed(_) => true,
        BodyContent::Multipart(mp) => mp.parts.iter().any(|part| part.is_delayed()),
        BodyContent::Nested(inner) => inner.is_delayed(),
        _ => false,
    }
}
