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

use std::fs;
use std::path::PathBuf;

use crate::core::body::{Body, Encoding, Multipart};
use crate::core::date;
use crate::core::field::{wellformed_name, Field};
use crate::core::message::Message;
use crate::{Error, Result};

/// Assembles a new message from header values and content sources.
///
/// When more than one content source is given (inline data, files to
/// attach, other messages to attach) the result is `multipart/mixed`.
/// Forced `Content-*` values are applied after the body is constructed, so
/// they override whatever the body inferred.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    fields: Vec<Field>,
    data: Option<Vec<String>>,
    files: Vec<PathBuf>,
    attachments: Vec<Message>,
    prebuilt: Option<Body>,
    forced: Vec<Field>,
}

impl Message {
    /// Starts building a message from scratch.
    pub fn build() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Starts from a pre-built body; `Message-Id`, `Date` and
    /// `MIME-Version` are injected when missing.
    pub fn build_from_body(body: Body) -> MessageBuilder {
        MessageBuilder {
            prebuilt: Some(body),
            ..MessageBuilder::default()
        }
    }
}

impl MessageBuilder {
    /// Adds a header field; the name is canonicalized.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        if let Some(field) = Field::new(wellformed_name(name), value.into()) {
            self.fields.push(field);
        }
        self
    }

    pub fn from(self, value: impl Into<String>) -> Self {
        self.header("From", value)
    }

    pub fn to(self, value: impl Into<String>) -> Self {
        self.header("To", value)
    }

    pub fn cc(self, value: impl Into<String>) -> Self {
        self.header("Cc", value)
    }

    pub fn bcc(self, value: impl Into<String>) -> Self {
        self.header("Bcc", value)
    }

    pub fn subject(self, value: impl Into<String>) -> Self {
        self.header("Subject", value)
    }

    /// Inline body content as lines (with or without terminators).
    pub fn data_lines(mut self, lines: Vec<String>) -> Self {
        let lines = lines
            .into_iter()
            .map(|line| {
                if line.ends_with('\n') {
                    line
                } else {
                    format!("{line}\n")
                }
            })
            .collect();
        self.data = Some(lines);
        self
    }

    /// Inline body content as one string.
    pub fn data(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.data_lines(
            crate::parsers::source::split_lines(text.as_bytes()),
        )
    }

    /// Attaches the contents of a file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Attaches another message.
    pub fn attach(mut self, message: Message) -> Self {
        self.attachments.push(message);
        self
    }

    /// Forces a `Content-*` value onto the final message, overriding
    /// whatever body construction produced.
    pub fn force_content(mut self, name: &str, value: impl Into<String>) -> Self {
        if let Some(field) = Field::new(wellformed_name(name), value.into()) {
            self.forced.push(field);
        }
        self
    }

    pub fn content_type(self, value: impl Into<String>) -> Self {
        self.force_content("Content-Type", value)
    }

    pub fn content_transfer_encoding(self, value: impl Into<String>) -> Self {
        self.force_content("Content-Transfer-Encoding", value)
    }

    pub fn content_disposition(self, value: impl Into<String>) -> Self {
        self.force_content("Content-Disposition", value)
    }

    pub fn content_description(self, value: impl Into<String>) -> Self {
        self.force_content("Content-Description", value)
    }

    pub fn content_id(self, value: impl Into<String>) -> Self {
        self.force_content("Content-ID", value)
    }

    fn body_from_file(path: &PathBuf) -> Result<Body> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        let mut disposition = Field::parse("Content-Disposition", "attachment");
        disposition.set_attribute("filename", &name);

        let body = match String::from_utf8(bytes) {
            Ok(text) => Body::from_text(text).with_type("text/plain"),
            Err(err) => {
                let lines =
                    crate::decoders::base64::encode_wrapped(err.as_bytes(), "\n");
                Body::from_lines(lines)
                    .with_type("application/octet-stream")
                    .with_encoding(Encoding::Base64)
            }
        };
        Ok(body.with_disposition(disposition))
    }

    /// Builds the message.
    pub fn finish(self) -> Result<Message> {
        let MessageBuilder {
            fields,
            data,
            files,
            attachments,
            prebuilt,
            forced,
        } = self;

        let mut bodies: Vec<Body> = Vec::new();
        let mut parts: Vec<Message> = Vec::new();

        if let Some(body) = prebuilt {
            bodies.push(body);
        }
        if let Some(lines) = data {
            bodies.push(Body::from_lines(lines));
        }
        for path in &files {
            bodies.push(Self::body_from_file(path)?);
        }
        for attachment in attachments {
            parts.push(attachment);
        }

        let body = if bodies.len() == 1 && parts.is_empty() {
            bodies.into_iter().next().expect("one body")
        } else if bodies.is_empty() && parts.is_empty() {
            Body::from_text("")
        } else {
            // several sources: multipart/mixed
            let mut all_parts: Vec<Message> = Vec::new();
            for mut body in bodies {
                let mut part = Message::new();
                let wire = body.encoded()?;
                part.set_body(wire)?;
                part.set_is_part(true);
                all_parts.push(part);
            }
            for mut attachment in parts {
                attachment.set_is_part(true);
                all_parts.push(attachment);
            }
            Body::multipart(Multipart {
                preamble: None,
                parts: all_parts,
                epilogue: None,
            })
        };

        let mut message = Message::new();
        for field in fields {
            message.head_mut().add(field);
        }
        message.set_body(body)?;

        // forced values win over what the body inferred
        for field in forced {
            message.head_mut().set(field);
        }

        if message.head().get("date").is_none() {
            message
                .head_mut()
                .add(Field::parse("Date", date::format_date(date::now())));
        }
        if message.head().get("mime-version").is_none() {
            message.head_mut().add(Field::parse("MIME-Version", "1.0"));
        }
        message.ensure_message_id();
        message.head_mut().reset_modified();

        Ok(message)
    }
}

impl MessageBuilder {
    /// Validates that the builder holds at least one destination when a
    /// caller requires one.
    pub fn require_destination(self) -> Result<Self> {
        let has_dest = self.fields.iter().any(|field| {
            field.matches("to") || field.matches("cc") || field.matches("bcc")
        });
        if has_dest {
            Ok(self)
        } else {
            Err(Error::Usage(
                "message needs at least one of To, Cc or Bcc".into(),
            ))
        }
    }
}
