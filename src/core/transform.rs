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

//! Message transformations: reply, forward, bounce and structure rebuild.

use std::io::Write;

use crate::core::body::{Body, Multipart};
use crate::core::date;
use crate::core::field::Field;
use crate::core::header::ResentGroup;
use crate::core::message::Message;
use crate::{Error, Result};

/// Normalizes a subject for a reply: `Re: x`, and `Re[n]: x` for repeated
/// replies.
pub fn reply_subject(subject: &str) -> String {
    let mut rest = subject.trim();
    let mut count = 1u32;
    loop {
        let lower = rest.to_ascii_lowercase();
        if let Some(tail) = lower.strip_prefix("re") {
            if let Some(tail) = tail.strip_prefix(':') {
                count += 1;
                rest = rest[rest.len() - tail.len()..].trim_start();
                continue;
            }
            if let Some(inner_end) = tail.strip_prefix('[').and_then(|t| t.find(']')) {
                let inner = &tail[1..1 + inner_end];
                if let Ok(n) = inner.parse::<u32>() {
                    if tail[1 + inner_end + 1..].starts_with(':') {
                        count += n;
                        let consumed = 2 + 1 + inner_end + 1 + 1;
                        rest = rest[consumed..].trim_start();
                        continue;
                    }
                }
            }
        }
        break;
    }
    if count == 1 {
        format!("Re: {rest}")
    } else {
        format!("Re[{count}]: {rest}")
    }
}

/// Subject for a forwarded message.
pub fn forward_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        "Forw:".to_string()
    } else {
        format!("Forw: {trimmed}")
    }
}

/// How much of the original to carry into a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyInclude {
    No,
    #[default]
    Inline,
    Attach,
}

#[derive(Debug, Clone)]
pub struct ReplyOptions {
    pub include: ReplyInclude,
    /// Prefix for quoted lines.
    pub quote: String,
    /// Line above the quote; defaults to `On <date>, <sender> wrote:`.
    pub prelude: Option<String>,
    pub postlude: Option<String>,
    /// Lines of trailing signature to strip before quoting.
    pub strip_signature_lines: usize,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        ReplyOptions {
            include: ReplyInclude::Inline,
            quote: "> ".to_string(),
            prelude: None,
            postlude: None,
            strip_signature_lines: 10,
        }
    }
}

/// How to embed the original in a forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardInclude {
    #[default]
    Inline,
    Attach,
    Encapsulate,
}

#[derive(Debug, Clone, Default)]
pub struct ForwardOptions {
    pub include: ForwardInclude,
    pub prelude: Option<String>,
    pub postlude: Option<String>,
}

/// Destinations for a bounce; at least one must be set.
#[derive(Debug, Clone, Default)]
pub struct BounceOptions {
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub from: Option<String>,
}

/// One step of a structure rebuild. Rules are applied in order to every
/// part until the structure stops changing.
#[derive(Clone, Copy)]
pub enum RebuildRule {
    /// Remove parts that are marked deleted.
    ReplaceDeletedParts,
    /// Recurse into multipart children.
    DescendMultiparts,
    /// Recurse into nested messages.
    DescendNested,
    /// Collapse a multipart with exactly one remaining part.
    FlattenMultiparts,
    /// Replace a multipart with no remaining parts by a placeholder text.
    FlattenEmptyMultiparts,
    /// A caller-supplied rewrite: `(parent, part)` to the replacement part,
    /// or `None` to remove it.
    Custom(fn(&Message, Message) -> Result<Option<Message>>),
}

impl std::fmt::Debug for RebuildRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RebuildRule::ReplaceDeletedParts => "ReplaceDeletedParts",
            RebuildRule::DescendMultiparts => "DescendMultiparts",
            RebuildRule::DescendNested => "DescendNested",
            RebuildRule::FlattenMultiparts => "FlattenMultiparts",
            RebuildRule::FlattenEmptyMultiparts => "FlattenEmptyMultiparts",
            RebuildRule::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

/// The rule set used when the caller passes none.
pub fn default_rebuild_rules() -> Vec<RebuildRule> {
    vec![
        RebuildRule::ReplaceDeletedParts,
        RebuildRule::DescendMultiparts,
        RebuildRule::DescendNested,
        RebuildRule::FlattenMultiparts,
        RebuildRule::FlattenEmptyMultiparts,
    ]
}

impl Message {
    /// Produces a reply to this message.
    pub fn reply(&mut self, options: ReplyOptions) -> Result<Message> {
        // Reply-To wins over Sender wins over From.
        let destination = self
            .head()
            .get("reply-to")
            .or_else(|| self.head().get("sender"))
            .or_else(|| self.head().get("from"))
            .map(|field| field.unfolded_body())
            .ok_or_else(|| Error::Usage("cannot reply to a message without a sender".into()))?;

        let subject = reply_subject(&self.subject().unwrap_or_default());
        let in_reply_to = self.head().get("message-id").map(|f| f.unfolded_body());

        let body = match options.include {
            ReplyInclude::No => Body::from_text(""),
            ReplyInclude::Inline => {
                let prelude = options.prelude.clone().unwrap_or_else(|| {
                    format!(
                        "On {}, {} wrote:",
                        date::format_date(self.timestamp()),
                        self.sender()
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|| "someone".into())
                    )
                });
                let mut decoded = self.body_mut().decoded()?;
                let mut stripped =
                    decoded.strip_signature(options.strip_signature_lines)?;
                let mut quoted = stripped.foreach_line(|line| format!("{}{line}", options.quote))?;

                let mut lines = vec![format!("{prelude}\n")];
                lines.extend(quoted.lines()?);
                if let Some(postlude) = &options.postlude {
                    lines.push(format!("{postlude}\n"));
                }
                Body::from_lines(lines)
            }
            ReplyInclude::Attach => {
                let mut note = Message::new();
                let prelude = options
                    .prelude
                    .clone()
                    .unwrap_or_else(|| "[your message is attached]".to_string());
                note.set_body(Body::from_text(format!("{prelude}\n")))?;
                note.set_is_part(true);
                let mut original = Message::from_parts(self.head().clone(), self.body().clone());
                original.set_is_part(true);
                let mut attached = Message::new();
                attached.set_body(Body::nested(original))?;
                attached.set_is_part(true);
                Body::multipart(Multipart {
                    preamble: None,
                    parts: vec![note, attached],
                    epilogue: None,
                })
            }
        };

        let mut builder = Message::build_from_body(body)
            .to(destination)
            .subject(subject);
        if let Some(id) = in_reply_to {
            builder = builder.header("In-Reply-To", id.clone());
            let references = match self.head().get_body("references") {
                Some(refs) => format!("{refs} {id}"),
                None => id,
            };
            builder = builder.header("References", references);
        }
        builder.finish()
    }

    /// Produces a forward of this message. Binary content promotes
    /// `Inline` to `Attach` automatically.
    pub fn forward(&mut self, options: ForwardOptions) -> Result<Message> {
        let subject = forward_subject(&self.subject().unwrap_or_default());

        let include = match options.include {
            ForwardInclude::Inline if self.body().is_binary() || self.body().is_multipart() => {
                ForwardInclude::Attach
            }
            include => include,
        };

        let body = match include {
            ForwardInclude::Inline => {
                let prelude = options
                    .prelude
                    .clone()
                    .unwrap_or_else(|| "---- forwarded message ----".to_string());
                let postlude = options
                    .postlude
                    .clone()
                    .unwrap_or_else(|| "---- end forwarded message ----".to_string());
                let mut decoded = self.body_mut().decoded()?;
                let mut lines = vec![format!("{prelude}\n")];
                lines.extend(decoded.lines()?);
                lines.push(format!("{postlude}\n"));
                Body::from_lines(lines)
            }
            ForwardInclude::Attach => {
                let mut note = Message::new();
                let prelude = options
                    .prelude
                    .clone()
                    .unwrap_or_else(|| "[forwarded message attached]".to_string());
                note.set_body(Body::from_text(format!("{prelude}\n")))?;
                note.set_is_part(true);
                let mut copy = Message::from_parts(self.head().clone(), self.body().clone());
                copy.set_is_part(true);
                Body::multipart(Multipart {
                    preamble: None,
                    parts: vec![note, copy],
                    epilogue: None,
                })
            }
            ForwardInclude::Encapsulate => {
                let copy = Message::from_parts(self.head().clone(), self.body().clone());
                Body::nested(copy)
            }
        };

        Message::build_from_body(body).subject(subject).finish()
    }

    /// Clones the message and prepends a fresh resent group. At least one
    /// of To, Cc or Bcc must be given.
    pub fn bounce(&self, options: BounceOptions) -> Result<Message> {
        if options.to.is_none() && options.cc.is_none() && options.bcc.is_none() {
            return Err(Error::Usage(
                "bounce needs at least one of To, Cc or Bcc".into(),
            ));
        }

        let mut group = ResentGroup::new();
        if let Some(from) = &options.from {
            group.push(Field::parse("Resent-From", from));
        }
        if let Some(to) = &options.to {
            group.push(Field::parse("Resent-To", to));
        }
        if let Some(cc) = &options.cc {
            group.push(Field::parse("Resent-Cc", cc));
        }
        if let Some(bcc) = &options.bcc {
            group.push(Field::parse("Resent-Bcc", bcc));
        }
        group.normalize();

        let mut bounced = Message::from_parts(self.head().clone(), self.body().clone());
        bounced.head_mut().add_resent_group(group);
        Ok(bounced)
    }

    /// Applies part-rewrite rules over the whole structure until a fixed
    /// point. An empty rule list means the default set.
    pub fn rebuild(&self, rules: &[RebuildRule]) -> Result<Message> {
        let rules = if rules.is_empty() {
            default_rebuild_rules()
        } else {
            rules.to_vec()
        };
        let mut current = self.clone();
        for _ in 0..32 {
            let (next, changed) = rebuild_pass(current, &rules)?;
            current = next;
            if !changed {
                break;
            }
        }
        Ok(current)
    }

    /// Prints an indented tree of `type: subject (size[, deleted])`.
    pub fn print_structure(&self, out: &mut impl Write, indent: usize) -> std::io::Result<()> {
        writeln!(
            out,
            "{:indent$}{}: {} ({} bytes{})",
            "",
            self.body().type_name(),
            self.subject().unwrap_or_default(),
            self.size(),
            if self.is_deleted() { ", deleted" } else { "" },
        )?;
        if let Some(multipart) = self.body().as_multipart() {
            for part in &multipart.parts {
                part.print_structure(out, indent + 2)?;
            }
        } else if let Some(inner) = self.body().as_nested() {
            inner.print_structure(out, indent + 2)?;
        }
        Ok(())
    }
}

fn has_rule(rules: &[RebuildRule], wanted: fn(&RebuildRule) -> bool) -> bool {
    rules.iter().any(wanted)
}

fn rebuild_pass(mut message: Message, rules: &[RebuildRule]) -> Result<(Message, bool)> {
    let mut changed = false;

    if message.body().is_multipart()
        && has_rule(rules, |r| matches!(r, RebuildRule::DescendMultiparts))
    {
        let parent = message.clone();
        let multipart = message.body_mut().as_multipart_mut().expect("multipart");
        let mut kept: Vec<Message> = Vec::new();
        for part in std::mem::take(&mut multipart.parts) {
            let mut part = Some(part);
            for rule in rules {
                let current = match part.take() {
                    Some(current) => current,
                    None => break,
                };
                part = match rule {
                    RebuildRule::ReplaceDeletedParts if current.is_deleted() => {
                        changed = true;
                        None
                    }
                    RebuildRule::Custom(f) => {
                        let replaced = f(&parent, current)?;
                        if replaced.is_none() {
                            changed = true;
                        }
                        replaced
                    }
                    _ => Some(current),
                };
            }
            if let Some(part) = part {
                let (rebuilt, part_changed) = rebuild_pass(part, rules)?;
                changed |= part_changed;
                kept.push(rebuilt);
            }
        }
        multipart.parts = kept;
    }

    if message.body().is_nested() && has_rule(rules, |r| matches!(r, RebuildRule::DescendNested)) {
        if let Some(inner) = message.body_mut().as_nested_mut() {
            let (rebuilt, inner_changed) = rebuild_pass(inner.clone(), rules)?;
            *inner = rebuilt;
            changed |= inner_changed;
        }
    }

    if message.body().is_multipart() {
        let active = message
            .body()
            .as_multipart()
            .map(|mp| mp.parts.len())
            .unwrap_or(0);
        if active == 1 && has_rule(rules, |r| matches!(r, RebuildRule::FlattenMultiparts)) {
            let mut part = message
                .body_mut()
                .as_multipart_mut()
                .and_then(|mp| mp.parts.pop())
                .expect("one part");
            let body = std::mem::take(part.body_mut());
            message.set_body(body)?;
            changed = true;
        } else if active == 0
            && has_rule(rules, |r| matches!(r, RebuildRule::FlattenEmptyMultiparts))
        {
            message.set_body(Body::from_text(
                "[the message parts were removed]\n",
            ))?;
            changed = true;
        }
    }

    Ok((message, changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &[u8] = b"From: Art Vandelay <art@vandelay.com>\nTo: kramer@kramerica.com\nSubject: importing\nMessage-Id: <orig@example.com>\nDate: Sat, 20 Nov 2021 22:22:01 +0000\n\nbody line one\nbody line two\n";

    #[test]
    fn reply_subject_normalizes() {
        assert_eq!(reply_subject("hello"), "Re: hello");
        assert_eq!(reply_subject("Re: hello"), "Re[2]: hello");
        assert_eq!(reply_subject(&reply_subject("hello")), "Re[2]: hello");
        assert_eq!(reply_subject("Re[3]: hello"), "Re[4]: hello");
        assert_eq!(reply_subject("re: re: hello"), "Re[3]: hello");
    }

    #[test]
    fn forward_subject_prefixes() {
        assert_eq!(forward_subject("hello"), "Forw: hello");
        assert_eq!(forward_subject(""), "Forw:");
    }

    #[test]
    fn inline_reply_quotes() {
        let mut original = Message::parse(ORIGINAL).unwrap();
        let mut reply = original.reply(ReplyOptions::default()).unwrap();

        assert_eq!(reply.subject().unwrap(), "Re: importing");
        assert_eq!(
            reply.head().get_body("to").unwrap(),
            "Art Vandelay <art@vandelay.com>"
        );
        assert_eq!(
            reply.head().get_body("in-reply-to").unwrap(),
            "<orig@example.com>"
        );
        let text = reply.body_mut().string().unwrap();
        assert!(text.contains("> body line one"));
        assert!(text.contains("wrote:"));
    }

    #[test]
    fn reply_prefers_reply_to() {
        let input = b"From: a@example.com\nReply-To: b@example.com\nSubject: x\n\nbody\n";
        let mut original = Message::parse(input).unwrap();
        let reply = original.reply(ReplyOptions::default()).unwrap();
        assert_eq!(reply.head().get_body("to").unwrap(), "b@example.com");
    }

    #[test]
    fn forward_encapsulates() {
        let mut original = Message::parse(ORIGINAL).unwrap();
        let forwarded = original
            .forward(ForwardOptions {
                include: ForwardInclude::Encapsulate,
                ..ForwardOptions::default()
            })
            .unwrap();
        assert_eq!(forwarded.subject().unwrap(), "Forw: importing");
        assert!(forwarded.body().is_nested());
        assert_eq!(
            forwarded
                .body()
                .as_nested()
                .unwrap()
                .subject()
                .unwrap(),
            "importing"
        );
    }

    #[test]
    fn binary_forward_promotes_to_attach() {
        let input = b"From: a@example.com\nSubject: bin\nContent-Type: application/octet-stream\n\n\x01\x02\n";
        let mut original = Message::parse(input).unwrap();
        let forwarded = original.forward(ForwardOptions::default()).unwrap();
        assert!(forwarded.body().is_multipart());
    }

    #[test]
    fn bounce_requires_destination() {
        let original = Message::parse(ORIGINAL).unwrap();
        assert!(original.bounce(BounceOptions::default()).is_err());
    }

    #[test]
    fn bounce_prepends_group() {
        let input = b"Received: by relay; Sat, 20 Nov 2021 10:00:00 +0000\nFrom: a@example.com\nSubject: x\n\nbody\n";
        let original = Message::parse(input).unwrap();
        let bounced = original
            .bounce(BounceOptions {
                to: Some("target@example.com".into()),
                ..BounceOptions::default()
            })
            .unwrap();

        let groups = bounced.head().resent_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].resent_to().unwrap().unfolded_body(),
            "target@example.com"
        );
        assert!(groups[0].resent_message_id().is_some());
        assert!(groups[0].resent_date().is_some());
        assert!(groups[1].resent_to().is_none());
    }

    #[test]
    fn rebuild_flattens() {
        let input = b"From: me@example.com\nContent-Type: multipart/mixed; boundary=cut\n\n--cut\nContent-Type: text/plain\n\nkeep me\n--cut\nContent-Type: text/plain\n\ndrop me\n--cut--\n";
        let mut message = Message::parse(input).unwrap();
        message.body_mut().as_multipart_mut().unwrap().parts[1].delete();

        let mut rebuilt = message.rebuild(&[]).unwrap();
        // one survivor: the multipart collapsed into a plain body
        assert!(!rebuilt.body().is_multipart());
        assert_eq!(rebuilt.body_mut().string().unwrap(), "keep me\n");
    }

    #[test]
    fn rebuild_empty_multipart_placeholder() {
        let input = b"From: me@example.com\nContent-Type: multipart/mixed; boundary=cut\n\n--cut\nContent-Type: text/plain\n\nonly part\n--cut--\n";
        let mut message = Message::parse(input).unwrap();
        message.body_mut().as_multipart_mut().unwrap().parts[0].delete();

        let mut rebuilt = message.rebuild(&[]).unwrap();
        assert!(!rebuilt.body().is_multipart());
        assert!(rebuilt
            .body_mut()
            .string()
            .unwrap()
            .contains("removed"));
    }

    #[test]
    fn print_structure_tree() {
        let input = b"From: me@example.com\nSubject: tree\nContent-Type: multipart/mixed; boundary=cut\n\n--cut\nContent-Type: text/plain\n\nx\n--cut--\n";
        let message = Message::parse(input).unwrap();
        let mut out = Vec::new();
        message.print_structure(&mut out, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("multipart/mixed: tree"));
        assert!(text.contains("\n  text/plain"));
    }
}
