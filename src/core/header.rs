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

use std::cell::Cell;
use std::fmt::{self, Display};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::core::date;
use crate::core::field::{Field, DEFAULT_WRAP};
use crate::lockers::hostname;

/// How much of a header is present in memory.
///
/// Transitions are monotonic toward `Complete`: requesting a field a
/// `Delayed` or `Subset` header does not know triggers a full load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderState {
    #[default]
    Complete,
    /// Some fields known (for instance from a header cache); the rest is
    /// still on disk.
    Subset,
    /// Nothing read yet; only the byte range is known.
    Delayed,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Field(Field),
    /// Remembers the position of a removed field so that a reappearing
    /// field of that name shows up in its old place.
    Placeholder(String),
}

/// An ordered collection of header fields.
///
/// Insertion order is preserved across clone and print; lookups by name are
/// case-insensitive. Any change raises the modified flag, which the owning
/// message picks up.
#[derive(Debug, Clone, Default)]
pub struct Header {
    slots: Vec<Slot>,
    state: HeaderState,
    modified: bool,
    wrap: usize,
    timestamp: Cell<Option<Option<i64>>>,
}

impl Header {
    pub fn new() -> Header {
        Header {
            slots: Vec::new(),
            state: HeaderState::Complete,
            modified: false,
            wrap: DEFAULT_WRAP,
            timestamp: Cell::new(None),
        }
    }

    /// A header known only by its byte range on disk.
    pub fn delayed() -> Header {
        Header {
            state: HeaderState::Delayed,
            ..Header::new()
        }
    }

    /// Builds a complete header from parser output.
    pub fn from_fields(fields: Vec<Field>) -> Header {
        Header {
            slots: fields.into_iter().map(Slot::Field).collect(),
            ..Header::new()
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    pub fn set_state(&mut self, state: HeaderState) {
        self.state = state;
    }

    /// Whether a lookup for this name can be answered without touching the
    /// folder file.
    pub fn knows(&self, name: &str) -> bool {
        match self.state {
            HeaderState::Complete => true,
            HeaderState::Delayed => false,
            HeaderState::Subset => self
                .slots
                .iter()
                .any(|slot| matches!(slot, Slot::Field(f) if f.matches(name))),
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn reset_modified(&mut self) {
        self.modified = false;
    }

    pub fn set_wrap(&mut self, wrap: usize) {
        self.wrap = wrap;
    }

    /// Column where field bodies fold on emission.
    pub fn wrap(&self) -> usize {
        self.wrap
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_fields().is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered_fields().len()
    }

    /// All fields in insertion order.
    pub fn ordered_fields(&self) -> Vec<&Field> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Field(field) => Some(field),
                Slot::Placeholder(_) => None,
            })
            .collect()
    }

    /// The distinct field names, lowercased, in first-appearance order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for field in self.ordered_fields() {
            let lname = field.lname();
            if !names.contains(&lname) {
                names.push(lname);
            }
        }
        names
    }

    /// Appends a field. A repeated name becomes an ordered list under that
    /// name.
    pub fn add(&mut self, field: Field) {
        self.invalidate_caches();
        self.modified = true;
        let lname = field.lname();
        let has_field = self
            .slots
            .iter()
            .any(|slot| matches!(slot, Slot::Field(f) if f.lname() == lname));
        if !has_field {
            if let Some(pos) = self
                .slots
                .iter()
                .position(|slot| matches!(slot, Slot::Placeholder(n) if *n == lname))
            {
                self.slots[pos] = Slot::Field(field);
                return;
            }
        }
        self.slots.push(Slot::Field(field));
    }

    /// Replaces all occurrences of the field's name.
    ///
    /// For `Content-Transfer-Encoding` and `Content-Disposition` the literal
    /// body `none` erases the field instead.
    pub fn set(&mut self, field: Field) {
        let lname = field.lname();
        if field.body() == "none"
            && matches!(
                lname.as_str(),
                "content-transfer-encoding" | "content-disposition"
            )
        {
            self.reset(&lname, Vec::new());
        } else {
            self.reset(&lname, vec![field]);
        }
    }

    /// Replaces all fields under `name` with the given list; an empty list
    /// deletes, leaving a placeholder so the name can reappear in place.
    pub fn reset(&mut self, name: &str, fields: Vec<Field>) {
        self.invalidate_caches();
        self.modified = true;
        let lname = name.to_ascii_lowercase();

        let first = self.position_of(&lname);
        self.slots.retain(|slot| match slot {
            Slot::Field(f) => f.lname() != lname,
            Slot::Placeholder(n) => *n != lname,
        });

        let at = first.unwrap_or(self.slots.len()).min(self.slots.len());
        if fields.is_empty() {
            self.slots.insert(at, Slot::Placeholder(lname));
        } else {
            for (offset, field) in fields.into_iter().enumerate() {
                self.slots.insert(at + offset, Slot::Field(field));
            }
        }
    }

    /// Deletes all fields under `name`.
    pub fn delete(&mut self, name: &str) {
        self.reset(name, Vec::new());
    }

    /// Removes one specific field occurrence.
    pub fn remove_field(&mut self, field: &Field) -> bool {
        if let Some(pos) = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Field(f) if f == field))
        {
            self.invalidate_caches();
            self.modified = true;
            self.slots.remove(pos);
            true
        } else {
            false
        }
    }

    fn position_of(&self, lname: &str) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Field(f) => f.lname() == lname,
            Slot::Placeholder(n) => n == lname,
        })
    }

    /// The last field under `name`, the conventional answer for repeated
    /// fields.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.ordered_fields()
            .into_iter()
            .filter(|f| f.matches(name))
            .last()
    }

    /// The `index`th field under `name`, counting from zero.
    pub fn get_index(&self, name: &str, index: usize) -> Option<&Field> {
        self.ordered_fields()
            .into_iter()
            .filter(|f| f.matches(name))
            .nth(index)
    }

    pub fn get_all(&self, name: &str) -> Vec<&Field> {
        self.ordered_fields()
            .into_iter()
            .filter(|f| f.matches(name))
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).len()
    }

    /// Body of the last field under `name`, unfolded.
    pub fn get_body(&self, name: &str) -> Option<String> {
        self.get(name).map(|f| f.unfolded_body())
    }

    /// Fields whose name matches any of the patterns, in header order. A
    /// pattern ending in `*` matches as a prefix, anything else matches the
    /// whole name; both case-insensitively.
    pub fn grep_names(&self, patterns: &[&str]) -> Vec<&Field> {
        self.ordered_fields()
            .into_iter()
            .filter(|field| {
                let lname = field.lname();
                patterns.iter().any(|pattern| {
                    let pattern = pattern.to_ascii_lowercase();
                    match pattern.strip_suffix('*') {
                        Some(prefix) => lname.starts_with(prefix),
                        None => lname == pattern,
                    }
                })
            })
            .collect()
    }

    /// Partitions the trace fields into resent groups, most recent first.
    pub fn resent_groups(&self) -> Vec<ResentGroup> {
        let mut groups = Vec::new();
        let mut pending: Vec<Field> = Vec::new();
        let mut current: Option<ResentGroup> = None;

        for field in self.ordered_fields() {
            let lname = field.lname();
            match lname.as_str() {
                "return-path" | "delivered-to" => {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    pending.push(field.clone());
                }
                "received" => {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    let mut fields = std::mem::take(&mut pending);
                    fields.push(field.clone());
                    current = Some(ResentGroup { fields });
                }
                _ if lname.starts_with("resent-") => {
                    if let Some(group) = current.as_mut() {
                        group.fields.push(field.clone());
                    }
                }
                _ => {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    pending.clear();
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }
        groups
    }

    pub fn nr_resent_groups(&self) -> usize {
        self.resent_groups().len()
    }

    /// Inserts a resent group before the existing first one, making it the
    /// most recent transmission step.
    pub fn add_resent_group(&mut self, group: ResentGroup) {
        self.invalidate_caches();
        self.modified = true;
        let at = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Field(f) if f.matches("received")))
            .unwrap_or(0);
        for (offset, field) in group.fields.into_iter().enumerate() {
            self.slots.insert(at + offset, Slot::Field(field));
        }
    }

    /// Removes every field of one resent group.
    pub fn remove_resent_group(&mut self, group: &ResentGroup) {
        for field in group.fields() {
            self.remove_field(field);
        }
    }

    /// Estimates the body size from `Content-Length`, or `Lines` at forty
    /// bytes a line.
    pub fn guess_body_size(&self) -> Option<u64> {
        if let Some(length) = self
            .get_body("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return Some(length);
        }
        self.get_body("lines")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|lines| lines * 40)
    }

    /// Best guess of the message timestamp: the `Date` field, else the date
    /// stamped in the most recent `Received` field. Memoized.
    pub fn guess_timestamp(&self) -> Option<i64> {
        if let Some(cached) = self.timestamp.get() {
            return cached;
        }
        let mut guess = self.get("date").and_then(|f| f.timestamp());
        if guess.is_none() {
            guess = self
                .get_all("received")
                .iter()
                .find_map(|field| field.comment().and_then(|date| date::parse_date(&date)));
        }
        self.timestamp.set(Some(guess));
        guess
    }

    /// The guessed timestamp, or the current time when the header carries
    /// no usable date at all.
    pub fn timestamp(&self) -> i64 {
        self.guess_timestamp().unwrap_or_else(date::now)
    }

    fn invalidate_caches(&mut self) {
        self.timestamp.set(None);
    }

    /// Synthesizes an mbox envelope line (without trailing newline) from the
    /// `From` field and the timestamp.
    pub fn create_from_line(&self) -> String {
        let sender = self
            .get("sender")
            .or_else(|| self.get("from"))
            .map(|f| f.addresses())
            .and_then(|list| list.into_iter().next())
            .map(|addr| addr.address)
            .unwrap_or_else(|| "MAILER-DAEMON".to_string());
        format!("From {} {}", sender, date::format_ctime(self.timestamp()))
    }

    /// Writes all fields in order using the given line separator. The blank
    /// line ending the header is the caller's business.
    pub fn write(&self, out: &mut impl Write, eol: &str) -> std::io::Result<()> {
        for field in self.ordered_fields() {
            field.write(out, eol)?;
        }
        Ok(())
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in self.ordered_fields() {
            Display::fmt(field, f)?;
        }
        Ok(())
    }
}

/// A contiguous block of trace fields logging one transmission step:
/// optional `Return-Path` and `Delivered-To`, one `Received`, then any
/// number of `Resent-*` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResentGroup {
    fields: Vec<Field>,
}

impl ResentGroup {
    pub fn new() -> ResentGroup {
        ResentGroup::default()
    }

    pub fn from_fields(fields: Vec<Field>) -> ResentGroup {
        ResentGroup { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    fn find(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.matches(name))
    }

    pub fn received(&self) -> Option<&Field> {
        self.find("received")
    }

    pub fn return_path(&self) -> Option<&Field> {
        self.find("return-path")
    }

    pub fn delivered_to(&self) -> Option<&Field> {
        self.find("delivered-to")
    }

    pub fn resent_from(&self) -> Option<&Field> {
        self.find("resent-from")
    }

    pub fn resent_sender(&self) -> Option<&Field> {
        self.find("resent-sender")
    }

    pub fn resent_to(&self) -> Option<&Field> {
        self.find("resent-to")
    }

    pub fn resent_cc(&self) -> Option<&Field> {
        self.find("resent-cc")
    }

    pub fn resent_bcc(&self) -> Option<&Field> {
        self.find("resent-bcc")
    }

    pub fn resent_date(&self) -> Option<&Field> {
        self.find("resent-date")
    }

    pub fn resent_message_id(&self) -> Option<&Field> {
        self.find("resent-message-id")
    }

    /// Fills in the fields every group must carry: `Received`,
    /// `Resent-Date` and `Resent-Message-ID`.
    pub fn normalize(&mut self) {
        if self.received().is_none() {
            let received = format!(
                "from localhost by {} with local (mail-store); {}",
                hostname(),
                date::format_date(date::now())
            );
            self.fields
                .insert(0, Field::parse("Received", received));
        }
        if self.resent_date().is_none() {
            self.push(Field::parse("Resent-Date", date::format_date(date::now())));
        }
        if self.resent_message_id().is_none() {
            self.push(Field::parse("Resent-Message-ID", create_message_id()));
        }
    }
}

static MSGID_COUNTER: AtomicU64 = AtomicU64::new(0);
static MSGID_PREFIX: OnceLock<String> = OnceLock::new();

/// The prefix used for generated message ids,
/// `mailbox-<hostname>-<pid>` unless overridden.
pub fn message_id_prefix() -> &'static str {
    MSGID_PREFIX
        .get_or_init(|| format!("mailbox-{}-{}", hostname(), std::process::id()))
        .as_str()
}

/// Overrides the generated message-id prefix. Only effective before the
/// first id is generated.
pub fn set_message_id_prefix(prefix: impl Into<String>) {
    let _ = MSGID_PREFIX.set(prefix.into());
}

/// A fresh, unique message id in angle brackets.
pub fn create_message_id() -> String {
    format!(
        "<{}-{}>",
        message_id_prefix(),
        MSGID_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        let mut h = Header::new();
        h.add(Field::parse("From", "me@example.com"));
        h.add(Field::parse("To", "you@example.com"));
        h.add(Field::parse("Subject", "testing"));
        h
    }

    #[test]
    fn add_and_get() {
        let mut h = header();
        assert_eq!(h.len(), 3);
        assert_eq!(h.get_body("subject").unwrap(), "testing");

        h.add(Field::parse("Received", "by a; Sat, 20 Nov 2021 14:22:01 -0800"));
        h.add(Field::parse("Received", "by b; Sat, 20 Nov 2021 15:22:01 -0800"));
        assert_eq!(h.count("received"), 2);
        // scalar get returns the last occurrence
        assert!(h.get("received").unwrap().unfolded_body().starts_with("by b"));
        assert!(h
            .get_index("received", 0)
            .unwrap()
            .unfolded_body()
            .starts_with("by a"));
    }

    #[test]
    fn reset_remembers_slot() {
        let mut h = header();
        h.delete("to");
        assert_eq!(h.count("to"), 0);
        assert_eq!(h.names(), vec!["from", "subject"]);

        h.add(Field::parse("To", "other@example.com"));
        // reappears between From and Subject
        let names: Vec<String> = h.ordered_fields().iter().map(|f| f.lname()).collect();
        assert_eq!(names, vec!["from", "to", "subject"]);
    }

    #[test]
    fn set_replaces_all() {
        let mut h = header();
        h.add(Field::parse("To", "second@example.com"));
        h.set(Field::parse("To", "final@example.com"));
        assert_eq!(h.count("to"), 1);
        assert_eq!(h.get_body("to").unwrap(), "final@example.com");
    }

    #[test]
    fn set_none_erases_encoding() {
        let mut h = header();
        h.add(Field::parse("Content-Transfer-Encoding", "base64"));
        h.set(Field::parse("Content-Transfer-Encoding", "none"));
        assert_eq!(h.count("content-transfer-encoding"), 0);

        // but not for other fields
        h.set(Field::parse("Subject", "none"));
        assert_eq!(h.get_body("subject").unwrap(), "none");
    }

    #[test]
    fn remove_one_of_duplicates() {
        let mut h = header();
        h.add(Field::parse("Received", "by a; x"));
        h.add(Field::parse("Received", "by b; y"));
        let victim = Field::parse("Received", "by a; x");
        assert!(h.remove_field(&victim));
        assert_eq!(h.count("received"), 1);
        assert!(!h.remove_field(&victim));
    }

    #[test]
    fn grep_patterns() {
        let mut h = header();
        h.add(Field::parse("Resent-To", "a@example.com"));
        h.add(Field::parse("Resent-Date", "Sat, 20 Nov 2021 14:22:01 -0800"));
        let matched = h.grep_names(&["Resent-*", "subject"]);
        let names: Vec<String> = matched.iter().map(|f| f.lname()).collect();
        assert_eq!(names, vec!["subject", "resent-to", "resent-date"]);
    }

    #[test]
    fn resent_group_extraction() {
        let mut h = Header::new();
        h.add(Field::parse("Return-Path", "<bounce@example.com>"));
        h.add(Field::parse("Received", "by relay2; Sun, 21 Nov 2021 10:00:00 +0000"));
        h.add(Field::parse("Resent-From", "relay@example.com"));
        h.add(Field::parse("Resent-To", "final@example.com"));
        h.add(Field::parse("Received", "by relay1; Sat, 20 Nov 2021 10:00:00 +0000"));
        h.add(Field::parse("From", "me@example.com"));

        let groups = h.resent_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].return_path().is_some());
        assert_eq!(
            groups[0].resent_to().unwrap().unfolded_body(),
            "final@example.com"
        );
        assert!(groups[1].resent_to().is_none());

        // contiguity: each group's fields appear back to back in order
        let ordered: Vec<String> = h.ordered_fields().iter().map(|f| f.lname()).collect();
        assert_eq!(
            ordered,
            vec![
                "return-path",
                "received",
                "resent-from",
                "resent-to",
                "received",
                "from"
            ]
        );
    }

    #[test]
    fn add_resent_group_on_top() {
        let mut h = Header::new();
        h.add(Field::parse("Received", "by old; Sat, 20 Nov 2021 10:00:00 +0000"));
        h.add(Field::parse("From", "me@example.com"));

        let mut group = ResentGroup::new();
        group.push(Field::parse("Resent-To", "new@example.com"));
        group.normalize();
        h.add_resent_group(group);

        let groups = h.resent_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].resent_to().unwrap().unfolded_body(),
            "new@example.com"
        );
        assert!(groups[0].resent_message_id().is_some());
        assert!(groups[0].resent_date().is_some());
    }

    #[test]
    fn size_and_timestamp_guesses() {
        let mut h = Header::new();
        h.add(Field::parse("Lines", "10"));
        assert_eq!(h.guess_body_size(), Some(400));
        h.add(Field::parse("Content-Length", "1234"));
        assert_eq!(h.guess_body_size(), Some(1234));

        assert_eq!(h.guess_timestamp(), None);
        h.add(Field::parse(
            "Received",
            "from a by b; Sat, 20 Nov 2021 22:22:01 +0000",
        ));
        assert_eq!(h.guess_timestamp(), Some(1637446921));
        h.add(Field::parse("Date", "Sat, 20 Nov 2021 23:22:01 +0000"));
        assert_eq!(h.guess_timestamp(), Some(1637446921 + 3600));
    }

    #[test]
    fn from_line_synthesis() {
        let mut h = Header::new();
        h.add(Field::parse("From", "Art Vandelay <art@vandelay.com>"));
        h.add(Field::parse("Date", "Sat, 20 Nov 2021 22:22:01 +0000"));
        assert_eq!(
            h.create_from_line(),
            "From art@vandelay.com Sat Nov 20 22:22:01 2021"
        );
    }

    #[test]
    fn generated_ids_are_unique() {
        let first = create_message_id();
        let second = create_message_id();
        assert_ne!(first, second);
        assert!(first.starts_with('<') && first.ends_with('>'));
    }
}
