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

//! The mbox folder format: all messages concatenated in one file.
//!
//! Each message starts with an envelope line `From <sender> <date>`; body
//! lines that would look like one are stored `>From `-escaped. Messages are
//! separated by a blank line. Unmodified messages are rewritten byte for
//! byte by copying their recorded ranges.

use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::NamedTempFile;

use crate::core::field::Field;
use crate::core::header::Header;
use crate::core::message::Message;
use crate::parsers::source::{MailSource, Separator};
use crate::report::Severity;
use crate::{Access, Error, Organization, Result};

use super::{
    is_sidecar_name, resolve_name, Folder, FolderOptions, FolderState, MailboxFormat,
    RewriteMode, WriteOptions,
};

/// Whether a path looks like an mbox folder: a regular file that is empty
/// or starts with an envelope line.
pub fn found_in(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return false,
    }
    match fs::read(path) {
        Ok(bytes) => bytes.is_empty() || bytes.starts_with(b"From "),
        Err(_) => false,
    }
}

pub(crate) struct MboxFormat;

impl Folder {
    /// Opens an mbox folder. `=name` resolves against the folder directory,
    /// defaulting to `$HOME/Mail`.
    pub fn open_mbox(name: &str, options: FolderOptions) -> Result<Folder> {
        let path = resolve_name(name, options.folderdir.as_deref(), "Mail");
        open_at(name.to_string(), path, options)
    }
}

pub(crate) fn open_at(name: String, path: PathBuf, options: FolderOptions) -> Result<Folder> {
    if !path.exists() {
        if options.create && options.access.writable() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, b"")?;
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no mbox folder at {}", path.display()),
            )));
        }
    }
    Folder::open_with_format(name, path, options, Box::new(MboxFormat))
}

impl MailboxFormat for MboxFormat {
    fn type_name(&self) -> &'static str {
        "mbox"
    }

    fn organization(&self) -> Organization {
        Organization::File
    }

    fn read_messages(&mut self, state: &mut FolderState) -> Result<()> {
        let mut source = MailSource::new(&state.path, Access::Read);
        source.set_unescape_from(true);
        source.start(true)?;
        source.push_separator(Separator::FromLine);

        let rc = Rc::new(RefCell::new(source));
        state.source = Some(rc.clone());

        loop {
            let mut source = rc.borrow_mut();
            let (from_offset, from_line) = match source.read_separator()? {
                Some(envelope) => envelope,
                None => break,
            };
            let (head_offset, raw_fields) = source.read_header()?;
            let head = Header::from_fields(
                raw_fields
                    .into_iter()
                    .map(|(name, body)| Field::parse(name, body))
                    .collect(),
            );

            let size_guess = head.guess_body_size();
            let lines_guess = head
                .get_body("lines")
                .and_then(|lines| lines.trim().parse::<u32>().ok());
            let eager = state.extract.eager(size_guess, Some(&head));
            let eol = source.eol();
            let body_offset = source.file_position();

            let (body, end) = if eager {
                let (begin, lines) = source.body_as_lines(size_guess, lines_guess)?;
                let end = source.file_position();
                let mut body = crate::Body::from_lines(lines).with_eol(eol);
                body.set_range(Some((begin, end)));
                (body, end)
            } else {
                let (begin, end, lines) = source.body_delayed(size_guess, lines_guess)?;
                let body = crate::Body::delayed(begin, end, Some(lines), Rc::downgrade(&rc))
                    .with_eol(eol);
                (body, end)
            };
            drop(source);

            let mut message = Message::from_parts(head, body);
            message.from_line = Some(from_line);
            message.range = Some((from_offset, end));
            message.head_range = Some((head_offset, body_offset));
            message.apply_content_headers();
            message.labels_from_status();
            if eager {
                message.unpack()?;
            }
            state.push_message(message);
        }

        state.eol = rc.borrow().eol();
        Ok(())
    }

    fn write(&mut self, state: &mut FolderState, options: &WriteOptions) -> Result<()> {
        let result = match options.mode {
            RewriteMode::Replace => write_replace(state, options),
            RewriteMode::Inplace => write_inplace(state, options),
            RewriteMode::Auto => write_replace(state, options).or_else(|e| {
                state.reporter.report(
                    Severity::Notice,
                    format!("replace write failed ({e}), trying in place"),
                );
                write_inplace(state, options)
            }),
        };
        result?;

        if state.remove_when_empty
            && state
                .messages
                .iter()
                .all(|message| message.is_deleted() && !options.keep_deleted)
        {
            if let Some(source) = &state.source {
                source.borrow_mut().stop();
            }
            fs::remove_file(&state.path)?;
        }
        Ok(())
    }

    fn update(&mut self, state: &mut FolderState) -> Result<()> {
        let rc = match &state.source {
            Some(rc) => rc.clone(),
            None => return Ok(()),
        };
        {
            let mut source = rc.borrow_mut();
            source.accept_changes();
            source.stop();
            source.start(true)?;
        }

        let known_end = state
            .messages
            .iter()
            .filter_map(|message| message.range)
            .map(|(_, end)| end)
            .max()
            .unwrap_or(0);

        let mut found = 0;
        loop {
            let mut source = rc.borrow_mut();
            if found == 0 {
                if source.size() < known_end {
                    state.reporter.report(
                        Severity::Error,
                        "folder file shrank behind our back, not rescanning",
                    );
                    return Err(Error::FileChanged(state.path.clone()));
                }
                if source.size() == known_end {
                    return Ok(());
                }
                source.seek_to(known_end)?;
            }

            let (from_offset, from_line) = match source.read_separator()? {
                Some(envelope) => envelope,
                None => break,
            };
            let (head_offset, raw_fields) = source.read_header()?;
            let head = Header::from_fields(
                raw_fields
                    .into_iter()
                    .map(|(name, body)| Field::parse(name, body))
                    .collect(),
            );
            let eol = source.eol();
            let body_offset = source.file_position();
            let (begin, end, lines) = source.body_delayed(head.guess_body_size(), None)?;
            let body =
                crate::Body::delayed(begin, end, Some(lines), Rc::downgrade(&rc)).with_eol(eol);
            drop(source);

            let mut message = Message::from_parts(head, body);
            message.from_line = Some(from_line);
            message.range = Some((from_offset, end));
            message.head_range = Some((head_offset, body_offset));
            message.apply_content_headers();
            message.labels_from_status();
            state.push_message(message);
            found += 1;
        }

        if found > 0 {
            state.reporter.report(
                Severity::Notice,
                format!("picked up {found} externally appended messages"),
            );
        }
        Ok(())
    }

    fn subfolders(&self, state: &FolderState) -> Result<Vec<String>> {
        let dir = subfolder_dir(&state.path);
        let mut names = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !is_sidecar_name(&name) {
                    names.push(name);
                }
            }
            names.sort();
        }
        Ok(names)
    }

    fn open_subfolder(
        &self,
        state: &FolderState,
        name: &str,
        options: FolderOptions,
    ) -> Result<Folder> {
        let path = subfolder_dir(&state.path).join(name);
        open_at(format!("{}/{}", state.name, name), path, options)
    }

    fn delete_folder(&mut self, state: &mut FolderState) -> Result<()> {
        if let Some(source) = &state.source {
            source.borrow_mut().stop();
        }
        let dir = subfolder_dir(&state.path);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        if state.path.exists() {
            fs::remove_file(&state.path)?;
        }
        Ok(())
    }

    fn coerce(&self, state: &FolderState, message: &mut Message) {
        // the envelope will be synthesized at write time; make sure stale
        // location data from another folder does not leak in
        message.range = None;
        message.head_range = None;
        message.file_number = None;
        message.file_name = None;
        let _ = state;
    }
}

/// The directory holding this folder's simulated subfolders.
pub(crate) fn subfolder_dir(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".d");
    PathBuf::from(name)
}

fn needs_escape(line: &str) -> bool {
    line.trim_start_matches('>').starts_with("From ")
}

/// Serializes one message into `out`: envelope, header with refreshed
/// `Status` fields, blank line, `From `-escaped body, and the blank
/// separator line. Records the new byte range.
fn write_message(
    out: &mut impl Write,
    message: &mut Message,
    pos: &mut u64,
    eol: &str,
) -> Result<()> {
    message.load_head()?;
    message.status_from_labels();

    let from_line = message
        .from_line
        .clone()
        .unwrap_or_else(|| message.head().create_from_line());

    let mut buffer = Vec::with_capacity(message.size() as usize + from_line.len() + 8);
    buffer.extend_from_slice(from_line.as_bytes());
    buffer.extend_from_slice(eol.as_bytes());
    message.head().write(&mut buffer, eol)?;
    buffer.extend_from_slice(eol.as_bytes());

    for line in message.body_mut().lines()? {
        if needs_escape(&line) {
            buffer.push(b'>');
        }
        buffer.extend_from_slice(line.as_bytes());
    }
    if !buffer.ends_with(b"\n") {
        buffer.extend_from_slice(eol.as_bytes());
    }
    // one blank line separates messages; bodies read from an mbox already
    // carry theirs
    let blank = format!("{eol}{eol}");
    if !buffer.ends_with(blank.as_bytes()) {
        buffer.extend_from_slice(eol.as_bytes());
    }

    out.write_all(&buffer)?;
    let start = *pos;
    *pos += buffer.len() as u64;
    message.from_line = Some(from_line);
    message.range = Some((start, *pos));
    message.head_range = None;
    message.body_mut().set_range(None);
    Ok(())
}

/// REPLACE: write everything to a sibling temporary file, then atomically
/// rename it over the original. Unmodified messages are copied byte for
/// byte from their recorded ranges.
fn write_replace(state: &mut FolderState, options: &WriteOptions) -> Result<()> {
    let parent = state
        .path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    let eol = state.eol.as_str().to_string();

    // a trusted folder skips re-verification when the parser was released
    if let Some(source) = &state.source {
        source.borrow_mut().start(options.force || state.trusted)?;
    }

    let mut pos: u64 = 0;
    for index in 0..state.messages.len() {
        let (skip, raw_range) = {
            let message = &state.messages[index];
            let skip = message.is_deleted() && !options.save_deleted;
            let raw_range = if !message.is_modified() && state.source.is_some() {
                message.range
            } else {
                None
            };
            (skip, raw_range)
        };
        if skip {
            continue;
        }

        match raw_range {
            Some((begin, end)) => {
                let bytes = state
                    .source
                    .as_ref()
                    .expect("source checked")
                    .borrow_mut()
                    .read_range(begin, end)?;
                tmp.write_all(&bytes)?;
                let delta = pos as i64 - begin as i64;
                state.messages[index].move_location(delta);
                pos += bytes.len() as u64;
                if !bytes.ends_with(b"\n") {
                    tmp.write_all(eol.as_bytes())?;
                    pos += eol.len() as u64;
                }
            }
            None => write_message(&mut tmp, &mut state.messages[index], &mut pos, &eol)?,
        }
    }

    tmp.flush()?;
    tmp.persist(&state.path)
        .map_err(|persist| Error::Io(persist.error))?;

    if let Some(source) = &state.source {
        let mut source = source.borrow_mut();
        source.accept_changes();
        source.stop();
        source.start(true)?;
    }
    Ok(())
}

/// INPLACE: keep the unchanged prefix, truncate, rewrite the rest. Fast,
/// but a crash mid-write loses the folder tail.
fn write_inplace(state: &mut FolderState, options: &WriteOptions) -> Result<()> {
    // the byte-contiguous run of kept, unmodified messages at the front
    // survives untouched
    let mut cut = 0u64;
    let mut first_rewrite = 0usize;
    for message in &state.messages {
        if message.is_deleted() && !options.save_deleted {
            break;
        }
        if message.is_modified() {
            break;
        }
        match message.range {
            Some((begin, end)) if begin == cut => {
                cut = end;
                first_rewrite += 1;
            }
            _ => break,
        }
    }

    enum Plan {
        Raw(usize, Vec<u8>),
        Serialize(usize),
    }

    let mut plan = Vec::new();
    for index in first_rewrite..state.messages.len() {
        let message = &state.messages[index];
        if message.is_deleted() && !options.save_deleted {
            continue;
        }
        if !message.is_modified() {
            if let (Some((begin, end)), Some(source)) = (message.range, &state.source) {
                let bytes = source.borrow_mut().read_range(begin, end)?;
                plan.push(Plan::Raw(index, bytes));
                continue;
            }
        }
        plan.push(Plan::Serialize(index));
    }

    if let Some(source) = &state.source {
        let mut source = source.borrow_mut();
        source.accept_changes();
        source.stop();
    }

    let eol = state.eol.as_str().to_string();
    let mut file = OpenOptions::new().write(true).open(&state.path)?;
    file.set_len(cut)?;
    file.seek(SeekFrom::Start(cut))?;

    let mut pos = cut;
    for step in plan {
        match step {
            Plan::Raw(index, bytes) => {
                file.write_all(&bytes)?;
                let old_begin = state.messages[index].range.map(|(b, _)| b).unwrap_or(0);
                let delta = pos as i64 - old_begin as i64;
                state.messages[index].move_location(delta);
                pos += bytes.len() as u64;
                if !bytes.ends_with(b"\n") {
                    file.write_all(eol.as_bytes())?;
                    pos += eol.len() as u64;
                }
            }
            Plan::Serialize(index) => {
                write_message(&mut file, &mut state.messages[index], &mut pos, &eol)?;
            }
        }
    }
    file.flush()?;
    drop(file);

    if let Some(source) = &state.source {
        source.borrow_mut().start(true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{ClosePolicy, ExtractPolicy, Selector};
    use crate::{Body, LockMethod};

    fn sample_mbox() -> Vec<u8> {
        let mut data = Vec::new();
        for nr in 0..5 {
            data.extend_from_slice(
                format!(
                    "From sender{nr}@example.com Sat Jan  3 01:05:34 1996\n\
                     From: sender{nr}@example.com\n\
                     To: all@example.com\n\
                     Subject: message {nr}\n\
                     Message-Id: <msg-{nr}@example.com>\n\
                     \n\
                     body of message {nr}\n\
                     >From the escaped line\n\
                     \n"
                )
                .as_bytes(),
            );
        }
        data
    }

    fn options() -> FolderOptions {
        FolderOptions::default()
            .access(crate::Access::ReadWrite)
            .lock_method(LockMethod::None)
            .extract(ExtractPolicy::Always)
    }

    #[test]
    fn detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();
        assert!(found_in(&path));
        std::fs::write(&path, b"").unwrap();
        assert!(found_in(&path));
        std::fs::write(&path, b"not a mailbox").unwrap();
        assert!(!found_in(&path));
        assert!(!found_in(&dir.path().join("missing")));
    }

    #[test]
    fn read_counts_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert_eq!(folder.len(), 5);
        assert_eq!(folder.organization(), Organization::File);

        // adjacent byte ranges are contiguous, starting at zero
        let mut expected = 0;
        for message in folder.messages(Selector::All) {
            let (begin, end) = message.range().unwrap();
            assert_eq!(begin, expected);
            expected = end;
        }

        // From-escaping undone on read
        assert!(folder
            .message(0)
            .unwrap()
            .body()
            .clone()
            .string()
            .unwrap()
            .contains("From the escaped line"));
    }

    #[test]
    fn close_without_write_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        folder.close(ClosePolicy::Never).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), sample_mbox());
    }

    #[test]
    fn unmodified_write_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        folder.write(WriteOptions::default()).unwrap();
        folder.close(ClosePolicy::Never).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), sample_mbox());
    }

    #[test]
    fn delete_one_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();
        let original_len = sample_mbox().len() as u64;

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        let victim_len = {
            let victim = folder.message(2).unwrap();
            let (begin, end) = victim.range().unwrap();
            end - begin
        };
        folder.message_mut(2).unwrap().delete();
        folder.close(ClosePolicy::Modified).unwrap();

        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            original_len - victim_len
        );

        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert_eq!(folder.len(), 4);
        assert!(folder.message_id("msg-2@example.com").is_none());
        let mut expected = 0;
        for message in folder.messages(Selector::All) {
            let (begin, end) = message.range().unwrap();
            assert_eq!(begin, expected);
            expected = end;
        }
    }

    #[test]
    fn inplace_rewrites_tail_only(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        let prefix_end = folder.message(2).unwrap().range().unwrap().0;
        folder
            .message_mut(3)
            .unwrap()
            .set_body(Body::from_text("replacement body\n"))
            .unwrap();
        // message 2 untouched; 3 modified; prefix is messages 0..=2
        let _ = prefix_end;
        folder
            .write(WriteOptions {
                mode: RewriteMode::Inplace,
                ..WriteOptions::default()
            })
            .unwrap();
        folder.close(ClosePolicy::Never).unwrap();

        let rewritten = std::fs::read(&path).unwrap();
        let original = sample_mbox();
        // the prefix is untouched
        let keep = original
            .windows(b"From sender3".len())
            .position(|w| w == b"From sender3")
            .unwrap();
        assert_eq!(&rewritten[..keep], &original[..keep]);
        assert!(String::from_utf8_lossy(&rewritten).contains("replacement body"));

        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert_eq!(folder.len(), 5);
    }

    #[test]
    fn label_changes_write_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        folder.message_mut(0).unwrap().set_label("seen", true);
        folder.message_mut(0).unwrap().set_label("replied", true);
        folder.close(ClosePolicy::Modified).unwrap();

        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert!(folder.message(0).unwrap().label("seen"));
        assert!(folder.message(0).unwrap().label("replied"));
        assert!(!folder.message(1).unwrap().label("seen"));
    }

    #[test]
    fn update_picks_up_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();
        assert_eq!(folder.len(), 5);

        let mut appended = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        appended
            .write_all(
                b"From late@example.com Tue Jul 23 19:39:23 2002\n\
                  Subject: late arrival\n\
                  \n\
                  late body\n\
                  \n",
            )
            .unwrap();
        drop(appended);

        folder.update().unwrap();
        assert_eq!(folder.len(), 6);
        assert_eq!(
            folder.message(5).unwrap().subject().unwrap(),
            "late arrival"
        );
        folder.close(ClosePolicy::Never).unwrap();
    }

    #[test]
    fn add_message_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at("inbox".into(), path.clone(), options()).unwrap();

        let newcomer = Message::build()
            .from("new@example.com")
            .to("all@example.com")
            .subject("fresh")
            .data("fresh body\n")
            .finish()
            .unwrap();
        assert_eq!(folder.add_message(newcomer).unwrap(), Some(5));

        // exact duplicate of an existing message: silently dropped
        let duplicate = Message::read(
            b"From: sender1@example.com\nTo: all@example.com\nSubject: message 1\nMessage-Id: <msg-1@example.com>\n\nbody of message 1\n",
            true,
        )
        .unwrap();
        assert_eq!(folder.add_message(duplicate).unwrap(), None);

        // same id, different subject: kept under a fresh id
        let impostor = Message::read(
            b"From: x@example.com\nTo: all@example.com\nSubject: different\nMessage-Id: <msg-1@example.com>\n\nother\n",
            true,
        )
        .unwrap();
        let index = folder.add_message(impostor).unwrap().unwrap();
        assert_ne!(
            folder.message(index).unwrap().message_id().unwrap(),
            "msg-1@example.com"
        );

        folder.close(ClosePolicy::Modified).unwrap();
        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert_eq!(folder.len(), 7);
        assert!(folder.message_id("msg-1@example.com").is_some());
    }

    #[test]
    fn lazy_bodies_load_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();

        let mut folder = open_at(
            "inbox".into(),
            path,
            options().extract(ExtractPolicy::Lazy),
        )
        .unwrap();
        assert!(folder.message(1).unwrap().body().is_delayed());
        let text = folder
            .message_mut(1)
            .unwrap()
            .body_mut()
            .string()
            .unwrap();
        assert!(text.contains("body of message 1"));
        assert!(!folder.message(1).unwrap().body().is_delayed());
        // others stay on disk
        assert!(folder.message(2).unwrap().body().is_delayed());
        folder.close(ClosePolicy::Never).unwrap();
    }

    #[test]
    fn subfolder_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, sample_mbox()).unwrap();
        let sub = subfolder_dir(&path);
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("work"), b"").unwrap();
        std::fs::write(sub.join(".hidden"), b"").unwrap();
        std::fs::write(sub.join("work.lock"), b"").unwrap();

        let folder = open_at("inbox".into(), path, options()).unwrap();
        assert_eq!(folder.subfolders().unwrap(), vec!["work".to_string()]);
    }
}
