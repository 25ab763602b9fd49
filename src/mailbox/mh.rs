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

//! The MH folder format: one message per numbered file in a directory.
//!
//! Message files carry positive integer names starting at one, gaps
//! tolerated. Labels live in the `.mh_sequences` sidecar as run-lists;
//! the `cur` sequence is the current-message marker and `unseen` is the
//! inverse of the `seen` label.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::core::message::Message;
use crate::report::Severity;
use crate::{Error, Organization, Result};

use super::{
    is_sidecar_name, read_directory_message, resolve_name, Folder, FolderOptions, FolderState,
    MailboxFormat, WriteOptions,
};

const SEQUENCES: &str = ".mh_sequences";

/// Whether a path looks like an MH folder: a directory that carries a
/// sequences sidecar or numbered message files, and is not a Maildir.
pub fn found_in(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    if path.join("cur").is_dir() && path.join("new").is_dir() && path.join("tmp").is_dir() {
        return false;
    }
    if path.join(SEQUENCES).is_file() {
        return true;
    }
    fs::read_dir(path)
        .map(|entries| {
            entries
                .flatten()
                .any(|entry| file_number(&entry.file_name().to_string_lossy()).is_some())
        })
        .unwrap_or(false)
}

fn file_number(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        None
    } else {
        name.parse().ok().filter(|&n| n > 0)
    }
}

pub(crate) struct MhFormat;

impl Folder {
    /// Opens an MH folder. `=name` resolves against the folder directory,
    /// defaulting to `$HOME/.mh`.
    pub fn open_mh(name: &str, options: FolderOptions) -> Result<Folder> {
        let path = resolve_name(name, options.folderdir.as_deref(), ".mh");
        open_at(name.to_string(), path, options)
    }
}

pub(crate) fn open_at(name: String, path: PathBuf, options: FolderOptions) -> Result<Folder> {
    if !path.is_dir() {
        if options.create && options.access.writable() {
            fs::create_dir_all(&path)?;
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no MH folder at {}", path.display()),
            )));
        }
    }
    Folder::open_with_format(name, path, options, Box::new(MhFormat))
}

impl MailboxFormat for MhFormat {
    fn type_name(&self) -> &'static str {
        "mh"
    }

    fn organization(&self) -> Organization {
        Organization::Directory
    }

    fn read_messages(&mut self, state: &mut FolderState) -> Result<()> {
        let mut numbers: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&state.path)? {
            let entry = entry?;
            if let Some(number) = file_number(&entry.file_name().to_string_lossy()) {
                if entry.path().is_file() {
                    numbers.push((number, entry.path()));
                }
            }
        }
        numbers.sort_unstable_by_key(|(number, _)| *number);

        let sequences = read_sequences(&state.path.join(SEQUENCES)).unwrap_or_default();
        let unseen = sequences
            .iter()
            .find(|(name, _)| name == "unseen")
            .map(|(_, numbers)| numbers.clone())
            .unwrap_or_default();
        let current = sequences
            .iter()
            .find(|(name, _)| name == "cur")
            .and_then(|(_, numbers)| numbers.first().copied());

        for (number, file) in numbers {
            let size = fs::metadata(&file)?.len();
            let mut message = read_directory_message(state, &file, size)?;
            message.file_number = Some(number);

            message.init_label("seen", !unseen.contains(&number));
            for (name, members) in &sequences {
                if name == "unseen" || name == "cur" {
                    continue;
                }
                if members.contains(&number) {
                    message.init_label(name, true);
                }
            }

            let index = state.messages.len();
            if current == Some(number) {
                message.init_label("current", true);
                state.current = Some(index);
            }
            state.push_message(message);
        }
        Ok(())
    }

    fn write(&mut self, state: &mut FolderState, options: &WriteOptions) -> Result<()> {
        let dir = state.path.clone();

        // drop deleted message files first
        for message in &state.messages {
            if message.is_deleted() && !options.save_deleted {
                if let Some(number) = message.file_number {
                    let path = dir.join(number.to_string());
                    if path.exists() {
                        fs::remove_file(&path)?;
                    }
                }
            }
        }

        let kept: Vec<usize> = (0..state.messages.len())
            .filter(|&index| {
                let message = &state.messages[index];
                !message.is_deleted() || options.save_deleted
            })
            .collect();

        if options.renumber {
            // park every kept unmodified file under a hidden name, then move
            // everything to its final number; avoids collisions like 3 -> 2
            // while 2 still exists
            for (slot, &index) in kept.iter().enumerate() {
                let message = &mut state.messages[index];
                if message.is_modified() {
                    // content must survive the shuffle; the old file goes away
                    if let Some(number) = message.file_number {
                        message.load_all()?;
                        let stale = dir.join(number.to_string());
                        if stale.exists() {
                            fs::remove_file(stale)?;
                        }
                    }
                } else if let Some(number) = message.file_number {
                    fs::rename(dir.join(number.to_string()), dir.join(format!(".mv-{slot}")))?;
                }
            }
            for (slot, &index) in kept.iter().enumerate() {
                let target = slot as u32 + 1;
                let message = &mut state.messages[index];
                if message.is_modified() || message.file_number.is_none() {
                    write_message_file(&dir, target, message)?;
                } else {
                    fs::rename(dir.join(format!(".mv-{slot}")), dir.join(target.to_string()))?;
                }
                message.file_number = Some(target);
                message.source = None;
            }
        } else {
            let mut next = kept
                .iter()
                .filter_map(|&index| state.messages[index].file_number)
                .max()
                .unwrap_or(0)
                + 1;
            for &index in &kept {
                let message = &mut state.messages[index];
                match message.file_number {
                    Some(number) if message.is_modified() => {
                        write_message_file(&dir, number, message)?;
                        message.source = None;
                    }
                    Some(_) => {}
                    None => {
                        write_message_file(&dir, next, message)?;
                        message.file_number = Some(next);
                        message.source = None;
                        next += 1;
                    }
                }
            }
        }

        write_sequences(state, options)?;

        if kept.is_empty() && state.remove_when_empty {
            let _ = fs::remove_file(dir.join(SEQUENCES));
            if let Err(e) = fs::remove_dir(&dir) {
                state.reporter.report(
                    Severity::Warning,
                    format!("could not remove empty folder: {e}"),
                );
            }
        }
        Ok(())
    }

    fn update(&mut self, state: &mut FolderState) -> Result<()> {
        let known: Vec<u32> = state
            .messages
            .iter()
            .filter_map(|message| message.file_number)
            .collect();
        let mut fresh: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&state.path)? {
            let entry = entry?;
            if let Some(number) = file_number(&entry.file_name().to_string_lossy()) {
                if !known.contains(&number) && entry.path().is_file() {
                    fresh.push((number, entry.path()));
                }
            }
        }
        fresh.sort_unstable_by_key(|(number, _)| *number);

        let found = fresh.len();
        for (number, file) in fresh {
            let size = fs::metadata(&file)?.len();
            let mut message = read_directory_message(state, &file, size)?;
            message.file_number = Some(number);
            message.init_label("seen", false);
            state.push_message(message);
        }
        if found > 0 {
            state.reporter.report(
                Severity::Notice,
                format!("picked up {found} externally delivered messages"),
            );
        }
        Ok(())
    }

    fn subfolders(&self, state: &FolderState) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&state.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !is_sidecar_name(&name) && file_number(&name).is_none() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_subfolder(
        &self,
        state: &FolderState,
        name: &str,
        options: FolderOptions,
    ) -> Result<Folder> {
        let path = state.path.join(name);
        open_at(format!("{}/{}", state.name, name), path, options)
    }

    fn delete_folder(&mut self, state: &mut FolderState) -> Result<()> {
        for entry in fs::read_dir(&state.path)? {
            let entry = entry?;
            if entry.path().is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        fs::remove_dir(&state.path)?;
        Ok(())
    }

    fn coerce(&self, _state: &FolderState, message: &mut Message) {
        message.range = None;
        message.head_range = None;
        message.file_number = None;
        message.file_name = None;
        message.from_line = None;
    }
}

/// Writes a message under its number via an invisible temporary name.
fn write_message_file(dir: &Path, number: u32, message: &mut Message) -> Result<()> {
    message.load_head()?;
    let mut tmp = NamedTempFile::with_prefix_in(".tmp-", dir)?;
    message.write_to(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.persist(dir.join(number.to_string()))
        .map_err(|persist| Error::Io(persist.error))?;
    Ok(())
}

/// `.mh_sequences` line syntax: `name: 1-5 7 12-14`.
fn read_sequences(path: &Path) -> Result<Vec<(String, Vec<u32>)>> {
    let mut sequences = Vec::new();
    if !path.is_file() {
        return Ok(sequences);
    }
    for line in fs::read_to_string(path)?.lines() {
        let (name, list) = match line.split_once(':') {
            Some(parts) => parts,
            None => continue,
        };
        let mut numbers = Vec::new();
        for item in list.split_whitespace() {
            match item.split_once('-') {
                Some((begin, end)) => {
                    if let (Ok(begin), Ok(end)) = (begin.parse::<u32>(), end.parse::<u32>()) {
                        numbers.extend(begin..=end);
                    }
                }
                None => {
                    if let Ok(number) = item.parse::<u32>() {
                        numbers.push(number);
                    }
                }
            }
        }
        sequences.push((name.trim().to_string(), numbers));
    }
    Ok(sequences)
}

fn format_run_list(numbers: &[u32]) -> String {
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = String::new();
    let mut run: Option<(u32, u32)> = None;
    let mut flush = |out: &mut String, run: (u32, u32)| {
        if !out.is_empty() {
            out.push(' ');
        }
        if run.0 == run.1 {
            out.push_str(&run.0.to_string());
        } else {
            out.push_str(&format!("{}-{}", run.0, run.1));
        }
    };
    for number in sorted {
        run = match run {
            None => Some((number, number)),
            Some((begin, end)) if number == end + 1 => Some((begin, number)),
            Some(done) => {
                flush(&mut out, done);
                Some((number, number))
            }
        };
    }
    if let Some(done) = run {
        flush(&mut out, done);
    }
    out
}

/// Rewrites the sequences sidecar from the labels of the kept messages.
fn write_sequences(state: &mut FolderState, options: &WriteOptions) -> Result<()> {
    let mut sequences: HashMap<String, Vec<u32>> = HashMap::new();
    let mut cur: Option<u32> = None;

    for (index, message) in state.messages.iter().enumerate() {
        if message.is_deleted() && !options.save_deleted {
            continue;
        }
        let number = match message.file_number {
            Some(number) => number,
            None => continue,
        };
        if !message.label("seen") {
            sequences.entry("unseen".into()).or_default().push(number);
        }
        if state.current == Some(index) || message.label("current") {
            cur = Some(number);
        }
        for (label, &value) in message.labels() {
            if !value || label == "seen" || label == "current" {
                continue;
            }
            sequences.entry(label.clone()).or_default().push(number);
        }
    }

    let path = state.path.join(SEQUENCES);
    let mut names: Vec<&String> = sequences.keys().collect();
    names.sort();

    let mut out = String::new();
    if let Some(cur) = cur {
        out.push_str(&format!("cur: {cur}\n"));
    }
    for name in names {
        let list = format_run_list(&sequences[name]);
        if !list.is_empty() {
            out.push_str(&format!("{name}: {list}\n"));
        }
    }

    if out.is_empty() {
        if path.exists() {
            fs::remove_file(&path)?;
        }
    } else {
        fs::write(&path, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{ClosePolicy, ExtractPolicy, Selector};
    use crate::LockMethod;

    fn build_mh(dir: &Path, count: u32) {
        for nr in 1..=count {
            fs::write(
                dir.join(nr.to_string()),
                format!(
                    "From: sender{nr}@example.com\nSubject: message {nr}\nMessage-Id: <mh-{nr}@example.com>\n\nbody of {nr}\n"
                ),
            )
            .unwrap();
        }
    }

    fn options() -> FolderOptions {
        FolderOptions::default()
            .access(crate::Access::ReadWrite)
            .lock_method(LockMethod::None)
    }

    #[test]
    fn detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!found_in(dir.path()));
        build_mh(dir.path(), 2);
        assert!(found_in(dir.path()));

        let maildir = tempfile::tempdir().unwrap();
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir(maildir.path().join(sub)).unwrap();
        }
        assert!(!found_in(maildir.path()));
    }

    #[test]
    fn run_list_format() {
        assert_eq!(format_run_list(&[1, 2, 3, 4, 5, 7, 9, 10]), "1-5 7 9-10");
        assert_eq!(format_run_list(&[3]), "3");
        assert_eq!(format_run_list(&[]), "");
        assert_eq!(format_run_list(&[2, 1, 2]), "1-2");
    }

    #[test]
    fn sequences_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEQUENCES);
        fs::write(&path, "cur: 3\nunseen: 1-2 5\nflagged: 2\n").unwrap();
        let sequences = read_sequences(&path).unwrap();
        assert_eq!(
            sequences,
            vec![
                ("cur".to_string(), vec![3]),
                ("unseen".to_string(), vec![1, 2, 5]),
                ("flagged".to_string(), vec![2]),
            ]
        );
    }

    #[test]
    fn lazy_open_reads_nothing_but_loads_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 5);

        let mut folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::Lazy),
        )
        .unwrap();
        assert_eq!(folder.len(), 5);
        for message in folder.messages(Selector::All) {
            assert!(message.is_delayed());
            assert!(message.body().is_delayed());
        }

        let text = folder
            .message_mut(2)
            .unwrap()
            .body_mut()
            .string()
            .unwrap();
        assert_eq!(text, "body of 3\n");
        assert!(!folder.message(2).unwrap().body().is_delayed());
        assert!(folder.message(3).unwrap().body().is_delayed());

        // header loads separately
        folder.message_mut(4).unwrap().load_head().unwrap();
        assert_eq!(
            folder.message(4).unwrap().subject().unwrap(),
            "message 5"
        );
        folder.close(ClosePolicy::Never).unwrap();
    }

    #[test]
    fn threshold_extract() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 3);
        // make message 2 big
        let mut big = fs::read(dir.path().join("2")).unwrap();
        big.extend(std::iter::repeat(b'x').take(9000));
        fs::write(dir.path().join("2"), big).unwrap();

        let folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::SizeThreshold(5000)),
        )
        .unwrap();
        assert!(!folder.message(0).unwrap().is_delayed());
        assert!(folder.message(1).unwrap().is_delayed());
        assert!(!folder.message(2).unwrap().is_delayed());
    }

    #[test]
    fn labels_roundtrip_through_sequences() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 3);
        fs::write(dir.path().join(SEQUENCES), "cur: 2\nunseen: 1 3\n").unwrap();

        let mut folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::Always),
        )
        .unwrap();
        assert!(!folder.message(0).unwrap().label("seen"));
        assert!(folder.message(1).unwrap().label("seen"));
        assert_eq!(folder.current().unwrap().seqnr(), 1);

        folder.message_mut(0).unwrap().set_label("seen", true);
        folder.message_mut(2).unwrap().set_label("flagged", true);
        folder.set_current(0).unwrap();
        folder.close(ClosePolicy::Modified).unwrap();

        let sidecar = fs::read_to_string(dir.path().join(SEQUENCES)).unwrap();
        assert!(sidecar.contains("cur: 1"));
        assert!(sidecar.contains("unseen: 3"));
        assert!(sidecar.contains("flagged: 3"));
    }

    #[test]
    fn delete_and_renumber() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 5);

        let mut folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::Always),
        )
        .unwrap();
        folder.message_mut(1).unwrap().delete();
        folder
            .write(WriteOptions {
                renumber: true,
                ..WriteOptions::default()
            })
            .unwrap();
        folder.close(ClosePolicy::Never).unwrap();

        let mut numbers: Vec<u32> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter_map(|entry| file_number(&entry.file_name().to_string_lossy()))
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        let folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::Always),
        )
        .unwrap();
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.message(1).unwrap().subject().unwrap(), "message 3");
    }

    #[test]
    fn append_without_renumber_uses_next_number() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 3);

        let mut folder = open_at(
            "test".into(),
            dir.path().to_path_buf(),
            options().extract(ExtractPolicy::Always),
        )
        .unwrap();
        let fresh = Message::build()
            .from("new@example.com")
            .to("you@example.com")
            .subject("delivered")
            .data("fresh\n")
            .finish()
            .unwrap();
        folder.add_message(fresh).unwrap();
        folder.close(ClosePolicy::Modified).unwrap();

        assert!(dir.path().join("4").is_file());
        let text = fs::read_to_string(dir.path().join("4")).unwrap();
        assert!(text.contains("Subject: delivered"));
    }

    #[test]
    fn subfolder_listing() {
        let dir = tempfile::tempdir().unwrap();
        build_mh(dir.path(), 1);
        fs::create_dir(dir.path().join("projects")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();

        let folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        assert_eq!(folder.subfolders().unwrap(), vec!["projects".to_string()]);
    }
}
