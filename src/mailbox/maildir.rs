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

//! The Maildir folder format: `tmp/`, `new/` and `cur/` directories with
//! one file per message.
//!
//! File names carry their flags after a `:2,` marker. Deliveries land in
//! `tmp/` under a unique name and are renamed into place; messages move
//! from `new/` to `cur/` once accepted. Renaming is the only mutation, so
//! the format needs no locking between cooperating processes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::message::Message;
use crate::lockers::hostname;
use crate::report::Severity;
use crate::{Error, Organization, Result};

use super::{
    read_directory_message, resolve_name, Folder, FolderOptions, FolderState, MailboxFormat,
    WriteOptions,
};

/// Whether a path looks like a Maildir: `cur`, `new` and `tmp` all exist.
pub fn found_in(path: &Path) -> bool {
    path.join("cur").is_dir() && path.join("new").is_dir() && path.join("tmp").is_dir()
}

/// Maildir flag characters in their canonical order, with the label each
/// one encodes.
static FLAGS: &[(u8, &str)] = &[
    (b'D', "draft"),
    (b'F', "flagged"),
    (b'P', "passed"),
    (b'R', "replied"),
    (b'S', "seen"),
    (b'T', "deleted"),
];

pub(crate) struct MaildirFormat;

impl Folder {
    /// Opens a Maildir folder. `=name` resolves against the folder
    /// directory, defaulting to `$HOME/Maildir`.
    pub fn open_maildir(name: &str, options: FolderOptions) -> Result<Folder> {
        let path = resolve_name(name, options.folderdir.as_deref(), "Maildir");
        open_at(name.to_string(), path, options)
    }
}

pub(crate) fn open_at(name: String, path: PathBuf, options: FolderOptions) -> Result<Folder> {
    if !found_in(&path) {
        if options.create && options.access.writable() {
            for sub in ["cur", "new", "tmp"] {
                fs::create_dir_all(path.join(sub))?;
            }
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no maildir at {}", path.display()),
            )));
        }
    }
    Folder::open_with_format(name, path, options, Box::new(MaildirFormat))
}

static DELIVERY_SEQ: AtomicU64 = AtomicU64::new(0);

/// A fresh delivery file name, unique for this process.
fn unique_name() -> String {
    format!(
        "{}.P{}Q{}.{}",
        crate::core::date::now(),
        std::process::id(),
        DELIVERY_SEQ.fetch_add(1, Ordering::Relaxed),
        hostname(),
    )
}

/// Splits a maildir file name into its base and flag characters.
fn parse_name(name: &str) -> (&str, &str) {
    match name.split_once(":2,") {
        Some((base, flags)) => (base, flags),
        None => (name, ""),
    }
}

fn flags_from_labels(message: &Message) -> String {
    let mut flags = String::new();
    for (flag, label) in FLAGS {
        if message.label(label) {
            flags.push(*flag as char);
        }
    }
    flags
}

impl MailboxFormat for MaildirFormat {
    fn type_name(&self) -> &'static str {
        "maildir"
    }

    fn organization(&self) -> Organization {
        Organization::Directory
    }

    fn read_messages(&mut self, state: &mut FolderState) -> Result<()> {
        for sub in ["cur", "new"] {
            let dir = state.path.join(sub);
            let mut entries: Vec<String> = fs::read_dir(&dir)?
                .flatten()
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.'))
                .collect();
            entries.sort();

            for name in entries {
                let file = dir.join(&name);
                let size = fs::metadata(&file)?.len();
                let mut message = read_directory_message(state, &file, size)?;
                message.file_name = Some(format!("{sub}/{name}"));

                let (_, flags) = parse_name(&name);
                for (flag, label) in FLAGS {
                    let set = flags.contains(*flag as char);
                    if *label == "deleted" {
                        if set {
                            message.init_deleted();
                        }
                    } else {
                        message.init_label(label, set);
                    }
                }
                // anything still in new/ has not been seen by definition
                if sub == "new" {
                    message.init_label("seen", false);
                }
                state.push_message(message);
            }
        }
        Ok(())
    }

    fn write(&mut self, state: &mut FolderState, options: &WriteOptions) -> Result<()> {
        let root = state.path.clone();

        for index in 0..state.messages.len() {
            let message = &mut state.messages[index];

            if message.is_deleted() && !options.save_deleted {
                if let Some(stored) = &message.file_name {
                    let path = root.join(stored);
                    if path.exists() {
                        fs::remove_file(&path)?;
                    }
                }
                continue;
            }

            let flags = flags_from_labels(message);
            match message.file_name.clone() {
                None => {
                    // delivery: write to tmp/ under a unique name, then
                    // rename into place
                    message.load_all()?;
                    let base = unique_name();
                    let tmp = root.join("tmp").join(&base);
                    let mut file = fs::File::create(&tmp)?;
                    message.write_to(&mut file)?;
                    file.flush()?;
                    drop(file);

                    let target_name = if flags.is_empty() {
                        format!("new/{base}")
                    } else {
                        format!("cur/{base}:2,{flags}")
                    };
                    fs::rename(&tmp, root.join(&target_name))?;
                    message.file_name = Some(target_name);
                }
                Some(stored) => {
                    let (sub, name) = stored.split_once('/').unwrap_or(("cur", stored.as_str()));
                    let (base, old_flags) = parse_name(name);

                    // accept: a seen message leaves new/
                    let target_sub = if sub == "new" && !message.label("seen") {
                        "new"
                    } else {
                        "cur"
                    };
                    let target_name = if target_sub == "new" && flags.is_empty() {
                        format!("new/{base}")
                    } else {
                        format!("{target_sub}/{base}:2,{flags}")
                    };

                    if message.is_modified() {
                        message.load_all()?;
                        let tmp = root.join("tmp").join(base);
                        let mut file = fs::File::create(&tmp)?;
                        message.write_to(&mut file)?;
                        file.flush()?;
                        drop(file);
                        let old = root.join(&stored);
                        if old.exists() && stored != target_name {
                            fs::remove_file(&old)?;
                        }
                        fs::rename(&tmp, root.join(&target_name))?;
                        message.file_name = Some(target_name);
                        message.source = None;
                    } else if stored != target_name || flags != old_flags {
                        fs::rename(root.join(&stored), root.join(&target_name))?;
                        message.file_name = Some(target_name);
                        message.source = None;
                    }
                }
            }
        }

        if state.remove_when_empty
            && state
                .messages
                .iter()
                .all(|message| message.is_deleted() && !options.keep_deleted)
        {
            fs::remove_dir_all(&root)?;
        }
        Ok(())
    }

    fn update(&mut self, state: &mut FolderState) -> Result<()> {
        let known: Vec<String> = state
            .messages
            .iter()
            .filter_map(|message| message.file_name.clone())
            .collect();

        let mut found = 0;
        for sub in ["new", "cur"] {
            let dir = state.path.join(sub);
            let mut entries: Vec<String> = fs::read_dir(&dir)?
                .flatten()
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.'))
                .collect();
            entries.sort();

            for name in entries {
                let stored = format!("{sub}/{name}");
                if known.contains(&stored) {
                    continue;
                }
                let file = dir.join(&name);
                let size = fs::metadata(&file)?.len();
                let mut message = read_directory_message(state, &file, size)?;
                message.file_name = Some(stored);
                message.init_label("seen", sub == "cur");
                state.push_message(message);
                found += 1;
            }
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
            if let Some(sub) = name.strip_prefix('.') {
                if !sub.is_empty() && entry.path().is_dir() && found_in(&entry.path()) {
                    names.push(sub.to_string());
                }
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
        let path = state.path.join(format!(".{name}"));
        open_at(format!("{}/{}", state.name, name), path, options)
    }

    fn delete_folder(&mut self, state: &mut FolderState) -> Result<()> {
        fs::remove_dir_all(&state.path)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{ClosePolicy, ExtractPolicy, Selector};
    use crate::LockMethod;

    fn build_maildir(root: &Path) {
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(
            root.join("cur/100.P1Q1.host:2,RS"),
            b"From: a@example.com\nSubject: read one\n\nseen body\n",
        )
        .unwrap();
        fs::write(
            root.join("cur/101.P1Q2.host:2,"),
            b"From: b@example.com\nSubject: plain\n\nplain body\n",
        )
        .unwrap();
        fs::write(
            root.join("new/102.P1Q3.host"),
            b"From: c@example.com\nSubject: fresh\n\nfresh body\n",
        )
        .unwrap();
    }

    fn options() -> FolderOptions {
        FolderOptions::default()
            .access(crate::Access::ReadWrite)
            .lock_method(LockMethod::None)
            .extract(ExtractPolicy::Always)
    }

    #[test]
    fn detection_and_read() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!found_in(dir.path()));
        build_maildir(dir.path());
        assert!(found_in(dir.path()));

        let folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.organization(), Organization::Directory);

        // flags parsed from the file names
        assert!(folder.message(0).unwrap().label("seen"));
        assert!(folder.message(0).unwrap().label("replied"));
        assert!(!folder.message(1).unwrap().label("seen"));
        assert!(!folder.message(2).unwrap().label("seen"));
        folder.close(ClosePolicy::Never).unwrap();
    }

    #[test]
    fn accept_moves_new_to_cur() {
        let dir = tempfile::tempdir().unwrap();
        build_maildir(dir.path());

        let mut folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        // index 2 is the new/ message
        folder.message_mut(2).unwrap().set_label("seen", true);
        folder.close(ClosePolicy::Modified).unwrap();

        let cur: Vec<String> = fs::read_dir(dir.path().join("cur"))
            .unwrap()
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(cur.iter().any(|name| name.starts_with("102.") && name.ends_with(":2,S")));
        assert_eq!(fs::read_dir(dir.path().join("new")).unwrap().count(), 0);
    }

    #[test]
    fn delivery_goes_through_tmp() {
        let dir = tempfile::tempdir().unwrap();
        build_maildir(dir.path());

        let mut folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        let fresh = Message::build()
            .from("new@example.com")
            .to("you@example.com")
            .subject("delivered")
            .data("fresh\n")
            .finish()
            .unwrap();
        folder.add_message(fresh).unwrap();
        folder.close(ClosePolicy::Modified).unwrap();

        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
        let delivered = fs::read_dir(dir.path().join("new"))
            .unwrap()
            .flatten()
            .map(|entry| fs::read_to_string(entry.path()).unwrap())
            .any(|text| text.contains("Subject: delivered"));
        assert!(delivered);
    }

    #[test]
    fn deleted_files_are_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        build_maildir(dir.path());

        let mut folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        folder.message_mut(0).unwrap().delete();
        folder.close(ClosePolicy::Modified).unwrap();

        assert_eq!(fs::read_dir(dir.path().join("cur")).unwrap().count(), 1);

        let folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.messages(Selector::All).len(), 2);
    }

    #[test]
    fn trashed_flag_reads_as_deleted() {
        let dir = tempfile::tempdir().unwrap();
        build_maildir(dir.path());
        fs::write(
            dir.path().join("cur/103.P1Q4.host:2,ST"),
            b"From: d@example.com\nSubject: trash\n\ngone\n",
        )
        .unwrap();

        let folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        let trashed = folder
            .messages(Selector::Deleted)
            .into_iter()
            .next()
            .expect("one trashed message");
        assert_eq!(trashed.subject().unwrap(), "trash");
        folder.close(ClosePolicy::Never).unwrap();
    }

    #[test]
    fn subfolders_are_dot_dirs() {
        let dir = tempfile::tempdir().unwrap();
        build_maildir(dir.path());
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir_all(dir.path().join(".Sent").join(sub)).unwrap();
        }

        let folder = open_at("test".into(), dir.path().to_path_buf(), options()).unwrap();
        assert_eq!(folder.subfolders().unwrap(), vec!["Sent".to_string()]);
    }
}
