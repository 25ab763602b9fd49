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

//! The format-neutral folder abstraction.
//!
//! A [`Folder`] pairs the shared state every folder carries (message list,
//! message-id index, locker, options, current marker) with a
//! [`MailboxFormat`] implementing the on-disk specifics: mbox keeps all
//! messages in one file, MH and Maildir keep one file per message.

pub mod maildir;
pub mod manager;
pub mod mbox;
pub mod mh;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::core::date;
use crate::core::header::HeaderState;
use crate::core::message::Message;
use crate::lockers::{LockMethod, Locker};
use crate::parsers::source::MailSource;
use crate::report::{Reporter, Severity};
use crate::{Access, Error, Header, LineEnding, Organization, Result};

/// When to read a message body while scanning a folder.
#[derive(Clone, Copy, Debug)]
pub enum ExtractPolicy {
    /// Read everything immediately.
    Always,
    /// Read nothing until asked.
    Lazy,
    /// Bodies at least this many bytes stay on disk.
    SizeThreshold(u64),
    /// The header decides; `true` reads the body eagerly.
    Predicate(fn(&Header) -> bool),
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        ExtractPolicy::SizeThreshold(10_240)
    }
}

impl ExtractPolicy {
    /// Whether a body of (guessed) `size` should be read eagerly.
    pub(crate) fn eager(&self, size: Option<u64>, head: Option<&Header>) -> bool {
        match self {
            ExtractPolicy::Always => true,
            ExtractPolicy::Lazy => false,
            ExtractPolicy::SizeThreshold(limit) => match size {
                Some(size) => size < *limit,
                None => false,
            },
            ExtractPolicy::Predicate(f) => head.map(f).unwrap_or(false),
        }
    }
}

/// Whether `close` writes the folder back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Write when something changed.
    #[default]
    Modified,
    Always,
    Never,
}

/// Rewrite strategy for single-file folders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// Try `Replace`, fall back to `Inplace`.
    #[default]
    Auto,
    /// Write a sibling temporary file and atomically rename it over the
    /// original.
    Replace,
    /// Truncate at the first modified message and append the rest. Not
    /// crash-safe; a failure mid-write loses the folder tail.
    Inplace,
}

/// Options for [`Folder::write`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    /// Write even when read-only or externally modified.
    pub force: bool,
    /// Serialize messages flagged deleted instead of dropping them.
    pub save_deleted: bool,
    /// Keep deleted messages in memory (and on disk) after the write.
    pub keep_deleted: bool,
    pub mode: RewriteMode,
    /// Renumber MH message files consecutively.
    pub renumber: bool,
}

/// Message selection for [`Folder::messages`] and friends.
#[derive(Clone, Copy, Default)]
pub enum Selector<'a> {
    All,
    /// Everything not flagged deleted.
    #[default]
    Active,
    Deleted,
    /// Indices `begin..=end`.
    Range(usize, usize),
    /// Messages carrying this label.
    Label(&'a str),
    /// Messages not carrying this label.
    NotLabel(&'a str),
    Predicate(&'a dyn Fn(&Message) -> bool),
}

/// Options for opening a folder.
#[derive(Clone, Debug)]
pub struct FolderOptions {
    pub access: Access,
    pub folderdir: Option<PathBuf>,
    pub lock_method: LockMethod,
    pub lock_timeout: Duration,
    pub lock_expire: Duration,
    pub extract: ExtractPolicy,
    pub trusted: bool,
    /// `None` derives the default: duplicates are kept when the folder is
    /// opened read-only, dropped otherwise.
    pub keep_dups: Option<bool>,
    pub remove_when_empty: bool,
    pub save_on_exit: bool,
    /// Create the folder when it does not exist yet (needs write access).
    pub create: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        FolderOptions {
            access: Access::Read,
            folderdir: None,
            lock_method: LockMethod::default(),
            lock_timeout: Duration::from_secs(10),
            lock_expire: Duration::from_secs(600),
            extract: ExtractPolicy::default(),
            trusted: true,
            keep_dups: None,
            remove_when_empty: false,
            save_on_exit: true,
            create: false,
        }
    }
}

impl FolderOptions {
    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn folderdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.folderdir = Some(dir.into());
        self
    }

    pub fn lock_method(mut self, method: LockMethod) -> Self {
        self.lock_method = method;
        self
    }

    pub fn extract(mut self, extract: ExtractPolicy) -> Self {
        self.extract = extract;
        self
    }

    pub fn keep_dups(mut self, keep: bool) -> Self {
        self.keep_dups = Some(keep);
        self
    }

    pub fn remove_when_empty(mut self, remove: bool) -> Self {
        self.remove_when_empty = remove;
        self
    }

    pub fn save_on_exit(mut self, save: bool) -> Self {
        self.save_on_exit = save;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

/// Resolves a folder name: `=name` is relative to the folder directory,
/// anything else is a filesystem path.
pub(crate) fn resolve_name(
    name: &str,
    folderdir: Option<&Path>,
    default_subdir: &str,
) -> PathBuf {
    if let Some(relative) = name.strip_prefix('=') {
        let base = folderdir.map(Path::to_path_buf).unwrap_or_else(|| {
            let home = std::env::var_os("HOME").unwrap_or_default();
            PathBuf::from(home).join(default_subdir)
        });
        base.join(relative)
    } else {
        PathBuf::from(name)
    }
}

/// Skips sidecar entries while enumerating folder directories: dotfiles
/// and lock files.
pub(crate) fn is_sidecar_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".lock") || name.ends_with(".lck")
}

/// Reads one message file of a DIRECTORY-organized folder according to the
/// extract policy: fully, header only (predicate policies), or not at all.
/// Every file is its own parser session; the session closes again right
/// away and reopens on demand for delayed loads.
pub(crate) fn read_directory_message(
    state: &FolderState,
    file: &Path,
    size: u64,
) -> Result<Message> {
    match state.extract {
        ExtractPolicy::Predicate(choose) => {
            let source = Rc::new(RefCell::new(MailSource::new(file, Access::Read)));
            let mut message = {
                let mut src = source.borrow_mut();
                src.start(true)?;
                let (_, raw_fields) = src.read_header()?;
                let head = crate::Header::from_fields(
                    raw_fields
                        .into_iter()
                        .map(|(name, body)| crate::Field::parse(name, body))
                        .collect(),
                );
                let eol = src.eol();
                if choose(&head) {
                    let (begin, text) = src.body_as_string(None, None)?;
                    let end = src.file_position();
                    let mut body = crate::Body::from_text(text).with_eol(eol);
                    body.set_range(Some((begin, end)));
                    Message::from_parts(head, body)
                } else {
                    let begin = src.file_position();
                    let body = crate::Body::delayed(begin, size, None, Rc::downgrade(&source))
                        .with_eol(eol);
                    Message::from_parts(head, body)
                }
            };
            source.borrow_mut().stop();
            message.source = Some(source);
            message.apply_content_headers();
            message.labels_from_status();
            if !message.body().is_delayed() {
                message.unpack()?;
            }
            Ok(message)
        }
        ref policy if policy.eager(Some(size), None) => {
            let bytes = std::fs::read(file)?;
            let mut message = Message::parse(&bytes)?;
            message.labels_from_status();
            Ok(message)
        }
        _ => {
            // nothing read: head and body both wait on disk
            let source = Rc::new(RefCell::new(MailSource::new(file, Access::Read)));
            let head = crate::Header::delayed();
            let body = crate::Body::delayed_file(size, Rc::downgrade(&source));
            let mut message = Message::from_parts(head, body);
            message.head_range = Some((0, size));
            message.source = Some(source);
            Ok(message)
        }
    }
}

type ThreadHook = Box<dyn Fn(&Message)>;

/// State shared by every folder format.
pub struct FolderState {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) folderdir: Option<PathBuf>,
    pub(crate) access: Access,
    pub(crate) messages: Vec<Message>,
    pub(crate) ids: HashMap<String, usize>,
    pub(crate) locker: Locker,
    pub(crate) source: Option<Rc<RefCell<MailSource>>>,
    pub(crate) extract: ExtractPolicy,
    pub(crate) trusted: bool,
    pub(crate) keep_dups: bool,
    pub(crate) remove_when_empty: bool,
    pub(crate) save_on_exit: bool,
    pub(crate) modified: bool,
    pub(crate) eol: LineEnding,
    pub(crate) opened_at: i64,
    pub(crate) current: Option<usize>,
    pub(crate) open: bool,
    pub(crate) reporter: Reporter,
    to_thread: Vec<ThreadHook>,
    to_unthread: Vec<ThreadHook>,
}

impl FolderState {
    pub(crate) fn new(name: String, path: PathBuf, options: &FolderOptions) -> FolderState {
        let locker = Locker::new(options.lock_method, &path)
            .with_timeout(options.lock_timeout)
            .with_expire(options.lock_expire);
        FolderState {
            name,
            path,
            folderdir: options.folderdir.clone(),
            access: options.access,
            messages: Vec::new(),
            ids: HashMap::new(),
            locker,
            source: None,
            extract: options.extract,
            trusted: options.trusted,
            keep_dups: options
                .keep_dups
                .unwrap_or(!options.access.writable()),
            remove_when_empty: options.remove_when_empty,
            save_on_exit: options.save_on_exit,
            modified: false,
            eol: LineEnding::default(),
            opened_at: date::now(),
            current: None,
            open: false,
            reporter: Reporter::default(),
            to_thread: Vec::new(),
            to_unthread: Vec::new(),
        }
    }

    /// Registers a parsed message at the end of the list.
    pub(crate) fn push_message(&mut self, mut message: Message) {
        message.set_seqnr(self.messages.len());
        if let Some(id) = message.message_id() {
            self.ids.entry(id).or_insert(self.messages.len());
        }
        self.messages.push(message);
    }

    pub(crate) fn reindex(&mut self) {
        self.ids.clear();
        for (index, message) in self.messages.iter_mut().enumerate() {
            message.set_seqnr(index);
            if let Some(id) = message.message_id() {
                self.ids.entry(id).or_insert(index);
            }
        }
    }

    pub(crate) fn any_modified(&self) -> bool {
        self.modified || self.messages.iter().any(|m| m.is_modified() || m.is_deleted())
    }
}

/// On-disk behavior of one folder family.
pub trait MailboxFormat {
    fn type_name(&self) -> &'static str;
    fn organization(&self) -> Organization;
    fn read_messages(&mut self, state: &mut FolderState) -> Result<()>;
    fn write(&mut self, state: &mut FolderState, options: &WriteOptions) -> Result<()>;
    /// Picks up messages appended by someone else while the folder was
    /// open.
    fn update(&mut self, state: &mut FolderState) -> Result<()>;
    fn subfolders(&self, state: &FolderState) -> Result<Vec<String>>;
    fn open_subfolder(
        &self,
        state: &FolderState,
        name: &str,
        options: FolderOptions,
    ) -> Result<Folder>;
    fn delete_folder(&mut self, state: &mut FolderState) -> Result<()>;
    /// Adjusts a foreign message to this folder's needs.
    fn coerce(&self, state: &FolderState, message: &mut Message);
}

/// A folder of messages with a uniform API over all supported formats.
pub struct Folder {
    pub(crate) state: FolderState,
    pub(crate) format: Box<dyn MailboxFormat>,
    pub(crate) registry: Option<(Rc<RefCell<HashSet<PathBuf>>>, PathBuf)>,
}

impl Folder {
    pub(crate) fn open_with_format(
        name: String,
        path: PathBuf,
        options: FolderOptions,
        mut format: Box<dyn MailboxFormat>,
    ) -> Result<Folder> {
        let mut state = FolderState::new(name, path, &options);

        state.locker.lock()?;
        if let Err(e) = format.read_messages(&mut state) {
            state.locker.unlock();
            return Err(e);
        }
        state.open = true;

        // the parser stays around only while something still needs it
        if !state.messages.iter().any(|m| m.is_delayed()) {
            if let Some(source) = &state.source {
                source.borrow_mut().stop();
            }
        }

        Ok(Folder {
            state,
            format,
            registry: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    pub fn folderdir(&self) -> Option<&Path> {
        self.state.folderdir.as_deref()
    }

    pub fn organization(&self) -> Organization {
        self.format.organization()
    }

    pub fn folder_type(&self) -> &'static str {
        self.format.type_name()
    }

    pub fn access(&self) -> Access {
        self.state.access
    }

    pub fn writable(&self) -> bool {
        self.state.access.writable()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.state.reporter
    }

    pub fn opened_at(&self) -> i64 {
        self.state.opened_at
    }

    pub fn is_modified(&self) -> bool {
        self.state.any_modified()
    }

    pub fn len(&self) -> usize {
        self.state.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.messages.is_empty()
    }

    // ---- message access

    pub fn message(&self, index: usize) -> Option<&Message> {
        self.state.messages.get(index)
    }

    pub fn message_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.state.messages.get_mut(index)
    }

    /// O(1) lookup by message id (angle brackets stripped).
    pub fn message_id(&self, id: &str) -> Option<&Message> {
        self.state
            .ids
            .get(id)
            .and_then(|&index| self.state.messages.get(index))
    }

    /// Like [`message_id`], falling back to a scan over messages whose id
    /// was not known yet.
    pub fn find(&mut self, id: &str) -> Option<&Message> {
        if let Some(&index) = self.state.ids.get(id) {
            return self.state.messages.get(index);
        }
        for index in 0..self.state.messages.len() {
            let message = &mut self.state.messages[index];
            if message.head().state() != HeaderState::Complete && message.load_head().is_err() {
                continue;
            }
            if let Some(found) = message.message_id() {
                self.state.ids.entry(found.clone()).or_insert(index);
                if found == id {
                    return self.state.messages.get(index);
                }
            }
        }
        None
    }

    /// Bounded back-to-front search for a message id: at most `window`
    /// messages, none older than `moment`. A `window` of zero means
    /// unbounded.
    pub fn scan_for_messages(
        &mut self,
        id: &str,
        window: usize,
        moment: i64,
    ) -> Option<usize> {
        let total = self.state.messages.len();
        let mut scanned = 0;
        for index in (0..total).rev() {
            if window != 0 && scanned >= window {
                return None;
            }
            scanned += 1;
            let message = &mut self.state.messages[index];
            if message.head().state() != HeaderState::Complete && message.load_head().is_err() {
                continue;
            }
            if message.guess_timestamp().map(|ts| ts < moment).unwrap_or(false) {
                return None;
            }
            if message.message_id().as_deref() == Some(id) {
                return Some(index);
            }
        }
        None
    }

    fn selected(&self, selector: &Selector, index: usize, message: &Message) -> bool {
        match selector {
            Selector::All => true,
            Selector::Active => !message.is_deleted(),
            Selector::Deleted => message.is_deleted(),
            Selector::Range(begin, end) => index >= *begin && index <= *end,
            Selector::Label(label) => message.label(label),
            Selector::NotLabel(label) => !message.label(label),
            Selector::Predicate(f) => f(message),
        }
    }

    /// Messages matching the selector, in folder order.
    pub fn messages(&self, selector: Selector) -> Vec<&Message> {
        self.state
            .messages
            .iter()
            .enumerate()
            .filter(|(index, message)| self.selected(&selector, *index, message))
            .map(|(_, message)| message)
            .collect()
    }

    pub(crate) fn selected_indices(&self, selector: Selector) -> Vec<usize> {
        self.state
            .messages
            .iter()
            .enumerate()
            .filter(|(index, message)| self.selected(&selector, *index, message))
            .map(|(index, _)| index)
            .collect()
    }

    // ---- the current marker

    /// Index of the "last read" message. The marker is itself the label
    /// `current`.
    pub fn current(&self) -> Option<&Message> {
        self.state
            .current
            .and_then(|index| self.state.messages.get(index))
    }

    pub fn set_current(&mut self, index: usize) -> Result<()> {
        if index >= self.state.messages.len() {
            return Err(Error::Usage(format!("no message {index} to make current")));
        }
        if let Some(old) = self.state.current.take() {
            if let Some(message) = self.state.messages.get_mut(old) {
                message.set_label("current", false);
            }
        }
        self.state.messages[index].set_label("current", true);
        self.state.current = Some(index);
        Ok(())
    }

    // ---- mutation

    /// Appends a message.
    ///
    /// Returns the index, or `None` when the message was a duplicate and
    /// silently dropped: same id plus matching `Subject` and `To`. A
    /// duplicate with different content gets a fresh id instead.
    pub fn add_message(&mut self, mut message: Message) -> Result<Option<usize>> {
        if !self.writable() {
            self.state
                .reporter
                .report(Severity::Error, "attempt to add to a read-only folder");
            return Err(Error::NotWritable(self.state.name.clone()));
        }

        self.format.coerce(&self.state, &mut message);
        let id = message.ensure_message_id();

        if !self.state.keep_dups {
            if let Some(&existing_index) = self.state.ids.get(&id) {
                let same = {
                    let existing = &self.state.messages[existing_index];
                    existing.subject() == message.subject()
                        && existing.head().get_body("to") == message.head().get_body("to")
                };
                if same {
                    self.state.reporter.report(
                        Severity::Notice,
                        format!("dropped duplicate message <{id}>"),
                    );
                    return Ok(None);
                }
                let fresh = crate::core::header::create_message_id();
                message
                    .head_mut()
                    .set(crate::Field::parse("Message-ID", &fresh));
                self.state.reporter.report(
                    Severity::Notice,
                    format!("message id <{id}> already in use, assigned {fresh}"),
                );
            }
        }

        message.mark_modified();
        let index = self.state.messages.len();
        self.state.push_message(message);
        self.state.modified = true;
        for hook in &self.state.to_thread {
            hook(&self.state.messages[index]);
        }
        Ok(Some(index))
    }

    pub fn add_messages(&mut self, messages: Vec<Message>) -> Result<Vec<Option<usize>>> {
        messages
            .into_iter()
            .map(|message| self.add_message(message))
            .collect()
    }

    /// Copies selected messages into another folder.
    ///
    /// With `subfolders` the folder tree below this folder is copied too;
    /// with `delete_copied` the originals are flagged deleted afterwards
    /// (which makes the copy a move at the next write).
    pub fn copy_to(
        &mut self,
        destination: &mut Folder,
        selector: Selector,
        subfolders: bool,
        delete_copied: bool,
    ) -> Result<usize> {
        if !destination.writable() {
            return Err(Error::NotWritable(destination.name().to_string()));
        }

        let indices = self.selected_indices(selector);
        let mut copied = 0;
        for index in indices {
            let mut clone = {
                let message = self
                    .state
                    .messages
                    .get_mut(index)
                    .expect("selected index in range");
                message.load_all()?;
                message.clone()
            };
            clone.reset_modified();
            if destination.add_message(clone)?.is_some() {
                copied += 1;
            }
            if delete_copied {
                self.state.messages[index].delete();
            }
        }

        if subfolders {
            for sub in self.subfolders()? {
                let mut from = self.format.open_subfolder(
                    &self.state,
                    &sub,
                    FolderOptions::default().access(Access::Read),
                )?;
                let mut to = destination.format.open_subfolder(
                    &destination.state,
                    &sub,
                    FolderOptions::default()
                        .access(Access::ReadWrite)
                        .create(true),
                )?;
                copied += from.copy_to(&mut to, Selector::All, true, delete_copied)?;
                to.close(ClosePolicy::Modified)?;
                from.close(ClosePolicy::Never)?;
            }
        }

        Ok(copied)
    }

    // ---- hooks

    /// Registers a callback run for every message entering the folder.
    pub fn on_thread(&mut self, hook: impl Fn(&Message) + 'static) {
        self.state.to_thread.push(Box::new(hook));
    }

    /// Registers a callback run for every message leaving the folder.
    pub fn on_unthread(&mut self, hook: impl Fn(&Message) + 'static) {
        self.state.to_unthread.push(Box::new(hook));
    }

    // ---- persistence

    /// Picks up messages appended to the folder by another process.
    pub fn update(&mut self) -> Result<()> {
        self.format.update(&mut self.state)
    }

    pub fn subfolders(&self) -> Result<Vec<String>> {
        self.format.subfolders(&self.state)
    }

    /// Serializes the folder according to its write policy.
    pub fn write(&mut self, options: WriteOptions) -> Result<()> {
        if !self.writable() && !options.force {
            self.state
                .reporter
                .report(Severity::Error, "attempt to write a read-only folder");
            return Err(Error::NotWritable(self.state.name.clone()));
        }
        if let Some(source) = &self.state.source {
            if source.borrow().was_changed() && !options.force {
                self.state.reporter.report(
                    Severity::Error,
                    "folder file was changed by someone else, write refused",
                );
                return Err(Error::FileChanged(self.state.path.clone()));
            }
        }

        self.format.write(&mut self.state, &options)?;
        self.finish_write(&options);
        Ok(())
    }

    fn finish_write(&mut self, options: &WriteOptions) {
        if !options.keep_deleted {
            let removed: Vec<Message> = {
                let mut kept = Vec::with_capacity(self.state.messages.len());
                let mut removed = Vec::new();
                for message in self.state.messages.drain(..) {
                    if message.is_deleted() {
                        removed.push(message);
                    } else {
                        kept.push(message);
                    }
                }
                self.state.messages = kept;
                removed
            };
            for message in &removed {
                for hook in &self.state.to_unthread {
                    hook(message);
                }
            }
        }
        self.state.reindex();
        for message in &mut self.state.messages {
            message.reset_modified();
        }
        self.state.modified = false;
    }

    /// Closes the folder: optionally writes, then unlocks and releases the
    /// parser. Returns false when a required write was refused.
    pub fn close(mut self, policy: ClosePolicy) -> Result<bool> {
        self.close_inner(policy)
    }

    fn close_inner(&mut self, policy: ClosePolicy) -> Result<bool> {
        if !self.state.open {
            return Ok(true);
        }
        let mut wrote_ok = true;
        let must_write = match policy {
            ClosePolicy::Never => false,
            ClosePolicy::Always => true,
            ClosePolicy::Modified => self.state.any_modified(),
        };
        if must_write {
            if self.writable() {
                if let Err(e) = self.write(WriteOptions::default()) {
                    self.state
                        .reporter
                        .report(Severity::Error, format!("write on close failed: {e}"));
                    wrote_ok = false;
                }
            } else {
                wrote_ok = false;
            }
        }

        if let Some(source) = self.state.source.take() {
            source.borrow_mut().stop();
        }
        self.state.locker.unlock();
        self.state.open = false;

        if let Some((registry, path)) = self.registry.take() {
            registry.borrow_mut().remove(&path);
        }
        Ok(wrote_ok)
    }

    /// Deletes the folder from disk: subfolders first, then messages, then
    /// the folder itself. Refused for read-only folders.
    pub fn delete(mut self) -> Result<()> {
        if !self.writable() {
            return Err(Error::NotWritable(self.state.name.clone()));
        }
        for sub in self.subfolders()? {
            let folder = self.format.open_subfolder(
                &self.state,
                &sub,
                FolderOptions::default().access(Access::ReadWrite),
            )?;
            folder.delete()?;
        }
        for message in &mut self.state.messages {
            message.delete();
        }

        self.format.delete_folder(&mut self.state)?;

        self.state.modified = false;
        for message in &mut self.state.messages {
            message.reset_modified();
        }
        self.state.messages.clear();
        self.close_inner(ClosePolicy::Never)?;
        Ok(())
    }
}

impl Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} folder {} with {} messages",
            self.format.type_name(),
            self.state.name,
            self.state.messages.len()
        )
    }
}

impl Drop for Folder {
    fn drop(&mut self) {
        if self.state.open {
            let policy = if self.state.save_on_exit && self.writable() {
                ClosePolicy::Modified
            } else {
                ClosePolicy::Never
            };
            let _ = self.close_inner(policy);
        }
    }
}
