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

//! # mail-store
//!
//! _mail-store_ is a **local mail store library** written in Rust. It parses,
//! represents and persists RFC 822/RFC 5322 messages stored on disk in the
//! classic folder formats: single-file **mbox** folders and one-file-per-message
//! **MH** and **Maildir** folders. The same folder API works across all of
//! them.
//!
//! The engine is built around three ideas:
//!
//! - **Laziness**: opening a folder reads as little as the caller allows.
//!   Headers and bodies can stay on disk as byte ranges and are loaded the
//!   first time they are needed, controlled by an extract policy
//!   (always, lazy, or a size threshold).
//! - **Locking**: folders are protected against cooperating processes with a
//!   pluggable [`Locker`] (dotlock, `flock(2)`, POSIX `fcntl(2)` ranges, an
//!   NFS-safe variant, or any combination of these).
//! - **Faithful rewriting**: closing a modified mbox folder rewrites it either
//!   by copying unmodified messages byte for byte into a temporary file that
//!   atomically replaces the original, or in place from the first modified
//!   message onward. Unmodified messages survive a rewrite byte-identical.
//!
//! On top of the store sit the usual message operations: building new
//! messages, replying, forwarding (inline, attached or encapsulated),
//! bouncing with resent groups, and rebuilding multipart structures with
//! rewrite rules.
//!
//! ```rust,ignore
//! use mail_store::{ClosePolicy, ExtractPolicy, FolderOptions, Manager};
//!
//! let mut manager = Manager::new();
//! let mut inbox = manager.open(
//!     "=inbox",
//!     FolderOptions::default().extract(ExtractPolicy::SizeThreshold(10_000)),
//! )?;
//!
//! for message in inbox.messages(Default::default()) {
//!     println!("{}", message.subject().unwrap_or("<no subject>"));
//! }
//!
//! inbox.message_mut(3).unwrap().delete();
//! manager.close(inbox, ClosePolicy::Modified)?;
//! ```
pub mod core;
pub mod decoders;
pub mod lockers;
pub mod mailbox;
pub mod parsers;
pub mod report;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub use crate::core::address::{Addr, Group};
pub use crate::core::body::{Body, BodyContent, Encoding, Multipart};
pub use crate::core::builder::MessageBuilder;
pub use crate::core::field::Field;
pub use crate::core::header::{Header, HeaderState, ResentGroup};
pub use crate::core::message::Message;
pub use crate::core::transform::{
    forward_subject, reply_subject, BounceOptions, ForwardInclude, ForwardOptions, RebuildRule,
    ReplyInclude, ReplyOptions,
};
pub use crate::lockers::{LockMethod, Locker};
pub use crate::mailbox::manager::Manager;
pub use crate::mailbox::{
    ClosePolicy, ExtractPolicy, Folder, FolderOptions, RewriteMode, Selector, WriteOptions,
};
pub use crate::parsers::source::MailSource;
pub use crate::report::{Report, Reporter, Severity};

/// Errors reported by the store.
///
/// Recoverable conditions inside a parse (malformed continuations, bogus
/// message ids) do not surface here; they are reported through the owning
/// object's [`Reporter`] and repaired locally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("could not lock {} within {timeout:?}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("{} changed while it was being accessed", .0.display())]
    FileChanged(PathBuf),

    #[error("folder {0} is not writable")]
    NotWritable(String),

    #[error("folder {0} is already open")]
    AlreadyOpen(String),

    #[error("no folder type recognizes {0}")]
    UnknownFolderType(String),

    #[error("malformed message: {0}")]
    Format(String),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Access mode of an open folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Read,
    ReadWrite,
    Append,
}

impl Access {
    pub fn readable(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::Append)
    }
}

/// On-disk layout family of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Organization {
    /// All messages concatenated in a single file (mbox).
    File,
    /// One file per message inside a directory (MH, Maildir).
    Directory,
}

/// Line-ending discipline of a body or folder file.
///
/// The discipline is detected from the first complete line read from a
/// source file and carried into every body read from it, so serialization
/// preserves the original separators unless the caller converts explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    Cr,
    #[default]
    Lf,
    CrLf,
    /// Resolves to the platform separator at serialization time.
    Native,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Cr => "\r",
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            #[cfg(windows)]
            LineEnding::Native => "\r\n",
            #[cfg(not(windows))]
            LineEnding::Native => "\n",
        }
    }
}
