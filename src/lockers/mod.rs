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

//! Folder-level mutual exclusion between cooperating processes.
//!
//! A [`Locker`] wraps one of several strategies sharing a single contract:
//! `lock` either succeeds within the configured timeout, retrying every poll
//! interval, or fails. Lock files older than the expire threshold count as
//! stale and may be taken over. The guarantee only holds across processes
//! using the same strategy on the same folder.

pub mod dotlock;
pub mod flock;
pub mod nfs;
pub mod posix;

use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::report::{Reporter, Severity};
use crate::{Error, Result};

use dotlock::DotLock;
use flock::FlockLock;
use nfs::NfsLock;
use posix::PosixLock;

/// Locking strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMethod {
    /// Exclusive creation of a `<folder>.lock` sentinel file.
    #[default]
    DotLock,
    /// BSD `flock(2)` on the folder file.
    Flock,
    /// POSIX `fcntl(2)` write lock over the whole file.
    Posix,
    /// Unique-name plus hard-link trick; safe over NFS where exclusive
    /// creation is not.
    Nfs,
    /// No locking at all.
    None,
}

impl LockMethod {
    pub fn name(&self) -> &'static str {
        match self {
            LockMethod::DotLock => "DOTLOCK",
            LockMethod::Flock => "FLOCK",
            LockMethod::Posix => "POSIX",
            LockMethod::Nfs => "NFS",
            LockMethod::None => "NONE",
        }
    }
}

enum Strategy {
    None { locked: bool },
    DotLock(DotLock),
    Flock(FlockLock),
    Posix(PosixLock),
    Nfs(NfsLock),
    Multi(Vec<Locker>),
}

/// A folder lock.
pub struct Locker {
    strategy: Strategy,
    timeout: Duration,
    poll: Duration,
    expire: Duration,
    reporter: Reporter,
}

impl Locker {
    /// Creates a locker of the given strategy for a folder file.
    pub fn new(method: LockMethod, folder_file: impl Into<PathBuf>) -> Locker {
        let folder_file = folder_file.into();
        let strategy = match method {
            LockMethod::None => Strategy::None { locked: false },
            LockMethod::DotLock => Strategy::DotLock(DotLock::new(&folder_file)),
            LockMethod::Flock => Strategy::Flock(FlockLock::new(&folder_file)),
            LockMethod::Posix => Strategy::Posix(PosixLock::new(&folder_file)),
            LockMethod::Nfs => Strategy::Nfs(NfsLock::new(&folder_file)),
        };
        Locker {
            strategy,
            timeout: Duration::from_secs(10),
            poll: Duration::from_millis(1000),
            expire: Duration::from_secs(600),
            reporter: Reporter::default(),
        }
    }

    /// Combines several lockers; `lock` succeeds only when all of them do.
    pub fn multi(lockers: Vec<Locker>) -> Locker {
        Locker {
            strategy: Strategy::Multi(lockers),
            timeout: Duration::from_secs(10),
            poll: Duration::from_millis(1000),
            expire: Duration::from_secs(600),
            reporter: Reporter::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// The file this lock materializes as: the sentinel file for dotlock and
    /// NFS locks, the folder file itself for the advisory strategies.
    pub fn filename(&self) -> Option<&Path> {
        match &self.strategy {
            Strategy::None { .. } => None,
            Strategy::DotLock(inner) => Some(inner.lockfile()),
            Strategy::Flock(inner) => Some(inner.path()),
            Strategy::Posix(inner) => Some(inner.path()),
            Strategy::Nfs(inner) => Some(inner.lockfile()),
            Strategy::Multi(inner) => inner.first().and_then(|l| l.filename()),
        }
    }

    /// Overrides the sentinel file location for strategies that use one.
    pub fn set_filename(&mut self, path: impl Into<PathBuf>) {
        match &mut self.strategy {
            Strategy::DotLock(inner) => inner.set_lockfile(path.into()),
            Strategy::Nfs(inner) => inner.set_lockfile(path.into()),
            _ => {}
        }
    }

    pub fn is_locked(&self) -> bool {
        match &self.strategy {
            Strategy::None { locked } => *locked,
            Strategy::DotLock(inner) => inner.is_locked(),
            Strategy::Flock(inner) => inner.is_locked(),
            Strategy::Posix(inner) => inner.is_locked(),
            Strategy::Nfs(inner) => inner.is_locked(),
            Strategy::Multi(inner) => !inner.is_empty() && inner.iter().all(|l| l.is_locked()),
        }
    }

    /// Acquires the lock, retrying until the timeout elapses.
    pub fn lock(&mut self) -> Result<()> {
        if self.is_locked() {
            return Ok(());
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match self.try_lock() {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    self.reporter
                        .report(Severity::Warning, format!("lock attempt failed: {e}"));
                    return Err(e.into());
                }
            }

            if Instant::now() >= deadline {
                let path = self
                    .filename()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                self.reporter.report(
                    Severity::Warning,
                    format!("folder already in use: {}", path.display()),
                );
                return Err(Error::LockTimeout {
                    path,
                    timeout: self.timeout,
                });
            }
            thread::sleep(self.poll.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn try_lock(&mut self) -> io::Result<bool> {
        let expire = self.expire;
        match &mut self.strategy {
            Strategy::None { locked } => {
                *locked = true;
                Ok(true)
            }
            Strategy::DotLock(inner) => inner.try_lock(expire),
            Strategy::Flock(inner) => inner.try_lock(),
            Strategy::Posix(inner) => inner.try_lock(),
            Strategy::Nfs(inner) => inner.try_lock(expire),
            Strategy::Multi(inner) => {
                let mut taken = 0;
                for locker in inner.iter_mut() {
                    match locker.try_lock() {
                        Ok(true) => taken += 1,
                        other => {
                            // Partial acquisition rolls back.
                            for locker in inner.iter_mut().take(taken) {
                                locker.unlock();
                            }
                            return other;
                        }
                    }
                }
                Ok(true)
            }
        }
    }

    /// Releases the lock. Safe to call when not locked.
    pub fn unlock(&mut self) {
        match &mut self.strategy {
            Strategy::None { locked } => *locked = false,
            Strategy::DotLock(inner) => inner.unlock(),
            Strategy::Flock(inner) => inner.unlock(),
            Strategy::Posix(inner) => inner.unlock(),
            Strategy::Nfs(inner) => inner.unlock(),
            Strategy::Multi(inner) => {
                for locker in inner.iter_mut().rev() {
                    locker.unlock();
                }
            }
        }
    }
}

impl Drop for Locker {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Short host name of this machine, used in lock and message-id tokens.
pub(crate) fn hostname() -> String {
    let mut buf = [0u8; 256];
    let res = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if res == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..end]).into_owned()
    } else {
        "localhost".into()
    }
}
