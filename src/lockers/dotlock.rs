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

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Mutual exclusion via exclusive creation of a `<folder>.lock` sentinel.
///
/// The sentinel holds the pid of the locking process. A sentinel older than
/// the expire threshold is treated as left behind by a crashed process and
/// removed before retrying.
pub(crate) struct DotLock {
    lockfile: PathBuf,
    locked: bool,
}

pub(crate) fn lockfile_for(folder_file: &Path) -> PathBuf {
    let mut name = folder_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

impl DotLock {
    pub fn new(folder_file: &Path) -> DotLock {
        DotLock {
            lockfile: lockfile_for(folder_file),
            locked: false,
        }
    }

    pub fn lockfile(&self) -> &Path {
        &self.lockfile
    }

    pub fn set_lockfile(&mut self, path: PathBuf) {
        debug_assert!(!self.locked);
        self.lockfile = path;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn try_lock(&mut self, expire: Duration) -> io::Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lockfile)
        {
            Ok(mut file) => {
                let _ = write!(file, "{}\n", std::process::id());
                self.locked = true;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if is_stale(&self.lockfile, expire) {
                    let _ = fs::remove_file(&self.lockfile);
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn unlock(&mut self) {
        if self.locked {
            let _ = fs::remove_file(&self.lockfile);
            self.locked = false;
        }
    }
}

pub(crate) fn is_stale(lockfile: &Path, expire: Duration) -> bool {
    fs::metadata(lockfile)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age >= expire)
        .unwrap_or(false)
}
