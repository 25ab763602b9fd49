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
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::dotlock::{is_stale, lockfile_for};
use super::hostname;

/// NFS-safe variant of the dotlock.
///
/// O_EXCL is unreliable over NFS, but `link(2)` is atomic there: write a
/// uniquely named sibling file, hard-link it to the shared sentinel name,
/// and verify the link count. Either the link call succeeds or the unique
/// file ends up with two links; both mean the lock is ours.
pub(crate) struct NfsLock {
    lockfile: PathBuf,
    locked: bool,
}

impl NfsLock {
    pub fn new(folder_file: &Path) -> NfsLock {
        NfsLock {
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

    fn unique_name(&self) -> PathBuf {
        let mut name = self.lockfile.as_os_str().to_os_string();
        name.push(format!(".{}-{}", hostname(), std::process::id()));
        PathBuf::from(name)
    }

    pub fn try_lock(&mut self, expire: Duration) -> io::Result<bool> {
        let unique = self.unique_name();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&unique)?;
        let _ = write!(file, "{}\n", std::process::id());
        drop(file);

        let acquired = match fs::hard_link(&unique, &self.lockfile) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // The link count tells the truth even when the reply to the
                // link RPC was lost.
                fs::metadata(&unique).map(|m| m.nlink() == 2).unwrap_or(false)
            }
            Err(e) => {
                let _ = fs::remove_file(&unique);
                return Err(e);
            }
        };
        let _ = fs::remove_file(&unique);

        if acquired {
            self.locked = true;
            Ok(true)
        } else {
            if is_stale(&self.lockfile, expire) {
                let _ = fs::remove_file(&self.lockfile);
            }
            Ok(false)
        }
    }

    pub fn unlock(&mut self) {
        if self.locked {
            let _ = fs::remove_file(&self.lockfile);
            self.locked = false;
        }
    }
}
