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

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// POSIX `fcntl(2)` write lock covering the whole folder file.
///
/// l_len of zero locks everything from l_start to the end of the file,
/// however large it grows.
pub(crate) struct PosixLock {
    path: PathBuf,
    file: Option<File>,
}

impl PosixLock {
    pub fn new(folder_file: &Path) -> PosixLock {
        PosixLock {
            path: folder_file.to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    pub fn try_lock(&mut self) -> io::Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        if fcntl_lock(&file, libc::F_WRLCK)? {
            self.file = Some(file);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fcntl_lock(&file, libc::F_UNLCK);
        }
    }
}

fn fcntl_lock(file: &File, l_type: libc::c_int) -> io::Result<bool> {
    let mut region: libc::flock = unsafe { std::mem::zeroed() };
    region.l_type = l_type as libc::c_short;
    region.l_whence = libc::SEEK_SET as libc::c_short;
    region.l_start = 0;
    region.l_len = 0;
    region.l_pid = 0;

    let ret = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &mut region) };
    if ret == 0 {
        Ok(true)
    } else {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EAGAIN) => Ok(false),
            _ => Err(err),
        }
    }
}
