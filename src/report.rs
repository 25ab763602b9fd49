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

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a [`Report`].
///
/// Records at or above an object's trace level are emitted immediately
/// through the `log` facade; records at or above its log level are retained
/// on the object for later query. `Internal` always emits and aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Notice = 1,
    Progress = 2,
    Warning = 3,
    Error = 4,
    None = 5,
    Internal = 6,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Notice => "NOTICE",
            Severity::Progress => "PROGRESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::None => "NONE",
            Severity::Internal => "INTERNAL",
        }
    }

    fn from_u8(v: u8) -> Severity {
        match v {
            0 => Severity::Debug,
            1 => Severity::Notice,
            2 => Severity::Progress,
            3 => Severity::Warning,
            5 => Severity::None,
            6 => Severity::Internal,
            _ => Severity::Error,
        }
    }

    fn log_level(&self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Notice | Severity::Progress => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            _ => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retained log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub text: String,
}

static DEFAULT_LOG: AtomicU8 = AtomicU8::new(Severity::Warning as u8);
static DEFAULT_TRACE: AtomicU8 = AtomicU8::new(Severity::Warning as u8);

/// Sets the process-global default log and trace levels used by every
/// [`Reporter`] created afterwards.
pub fn set_default_levels(log: Severity, trace: Severity) {
    DEFAULT_LOG.store(log as u8, Ordering::Relaxed);
    DEFAULT_TRACE.store(trace as u8, Ordering::Relaxed);
}

pub fn default_levels() -> (Severity, Severity) {
    (
        Severity::from_u8(DEFAULT_LOG.load(Ordering::Relaxed)),
        Severity::from_u8(DEFAULT_TRACE.load(Ordering::Relaxed)),
    )
}

/// Per-object log and trace sink.
///
/// Every stateful object of the store (folder, parser, locker, manager)
/// carries one. Reports never alter the data model; they are a side channel.
#[derive(Debug, Clone)]
pub struct Reporter {
    log_level: Cell<Severity>,
    trace_level: Cell<Severity>,
    reports: RefCell<Vec<Report>>,
}

impl Default for Reporter {
    fn default() -> Self {
        let (log, trace) = default_levels();
        Reporter {
            log_level: Cell::new(log),
            trace_level: Cell::new(trace),
            reports: RefCell::new(Vec::new()),
        }
    }
}

impl Reporter {
    pub fn new(log: Severity, trace: Severity) -> Self {
        Reporter {
            log_level: Cell::new(log),
            trace_level: Cell::new(trace),
            reports: RefCell::new(Vec::new()),
        }
    }

    pub fn log_level(&self) -> Severity {
        self.log_level.get()
    }

    pub fn trace_level(&self) -> Severity {
        self.trace_level.get()
    }

    pub fn set_log_level(&self, level: Severity) {
        self.log_level.set(level);
    }

    pub fn set_trace_level(&self, level: Severity) {
        self.trace_level.set(level);
    }

    /// Files a report.
    ///
    /// `Internal` reports denote broken invariants and abort the process
    /// after emission.
    pub fn report(&self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        if severity >= self.trace_level.get() || severity == Severity::Internal {
            log::log!(severity.log_level(), "{}: {}", severity, text);
        }
        if severity == Severity::Internal {
            panic!("internal: {}", text);
        }
        if severity >= self.log_level.get() && severity < Severity::None {
            self.reports.borrow_mut().push(Report { severity, text });
        }
    }

    /// Returns all retained reports.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }

    /// Returns the retained reports at or above `severity`.
    pub fn reports_above(&self, severity: Severity) -> Vec<Report> {
        self.reports
            .borrow()
            .iter()
            .filter(|r| r.severity >= severity)
            .cloned()
            .collect()
    }

    /// Highest severity retained so far, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.reports.borrow().iter().map(|r| r.severity).max()
    }

    pub fn clear(&self) {
        self.reports.borrow_mut().clear();
    }
}
