//! Leveled stderr logging
//!
//! Each line is written whole under the stderr lock, stamped with the time
//! since logging started and, on pool workers, the worker index:
//!
//! ```text
//! [  0.004s] [INFO]  [w2] task 17 finished
//! ```
//!
//! # Environment Variables
//!
//! - `TASKLET_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace (or 0-5), default info
//! - `TASKLET_FLUSH_EPRINT=1` - flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! use tasklet_core::{kdebug, kinfo, kwarn};
//!
//! kinfo!("pool started with {} workers", n);
//! kdebug!("task {} queued", id);
//! kwarn!("callback panicked: {}", msg);
//! ```

use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Severity of a log line; `Off` silences everything
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Saturates at `Trace`
    pub fn from_u8(v: u8) -> Self {
        Self::ALL[usize::from(v).min(Self::ALL.len() - 1)]
    }

    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown log level name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level `{0}`")]
pub struct ParseLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, ParseLevelError> {
        let wanted = s.trim().to_ascii_lowercase();
        if let Ok(n) = wanted.parse::<u8>() {
            if usize::from(n) < Self::ALL.len() {
                return Ok(Self::from_u8(n));
            }
        }
        Self::ALL
            .into_iter()
            .find(|level| level.name() == wanted)
            .ok_or(ParseLevelError(wanted))
    }
}

struct Sink {
    level: AtomicU8,
    flush: AtomicBool,
    started: Instant,
}

static SINK: OnceLock<Sink> = OnceLock::new();

thread_local! {
    static WORKER_TAG: Cell<Option<usize>> = const { Cell::new(None) };
}

fn sink() -> &'static Sink {
    SINK.get_or_init(|| Sink {
        level: AtomicU8::new(
            crate::env::env_get_opt::<LogLevel>("TASKLET_LOG_LEVEL").unwrap_or(LogLevel::Info)
                as u8,
        ),
        flush: AtomicBool::new(crate::env::env_get_bool("TASKLET_FLUSH_EPRINT", false)),
        started: Instant::now(),
    })
}

/// Read the environment and start the log clock
///
/// Happens on first use anyway; call it early so timestamps count from
/// program start.
pub fn init() {
    sink();
}

pub fn log_level() -> LogLevel {
    LogLevel::from_u8(sink().level.load(Ordering::Relaxed))
}

/// Overrides `TASKLET_LOG_LEVEL`
pub fn set_log_level(level: LogLevel) {
    sink().level.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    sink().flush.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

/// Tag lines logged from this thread with `[w<id>]`
pub fn set_worker_id(id: usize) {
    WORKER_TAG.with(|tag| tag.set(Some(id)));
}

pub fn clear_worker_id() {
    WORKER_TAG.with(|tag| tag.set(None));
}

pub fn worker_id() -> Option<usize> {
    WORKER_TAG.with(Cell::get)
}

fn emit(level: Option<LogLevel>, args: fmt::Arguments<'_>) {
    let sink = sink();
    let mut out = std::io::stderr().lock();
    if let Some(level) = level {
        let elapsed = sink.started.elapsed().as_secs_f64();
        let _ = write!(out, "[{elapsed:>8.3}s] {} ", level.label());
        if let Some(id) = worker_id() {
            let _ = write!(out, "[w{id}] ");
        }
    }
    let _ = writeln!(out, "{args}");
    if sink.flush.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: fmt::Arguments<'_>) {
    emit(None, args);
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: fmt::Arguments<'_>) {
    if level_enabled(level) {
        emit(Some(level), args);
    }
}

/// Print a bare line to stderr regardless of level
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_kprintln_impl(format_args!(""))
    };
    ($($arg:tt)*) => {
        $crate::kprint::_kprintln_impl(format_args!($($arg)*))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::$level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}
