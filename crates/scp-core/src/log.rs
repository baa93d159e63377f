//! Framework log
//!
//! Level-filtered, line-atomic output to stderr in the style of a firmware
//! console. In buffered mode lines are queued and written out later by
//! [`unbuffer`], which the dispatch loop calls whenever it runs out of work,
//! so logging from a handler never stalls on the console.
//!
//! # Environment Variables
//!
//! - `SCP_LOG_LEVEL=<level>` - Minimum level: trace, info, warn, error, crit, off
//! - `SCP_LOG_BUFFERED=1` - Queue lines until the dispatch loop goes idle
//!
//! # Usage
//!
//! ```ignore
//! use scp_core::{fwk_info, fwk_err};
//!
//! fwk_info!("[SMT] channel {} ready", idx);
//! fwk_err!("[FWK] handler failed: {}", err);
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::irq_lock::IrqLock;

/// Log levels, least to most severe
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Crit = 4,
    Off = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Trace,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            4 => LogLevel::Crit,
            _ => LogLevel::Off,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_lowercase().as_str() {
            "trace" | "0" => LogLevel::Trace,
            "info" | "1" => LogLevel::Info,
            "warn" | "2" => LogLevel::Warn,
            "error" | "3" => LogLevel::Error,
            "crit" | "4" => LogLevel::Crit,
            "off" | "5" => LogLevel::Off,
            _ => return None,
        })
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Trace => "[TRACE]",
            LogLevel::Info => "[INFO] ",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Error => "[ERROR]",
            LogLevel::Crit => "[CRIT] ",
            LogLevel::Off => "",
        }
    }
}

/// Lines kept while buffered; older lines are dropped past this
pub const BUFFER_LINES: usize = 256;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static BUFFERED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static DROPPED: AtomicBool = AtomicBool::new(false);
static PENDING: IrqLock<VecDeque<String>> = IrqLock::new(VecDeque::new());

/// Initialize from environment variables.
///
/// Runs automatically on first use.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(level) = std::env::var("SCP_LOG_LEVEL")
        .ok()
        .and_then(|v| LogLevel::parse(&v))
    {
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
    if let Ok(val) = std::env::var("SCP_LOG_BUFFERED") {
        let on = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        BUFFERED.store(on, Ordering::Relaxed);
    }
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_buffered(enabled: bool) {
    init();
    BUFFERED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn buffered() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    BUFFERED.load(Ordering::Relaxed)
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level >= log_level()
}

/// Number of lines waiting for [`unbuffer`]
pub fn pending() -> usize {
    PENDING.with(|q| q.len())
}

/// Write out every queued line. Returns how many were written.
pub fn unbuffer() -> usize {
    let lines: Vec<String> = PENDING.with(|q| q.drain(..).collect());
    if lines.is_empty() {
        return 0;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    if DROPPED.swap(false, Ordering::Relaxed) {
        let _ = writeln!(handle, "{} log buffer overflow", LogLevel::Warn.prefix());
    }
    for line in &lines {
        let _ = handle.write_all(line.as_bytes());
        let _ = handle.write_all(b"\n");
    }
    let _ = handle.flush();
    lines.len()
}

#[doc(hidden)]
pub fn _fwk_log_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    if buffered() {
        let line = format!("{} {}", level.prefix(), args);
        PENDING.with(|q| {
            if q.len() >= BUFFER_LINES {
                q.pop_front();
                DROPPED.store(true, Ordering::Relaxed);
            }
            q.push_back(line);
        });
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
}

// ============================================================================
// Public Macros
// ============================================================================

#[macro_export]
macro_rules! fwk_trace {
    ($($arg:tt)*) => {{
        $crate::log::_fwk_log_impl($crate::log::LogLevel::Trace, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fwk_info {
    ($($arg:tt)*) => {{
        $crate::log::_fwk_log_impl($crate::log::LogLevel::Info, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fwk_warn {
    ($($arg:tt)*) => {{
        $crate::log::_fwk_log_impl($crate::log::LogLevel::Warn, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fwk_err {
    ($($arg:tt)*) => {{
        $crate::log::_fwk_log_impl($crate::log::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Critical: the framework lost work (dropped event, failed handler)
#[macro_export]
macro_rules! fwk_crit {
    ($($arg:tt)*) => {{
        $crate::log::_fwk_log_impl($crate::log::LogLevel::Crit, format_args!($($arg)*));
    }};
}
