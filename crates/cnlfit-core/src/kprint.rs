//! Kernel-style leveled print macros for the fitting layer
//!
//! Output goes to stderr, one locked write per line, prefixed with the level
//! and the `cnlfit` tag, in the manner of printk.
//!
//! # Environment Variables
//!
//! - `CNLFIT_LOG_LEVEL=<level>` - `off|error|warn|info|debug|trace` or `0..5` (default: warn)
//! - `CNLFIT_FLUSH_EPRINT=1` - flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! use cnlfit_core::{fit_info, fit_warn};
//!
//! fit_info!("session {} opened", sid);
//! fit_warn!("event dropped: {}", err);
//! ```

use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Once;

use crate::env::{env_get, env_get_bool};

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
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "E",
            LogLevel::Warn => "W",
            LogLevel::Info => "I",
            LogLevel::Debug => "D",
            LogLevel::Trace => "T",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "1" => Ok(LogLevel::Error),
            "warn" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

static INIT: Once = Once::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);

/// Read the environment once. Later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let level: LogLevel = env_get("CNLFIT_LOG_LEVEL", LogLevel::Warn);
        LEVEL.store(level as u8, Ordering::Relaxed);
        FLUSH.store(env_get_bool("CNLFIT_FLUSH_EPRINT", false), Ordering::Relaxed);
    });
}

#[inline]
pub fn log_level() -> LogLevel {
    init();
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Override the level (tests, embedding code).
pub fn set_log_level(level: LogLevel) {
    init();
    LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

#[doc(hidden)]
pub fn _fit_log_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = write!(out, "cnlfit[{}]: ", level.tag());
    let _ = out.write_fmt(args);
    let _ = out.write_all(b"\n");
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! fit_error {
    ($($arg:tt)*) => {{
        $crate::kprint::_fit_log_impl($crate::kprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fit_warn {
    ($($arg:tt)*) => {{
        $crate::kprint::_fit_log_impl($crate::kprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fit_info {
    ($($arg:tt)*) => {{
        $crate::kprint::_fit_log_impl($crate::kprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fit_debug {
    ($($arg:tt)*) => {{
        $crate::kprint::_fit_log_impl($crate::kprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! fit_trace {
    ($($arg:tt)*) => {{
        $crate::kprint::_fit_log_impl($crate::kprint::LogLevel::Trace, format_args!($($arg)*));
    }};
}
