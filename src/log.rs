//! Coloured console logging used by the binary and the console observer.

use color_print::{ceprintln, cprintln};
use std::sync::atomic::{AtomicU8, Ordering};

/// How chatty the process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

pub fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= LEVEL.load(Ordering::Relaxed)
}

pub fn info(msg: &str) {
    if enabled(Level::Info) {
        cprintln!("<green, bold>[INFO]</green, bold> {msg}");
    }
}

pub fn warn(msg: &str) {
    if enabled(Level::Warn) {
        ceprintln!("<yellow, bold>[WARN]</yellow, bold> {msg}");
    }
}

pub fn error(msg: &str) {
    ceprintln!("<red, bold>[ERROR]</red, bold> {msg}");
}

pub fn debug(msg: &str) {
    if enabled(Level::Debug) {
        ceprintln!("<blue, bold>[DEBUG]</blue, bold> {msg}");
    }
}
