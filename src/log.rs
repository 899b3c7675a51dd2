use chrono::{SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Location of the log file: `$XDG_STATE_HOME/mailrules/mailrules.log`.
pub fn log_path() -> PathBuf {
    let dir = if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        PathBuf::from(xdg).join("mailrules")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("mailrules")
    } else {
        PathBuf::from("/tmp").join("mailrules")
    };
    dir.join("mailrules.log")
}

/// Route log output to the log file. Until this runs, log lines go to stderr.
pub fn init() {
    let path = log_path();
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: failed to create log dir {}: {}", parent.display(), e);
            return;
        }
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            if let Ok(mut guard) = LOG_FILE.lock() {
                *guard = Some(file);
            }
        }
        Err(e) => eprintln!("Warning: failed to open log file {}: {}", path.display(), e),
    }
}

/// Truncate the log file.
pub fn clear() -> Result<(), String> {
    let path = log_path();
    if !path.exists() {
        return Ok(());
    }
    File::create(&path)
        .map(|_| ())
        .map_err(|e| format!("failed to clear log file {}: {}", path.display(), e))
}

/// Current timestamp as RFC 3339 with millisecond precision (used by macros).
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write one formatted line (used by macros).
pub fn write(level: &str, message: std::fmt::Arguments<'_>) {
    let line = format!("[{}] [{}] {}", now(), level, message);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
            return;
        }
    }
    eprintln!("{}", line);
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::write("INFO", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log::write("DEBUG", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::write("ERROR", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::write("WARN", format_args!($($arg)*))
    };
}
