//! Logging support.

use flexi_logger::{style, DeferredNow, Level, Logger, Record};
use libc::{isatty, STDOUT_FILENO};
use std::{fmt::Arguments, io::Write, sync::OnceLock, thread};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Initializes the global logger for the `log` facade.
///
/// Chooses its format at each write based on whether stdout is a tty:
/// colorized, human-readable lines during interactive bring-up, or
/// systemd-priority-prefixed lines when run under a supervisor. The
/// level defaults to `info` but honors `RUST_LOG`.
///
/// # Panics
///
/// If the logger fails to initialize.
pub fn init() {
    static LOGGER: OnceLock<flexi_logger::LoggerHandle> = OnceLock::new();
    LOGGER.get_or_init(|| {
        Logger::try_with_env_or_str(DEFAULT_LOG_LEVEL)
            .expect("failed to initialize logger")
            .format(format)
            .start()
            .expect("failed to start the logger")
    });
}

fn format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record<'_>) -> Result<(), std::io::Error> {
    let tty = unsafe { isatty(STDOUT_FILENO) } != 0;
    if tty {
        let level = record.level();
        let log = format!(
            "[{}] T[{:?}] {: <5} [{}:{}] {}",
            now.now().format("%y-%m-%d %H:%M:%S%.3f %:z"),
            thread::current().name().unwrap_or("<unnamed>"),
            level,
            record.file().unwrap_or("<unnamed>"),
            record.line().unwrap_or(0),
            &record.args()
        );
        write!(w, "{}", style(level).paint(log))
    } else {
        format_newstyle_daemon(w, record)
    }
}

/// Formats a record the way systemd expects from a new-style daemon:
/// an `<n>` syslog priority prefix, one record per line.
fn format_newstyle_daemon(w: &mut dyn Write, record: &Record<'_>) -> Result<(), std::io::Error> {
    fn sanitize_args(args: Arguments<'_>) -> String {
        std::fmt::format(args).trim().replace(['\n', '\r'], " ")
    }
    let priority = match record.level() {
        Level::Error => b"<3>",
        Level::Warn => b"<4>",
        Level::Info => b"<5>",
        Level::Debug => b"<6>",
        Level::Trace => b"<7>",
    };
    w.write_all(priority)?;
    write!(w, "[{}:{}] ", record.file().unwrap_or("<unnamed>"), record.line().unwrap_or(0))?;
    w.write_all(sanitize_args(*record.args()).as_bytes())?;
    w.write_all(b"\n")
}
