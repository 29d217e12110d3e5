//! Logging setup: `env_logger` filtering, printed above the progress bars
//! on a terminal and as plain `[LEVEL] message` lines elsewhere.

use indicatif::MultiProgress;

fn tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[1;31m",
        log::Level::Warn => "\x1b[1;33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug | log::Level::Trace => "\x1b[2m",
    }
}

/// Map an operator-facing level name to an env_logger filter string.
///
/// Accepts the names used on the command line (`debug`, `info`, `warning`,
/// `error`) as well as `warn` and `trace`.
pub fn filter_for(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

/// Prints accepted records while the progress bars are suspended.
struct ProgressAwareLogger {
    filter: env_logger::Logger,
    bars: MultiProgress,
}

impl log::Log for ProgressAwareLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.filter.matches(record) {
            return;
        }
        let level = record.level();
        let line = format!("[{}{}\x1b[0m] {}", ansi(level), tag(level), record.args());
        self.bars.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {}
}

/// Initialize logging once, from the entry point.
///
/// `level` is the default filter (see [`filter_for`]); `RUST_LOG` still wins
/// when set. With `bars`, lines are routed through the progress display.
pub fn init_logging(level: &str, bars: Option<&MultiProgress>) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(filter_for(level).unwrap_or("info"));
    let mut builder = env_logger::Builder::from_env(env);

    match bars {
        Some(bars) => {
            let filter = builder.build();
            let max_level = filter.filter();
            let logger = ProgressAwareLogger {
                filter,
                bars: bars.clone(),
            };
            if log::set_boxed_logger(Box::new(logger)).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = builder
                .format(|buf, record| writeln!(buf, "[{}] {}", tag(record.level()), record.args()))
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_warn() {
        assert_eq!(filter_for("warning"), Some("warn"));
        assert_eq!(filter_for("WARN"), Some("warn"));
    }

    #[test]
    fn unknown_level_rejected() {
        assert_eq!(filter_for("verbose"), None);
    }

    #[test]
    fn tags_are_padded() {
        assert!(
            [log::Level::Error, log::Level::Warn, log::Level::Info]
                .iter()
                .all(|l| tag(*l).len() == 5)
        );
    }
}
