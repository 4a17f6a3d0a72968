use flexi_logger::{DeferredNow, Logger, LoggerHandle};

/// Starts logging to stderr. The returned handle must be kept alive for the program's lifetime.
pub fn init(log_level: &str) -> anyhow::Result<LoggerHandle> {
    let handle = Logger::try_with_str(log_level)?
        .format(simple_format)
        .start()?;
    Ok(handle)
}

// Format: "YYYY-MM-DD HH:mm:ss.fff INF message (sync::condvar_based:42)"
fn simple_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let level_abbr = match record.level() {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    };

    write!(
        w,
        "{} {} {} ({}:{})",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbr,
        record.args(),
        record.module_path().unwrap_or("<unknown>"),
        record.line().unwrap_or(0)
    )
}
