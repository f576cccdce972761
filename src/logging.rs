//! Logging setup for the fan controller

use fern::Dispatch;
use log::LevelFilter;

/// Map the `-v` count onto a level filter
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Setup logging with the specified verbosity level
///
/// Under systemd the journal stamps every line itself, so the local timestamp
/// is dropped when `JOURNAL_STREAM` is present.
pub fn setup(verbosity: u8) -> Result<(), fern::InitError> {
    let journald = std::env::var_os("JOURNAL_STREAM").is_some();

    Dispatch::new()
        .format(move |out, message, record| {
            if journald {
                out.finish(format_args!("[{}] {}: {}", record.level(), record.target(), message))
            } else {
                out.finish(format_args!(
                    "{} [{}] {}: {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .level(level_for(verbosity))
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}
