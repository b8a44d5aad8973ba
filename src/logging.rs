//! Global logging setup: console plus log file.

use log::LevelFilter;
use std::path::Path;

/// Configure the global logger.
///
/// Log lines go to stdout and, when `log_file` is given, are appended to that
/// file as well. `verbose` raises the level from info to debug.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<(), fern::InitError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
