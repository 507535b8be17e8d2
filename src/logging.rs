use std::path::Path;

use anyhow::{Context, Error};
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 3;

/// Rotating file log plus console duplicate for the display daemon.
///
/// The returned handle must stay alive for the lifetime of the process.
pub fn init_display_logging(path: &Path) -> Result<LoggerHandle, Error> {
    let handle = Logger::try_with_env_or_str("info")?
        .log_to_file(file_spec(path)?)
        .rotate(
            Criterion::Size(MAX_LOG_SIZE),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .append()
        .duplicate_to_stderr(Duplicate::Info)
        .format(flexi_logger::detailed_format)
        .start()?;
    Ok(handle)
}

/// Simple append-only log for the one-shot networking script.
pub fn init_boot_logging(path: &Path) -> Result<LoggerHandle, Error> {
    let handle = Logger::try_with_env_or_str("info")?
        .log_to_file(file_spec(path)?)
        .append()
        .duplicate_to_stderr(Duplicate::Info)
        .format(flexi_logger::detailed_format)
        .start()?;
    Ok(handle)
}

fn file_spec(path: &Path) -> Result<FileSpec, Error> {
    let mut spec = FileSpec::default().suppress_timestamp();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        spec = spec.directory(dir);
    }
    if let Some(stem) = path.file_stem() {
        spec = spec.basename(stem.to_string_lossy());
    }
    if let Some(extension) = path.extension() {
        spec = spec.suffix(extension.to_string_lossy());
    }
    Ok(spec)
}
