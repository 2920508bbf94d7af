//! Logging setup.
//!
//! `RUST_LOG` selects levels (default `info`). Without a log file, output goes
//! to stderr so the table and JSON modes own stdout. With `--log-file`, output
//! goes to a daily-rolling file instead.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer alive; dropping it flushes the log.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init_logging(log_file: Option<&Path>) -> io::Result<LoggingGuard> {
    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(io::stderr)
            .init();
        return Ok(LoggingGuard { _file_guard: None });
    };

    let (dir, name) = split_log_path(path)?;
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::daily(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(LoggingGuard {
        _file_guard: Some(guard),
    })
}

fn split_log_path(path: &Path) -> io::Result<(&Path, &std::ffi::OsStr)> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log file path has no file name: {}", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("logs/overhead.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "overhead.log");
    }

    #[test]
    fn test_split_log_path_bare_name() {
        let (dir, name) = split_log_path(Path::new("overhead.log")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "overhead.log");
    }

    #[test]
    fn test_split_log_path_rejects_directory() {
        assert!(split_log_path(Path::new("/")).is_err());
    }
}
