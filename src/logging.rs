//! Logging setup shared by both binaries.
//!
//! Installs a global tracing subscriber whose sinks all print
//! `timestamp [LEVEL] message`: an append-only log file, stdout, stderr
//! (errors only) and, when configured, the local syslog socket.

use std::{
    fmt,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Event, Level, Subscriber};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{format, writer::MakeWriterExt, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]"
);

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub file_name: String,
    /// Path of the syslog datagram socket, if forwarding is wanted.
    pub syslog: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the global subscriber. Subsequent calls are no-ops.
///
/// An unreachable syslog socket only produces a warning; every other failure
/// is returned so the caller can fall back to plain stderr output.
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    fs::create_dir_all(&config.dir).map_err(|source| LoggingError::CreateDir {
        path: config.dir.clone(),
        source,
    })?;
    let log_path = config.dir.join(&config.file_name);
    ensure_file_exists(&log_path)?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::never(&config.dir, &config.file_name));

    let (syslog_layer, syslog_error) = match &config.syslog {
        Some(path) => match syslog::SyslogWriter::connect(path) {
            Ok(writer) => (Some(line_layer(writer)), None),
            Err(e) => (None, Some(format!("{}: {}", path.display(), e))),
        },
        None => (None, None),
    };

    Registry::default()
        .with(build_env_filter())
        .with(line_layer(file_writer))
        .with(line_layer(std::io::stdout))
        .with(line_layer(std::io::stderr.with_max_level(Level::ERROR)))
        .with(syslog_layer)
        .try_init()?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Log file: {}", log_path.display());
    if let Some(err) = syslog_error {
        tracing::warn!("Cannot connect to syslog: {}", err);
    }
    Ok(())
}

fn line_layer<S, W>(writer: W) -> tracing_subscriber::fmt::Layer<S, format::DefaultFields, LineFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(LineFormat)
        .with_writer(writer)
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `2024-05-01 12:00:00,123 [INFO] message`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl LineFormat {
    fn write_prefix(
        writer: &mut impl fmt::Write,
        now: OffsetDateTime,
        level: &Level,
    ) -> fmt::Result {
        let stamp = now.format(TIMESTAMP_FORMAT).map_err(|_| fmt::Error)?;
        write!(writer, "{} [{}] ", stamp, level)
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        Self::write_prefix(&mut writer, now_local_or_utc(), event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(unix)]
mod syslog {
    use std::io::{self, Write};
    use std::os::unix::net::UnixDatagram;
    use std::path::Path;
    use std::sync::Arc;
    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;

    /// RFC 3164 user facility.
    const FACILITY_USER: u8 = 1;

    /// Sends each formatted line as one datagram to the local syslog daemon.
    #[derive(Debug, Clone)]
    pub struct SyslogWriter {
        socket: Arc<UnixDatagram>,
    }

    impl SyslogWriter {
        pub fn connect(path: &Path) -> io::Result<Self> {
            let socket = UnixDatagram::unbound()?;
            socket.connect(path)?;
            Ok(Self {
                socket: Arc::new(socket),
            })
        }
    }

    pub fn priority(level: &Level) -> u8 {
        let severity = match *level {
            Level::ERROR => 3,
            Level::WARN => 4,
            Level::INFO => 6,
            Level::DEBUG | Level::TRACE => 7,
        };
        FACILITY_USER * 8 + severity
    }

    pub struct SyslogLine<'a> {
        socket: &'a UnixDatagram,
        priority: u8,
    }

    impl Write for SyslogLine<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let line = buf.strip_suffix(b"\n").unwrap_or(buf);
            let mut frame = format!("<{}>", self.priority).into_bytes();
            frame.extend_from_slice(line);
            self.socket.send(&frame)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SyslogWriter {
        type Writer = SyslogLine<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            SyslogLine {
                socket: &self.socket,
                priority: priority(&Level::INFO),
            }
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            SyslogLine {
                socket: &self.socket,
                priority: priority(meta.level()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn priorities_use_user_facility() {
            assert_eq!(priority(&Level::ERROR), 11);
            assert_eq!(priority(&Level::WARN), 12);
            assert_eq!(priority(&Level::INFO), 14);
            assert_eq!(priority(&Level::TRACE), 15);
        }

        #[test]
        fn lines_are_framed_with_priority() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("log.sock");
            let server = UnixDatagram::bind(&path).unwrap();
            let writer = SyslogWriter::connect(&path).unwrap();

            let mut line = writer.make_writer();
            line.write_all(b"2024-01-01 00:00:00,000 [INFO] hello\n")
                .unwrap();

            let mut buf = [0u8; 128];
            let n = server.recv(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"<14>2024-01-01 00:00:00,000 [INFO] hello");
        }
    }
}

#[cfg(not(unix))]
mod syslog {
    use std::io;
    use std::path::Path;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Debug, Clone)]
    pub struct SyslogWriter;

    impl SyslogWriter {
        pub fn connect(_path: &Path) -> io::Result<Self> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "syslog sockets are only available on unix",
            ))
        }
    }

    impl<'a> MakeWriter<'a> for SyslogWriter {
        type Writer = io::Sink;

        fn make_writer(&'a self) -> Self::Writer {
            io::sink()
        }
    }
}
