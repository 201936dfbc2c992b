use couchrep_config::Environment;
use std::io::Error;
use std::io::Write;
use std::sync::OnceLock;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field name for replication identification in logs.
const REPLICATION_KEY_IN_LOG: &str = "replication_id";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Log flusher handle for ensuring logs are written before shutdown.
///
/// Production mode returns a [`WorkerGuard`] that must be kept alive to ensure
/// logs are flushed. Development mode doesn't require flushing.
#[must_use]
pub enum LogFlusher {
    /// Production flusher that ensures logs are written to files.
    Flusher(WorkerGuard),
    /// Development flusher that doesn't require explicit flushing.
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment we default to prod, which logs to files.
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}

/// Global replication id storage.
static REPLICATION_ID: OnceLock<String> = OnceLock::new();

/// Sets the global replication id for all tracing events.
///
/// The id is injected into every JSON log entry as a top-level `replication_id` field, on top
/// of the span fields attached by the workers themselves.
pub fn set_global_replication_id(replication_id: String) {
    let _ = REPLICATION_ID.set(replication_id);
}

/// Returns the current global replication id.
pub fn get_global_replication_id() -> Option<&'static str> {
    REPLICATION_ID.get().map(|s| s.as_str())
}

/// Injects `replication_id` into a single JSON log line.
///
/// Returns `None` when the line is not a JSON object or already carries the field.
fn inject_replication_id(line: &str, replication_id: &str) -> Option<String> {
    let serde_json::Value::Object(mut map) = serde_json::from_str::<serde_json::Value>(line).ok()?
    else {
        return None;
    };

    if map.contains_key(REPLICATION_KEY_IN_LOG) {
        return None;
    }

    map.insert(
        REPLICATION_KEY_IN_LOG.to_string(),
        serde_json::Value::String(replication_id.to_string()),
    );

    let modified = serde_json::to_string(&map).ok()?;
    if line.ends_with('\n') {
        Some(format!("{modified}\n"))
    } else {
        Some(modified)
    }
}

/// Writer wrapper that injects the replication id into JSON log entries.
struct ReplicationInjectingWriter<W> {
    inner: W,
}

impl<W> ReplicationInjectingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W> Write for ReplicationInjectingWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(replication_id) = get_global_replication_id() {
            if let Ok(line) = std::str::from_utf8(buf) {
                if let Some(output) = inject_replication_id(line, replication_id) {
                    // The caller only knows about the original buffer.
                    self.inner.write_all(output.as_bytes())?;
                    return Ok(buf.len());
                }
            }
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Initializes tracing for the application.
///
/// Production environments log JSON to rotating files, development to the console.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_replication_id(app_name, None)
}

/// Initializes tracing and tags every JSON log entry with `replication_id`.
pub fn init_tracing_with_replication_id(
    app_name: &str,
    replication_id: Option<String>,
) -> Result<LogFlusher, TracingError> {
    if let Some(replication_id) = replication_id {
        set_global_replication_id(replication_id);
    }

    // Captures records from libraries that log through the `log` crate.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    // Defaults to `info` when `RUST_LOG` is not set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    // The flusher must outlive the application, otherwise buffered logs are lost.
    Ok(log_flusher)
}

/// Configures JSON logging to daily rotating files.
fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let filename_suffix = "log";
    let log_dir = "logs";

    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix(filename_suffix)
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(5)
        .build(log_dir)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || ReplicationInjectingWriter::new(file_appender.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Configures pretty console logging.
fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Routes panics through `tracing` before running the previous panic hook.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injects_replication_id_into_json_lines() {
        let output = inject_replication_id("{\"message\":\"batch done\"}\n", "rep-1").unwrap();

        assert!(output.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(value["replication_id"], "rep-1");
        assert_eq!(value["message"], "batch done");
    }

    #[test]
    fn test_keeps_existing_replication_id() {
        assert!(inject_replication_id("{\"replication_id\":\"other\"}", "rep-1").is_none());
    }

    #[test]
    fn test_ignores_non_json_lines() {
        assert!(inject_replication_id("plain text line", "rep-1").is_none());
        assert!(inject_replication_id("[1, 2, 3]", "rep-1").is_none());
    }

    #[test]
    fn test_writer_passes_through_without_replication_id() {
        let mut writer = ReplicationInjectingWriter::new(Vec::new());
        // The global id is never set in this test binary.
        let written = writer.write(b"{\"message\":\"hello\"}").unwrap();

        assert_eq!(written, 19);
        assert_eq!(writer.inner, b"{\"message\":\"hello\"}");
    }

    #[test]
    fn test_panic_hook_keeps_panic_payload() {
        set_tracing_panic_hook();

        let panic = std::panic::catch_unwind(|| panic!("worker exploded")).unwrap_err();

        assert_eq!(panic.downcast_ref::<&str>(), Some(&"worker exploded"));
    }
}
