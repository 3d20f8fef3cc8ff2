//! The library's own diagnostics.
//!
//! Trouble inside the logging pipeline (broken sockets, discarded
//! messages, malformed control frames) is reported through `tracing`
//! events with the `mct` target. When `MCT_LOG_MODE` is set, library init
//! installs a minimal fmt subscriber honoring `MCT_LOG_LEVEL` and
//! `MCT_LOG_FILENAME`; otherwise whatever subscriber the host application
//! installed sees the events.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use crate::config::{Config, DiagTarget};

struct FileWriter(Mutex<std::fs::File>);

impl io::Write for &FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FileWriter {
    type Writer = &'a FileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Installs the diagnostics subscriber selected by the environment.
///
/// Does nothing when `MCT_LOG_MODE` is unset or when the application
/// already installed a global subscriber.
pub(crate) fn init(config: &Config) {
    let Some(target) = config.diag_target.clone() else {
        return;
    };
    let level = config.diag_level.unwrap_or(tracing::Level::WARN);

    let result = match target {
        DiagTarget::Off => tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::OFF)
            .try_init(),
        DiagTarget::Stdout => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stdout)
            .try_init(),
        DiagTarget::Stderr => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stderr)
            .try_init(),
        DiagTarget::File(path) => match open_log_file(&path) {
            Ok(file) => tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(FileWriter(Mutex::new(file)))
                .try_init(),
            Err(error) => {
                eprintln!("mct: cannot open log file {}: {}", path.display(), error);
                return;
            }
        },
    };
    // a subscriber installed by the application wins silently
    let _ = result;
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}
