use crate::LoggingConfig;
use std::sync::{Mutex, Once};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;

static TRACING_INIT: Once = Once::new();

/// Install the global `tracing` subscriber described by `config`.
///
/// Only the first call in a process has an effect. Logs go to stderr when enabled (the test
/// writer in debug builds, so `cargo test` captures them) and are appended to `config.file`
/// when it can be opened.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file_path = config.file.as_ref();
        let file = file_path.and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = file_path.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(std::io::sink);
        if config.stderr {
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(std::io::stderr));
            }
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Mutex::new(file)));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = file_path {
                tracing::warn!(
                    target: "ccm.config",
                    path = %path.display(),
                    "failed to open log file; file logging is disabled"
                );
            }
        }
    });
}
