//! Tracing setup.
//!
//! The dispatcher keeps the terminal in raw mode, where a bare `\n` does not
//! return the cursor, so log lines are written to stderr with `\r\n` endings.

use std::io;
use std::io::Write;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Build the level filter from the configured default and per-target overrides.
pub fn filter(config: &LoggingConfig) -> Targets {
    Targets::new()
        .with_default(LevelFilter::from(config.level))
        .with_targets(
            config
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        )
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(|| CrlfWriter::new(io::stderr())))
        .with(filter(config))
        .try_init()?;
    Ok(())
}

/// Writer that expands `\n` to `\r\n`
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
