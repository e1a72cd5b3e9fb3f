//! Logger setup with a running count of emitted warnings
//!
//! `validate` reports how many warnings a load produced, so every record at
//! `Warn` or above is counted even when the display filter hides it.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

static WARNINGS: AtomicUsize = AtomicUsize::new(0);
static ERRORS: AtomicUsize = AtomicUsize::new(0);

struct CountingLogger {
    inner: env_logger::Logger,
}

impl Log for CountingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Warn || self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        match record.level() {
            Level::Error => {
                ERRORS.fetch_add(1, Ordering::Relaxed);
            }
            Level::Warn => {
                WARNINGS.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if self.inner.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger; `RUST_LOG` overrides `default_level`
pub fn init(default_level: LevelFilter) {
    let inner = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level.as_str()),
    )
    .build();
    let max_level = inner.filter().max(LevelFilter::Warn);

    if log::set_boxed_logger(Box::new(CountingLogger { inner })).is_ok() {
        log::set_max_level(max_level);
    }
}

/// Warnings and errors logged since startup
pub fn counts() -> (usize, usize) {
    (
        WARNINGS.load(Ordering::Relaxed),
        ERRORS.load(Ordering::Relaxed),
    )
}
