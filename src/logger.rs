//! Kernel logging.
//!
//! Records from the `log` facade and the `kprint!`/`kprintln!` macros end up
//! in one sink function. The bare-metal backend installs the COM1 writer;
//! without a sink, hosted builds fall back to stderr and bare-metal builds
//! drop the output.

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Destination for formatted kernel output.
pub type Sink = fn(fmt::Arguments);

static SINK: Mutex<Option<Sink>> = Mutex::new(None);

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        _print(format_args!(
            "[{:<5}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Route kernel output to `sink` and register the `log` backend.
///
/// Fails if another logger was registered first; the sink is replaced
/// either way.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    set_sink(sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

pub fn set_sink(sink: Sink) {
    *SINK.lock() = Some(sink);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // Copy the pointer out so the sink runs without the lock held.
    let sink = *SINK.lock();
    match sink {
        Some(sink) => sink(args),
        None => fallback(args),
    }
}

#[cfg(any(test, feature = "std"))]
fn fallback(args: fmt::Arguments) {
    std::eprint!("{}", args);
}

#[cfg(not(any(test, feature = "std")))]
fn fallback(_args: fmt::Arguments) {}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::logger::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}
