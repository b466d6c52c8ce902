use std::{
    fs::File,
    io::{self, Write},
    sync::Mutex,
    time::Instant,
};

use chrono::Utc;
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// `LogKind` selects where log lines end up: the console or a logfile.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// Log to stdout, the default choice.
    Stdout,

    /// Log to a file in <tempdir>/mikan-<timestamp>.log
    File,
}

struct Logger {
    sink: Mutex<Box<dyn Write + Send>>,
    start_instant: Instant,
}

impl Logger {
    fn new(kind: LogKind) -> Self {
        let sink: Box<dyn Write + Send> = match kind {
            LogKind::Stdout => Box::new(io::stdout()),
            LogKind::File => {
                let filename = format!("mikan-{}.log", Utc::now().timestamp());
                let path = std::env::temp_dir().join(filename);
                Box::new(File::create(path).unwrap())
            }
        };

        Self {
            sink: Mutex::new(sink),
            start_instant: Instant::now(),
        }
    }

    fn log<T>(&self, data: T)
    where
        T: std::fmt::Display,
    {
        let now = self.start_instant.elapsed();
        let seconds = now.as_secs();
        let hours = seconds / 3600;
        let minutes = (seconds / 60) % 60;
        let seconds = seconds % 60;
        let milliseconds = now.subsec_millis();

        if let Ok(ref mut sink) = self.sink.lock() {
            writeln!(
                sink,
                "[{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}] {data}"
            )
            .ok();
        }
    }
}

/// Install the global logger. Calling this twice keeps the first sink.
pub fn init_logger(kind: LogKind) {
    LOGGER.set(Logger::new(kind)).ok();
}

/// Log a line through the global logger; a no-op until `init_logger` runs.
pub fn log<T>(data: T)
where
    T: std::fmt::Display,
{
    if let Some(logger) = LOGGER.get() {
        logger.log(data);
    }
}
