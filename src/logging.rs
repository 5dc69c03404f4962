use log::{Level, LevelFilter, Log, Metadata, Record};

/// Level-colored logger writing to stderr, so diagnostics never mix into
/// the simulation output on stdout
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // red
            Level::Warn => 93,  // bright yellow
            Level::Info => 34,  // blue
            Level::Debug => 32, // green
            Level::Trace => 90, // gray
        };
        eprintln!(
            "\u{1B}[{}m[{:>5}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Install the logger; the `LOG` environment variable picks the level
/// (defaults to warnings and errors only)
pub fn init() {
    // A second init keeps the first logger
    let _ = log::set_logger(&LOGGER);
    let level = match std::env::var("LOG").as_deref() {
        Ok("ERROR") => LevelFilter::Error,
        Ok("WARN") => LevelFilter::Warn,
        Ok("INFO") => LevelFilter::Info,
        Ok("DEBUG") => LevelFilter::Debug,
        Ok("TRACE") => LevelFilter::Trace,
        Ok("OFF") => LevelFilter::Off,
        _ => LevelFilter::Warn,
    };
    log::set_max_level(level);
}
