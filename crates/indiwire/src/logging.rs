use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Target prefix shared by every workspace crate. Events from these follow
/// `--log-level`; everything else (tokio and friends) is capped at `warn`.
const OWN_TARGET: &str = "indiwire";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// `peer=3 device="CCD Simulator" ...` lines.
    Text,
    /// One JSON object per event, fields at the top level.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn log_targets(level: LogLevel) -> Targets {
    let own = level.as_filter();
    Targets::new()
        .with_target(OWN_TARGET, own)
        .with_default(own.min(LevelFilter::WARN))
}

/// Log to stderr so stdout stays machine-readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let targets = log_targets(level);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::TRACE)
        .with_ansi(false);

    match format {
        LogFormat::Text => {
            let _ = builder.finish().with(targets).try_init();
        }
        LogFormat::Json => {
            let _ = builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish()
                .with(targets)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn level_applies_to_indiwire_crates_only() {
        let targets = log_targets(LogLevel::Debug);
        assert!(targets.would_enable("indiwire_router::router", &Level::DEBUG));
        assert!(targets.would_enable("indiwire_message::decoder", &Level::DEBUG));
        assert!(!targets.would_enable("indiwire_message::decoder", &Level::TRACE));
        assert!(!targets.would_enable("tokio_util::codec", &Level::DEBUG));
        assert!(targets.would_enable("tokio_util::codec", &Level::WARN));
    }

    #[test]
    fn quiet_levels_also_quiet_dependencies() {
        let targets = log_targets(LogLevel::Error);
        assert!(!targets.would_enable("indiwire_client::client", &Level::WARN));
        assert!(!targets.would_enable("tokio", &Level::WARN));
        assert!(targets.would_enable("tokio", &Level::ERROR));
    }
}
