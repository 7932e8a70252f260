use crate::errors::CacheError;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, CacheError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(|e| CacheError::Config(format!("log roller: {e}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(CacheError::from)
}

/// Configure process-wide logging.
/// - dir: base directory for logs; if None, current directory.
/// - level: off|error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
/// - enable_trace: also persist `cache_trace!` lines to `trace.log`
///
/// Only the first successful call installs a logger; later calls are ignored.
///
/// # Errors
/// Returns an error if the directory or log files cannot be created.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_trace: bool,
) -> Result<(), CacheError> {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "imgtier", keep)?)));

    if enable_trace {
        builder = builder
            .appender(Appender::builder().build("trace", Box::new(rolling(&base, "trace", keep)?)))
            .logger(
                Logger::builder()
                    .appender("trace")
                    .additive(false)
                    .build("imgtier::trace", LevelFilter::Trace),
            );
    } else {
        builder = builder
            .logger(Logger::builder().additive(false).build("imgtier::trace", LevelFilter::Off));
    }

    let config = builder
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| CacheError::Config(format!("log config: {e}")))?;
    if log4rs::init_config(config).is_err() {
        log::debug!(target: "imgtier::logger", "logger already initialised");
    }
    Ok(())
}

/// Configure logging from environment variables if present:
/// - IMGTIER_LOG_DIR
/// - IMGTIER_LOG_LEVEL
/// - IMGTIER_LOG_RETENTION
/// - IMGTIER_TRACE (1|true|yes)
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), CacheError> {
    let dir = std::env::var("IMGTIER_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("IMGTIER_LOG_LEVEL").ok();
    let retention =
        std::env::var("IMGTIER_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let trace = std::env::var("IMGTIER_TRACE")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging(dir.as_deref(), level.as_deref(), retention, trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("warn")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("nonsense")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }
}
