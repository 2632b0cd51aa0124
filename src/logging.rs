//! Logging configuration for the node supervisor
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stdout output
//! 2. RollingFileAppender - supervisor log files with rotation
//!
//! Output of the managed node and wallet backend does not go through the
//! global logger; see [`crate::node::log_sink`].

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

/// Size at which the supervisor log file is rolled (20 MB)
const LOG_FILE_MAX_SIZE: u64 = 20 * 1024 * 1024;

/// Number of rolled supervisor log files kept
const LOG_FILE_MAX_COUNT: u32 = 10;

/// Build the log4rs config without installing it
fn build_config(log_dir: &Path, level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    std::fs::create_dir_all(log_dir)?;

    let log_file = log_dir.join("supervisor.1.log");
    let log_pattern = log_dir.join("supervisor.{}.log");
    let log_pattern = log_pattern
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Log directory is not valid UTF-8: {}", log_dir.display()))?;

    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(log_pattern, LOG_FILE_MAX_COUNT)?;
    let trigger = SizeTrigger::new(LOG_FILE_MAX_SIZE);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_file, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )?;

    Ok(config)
}

/// Initialize log4rs with console and rolling file appenders
///
/// # Arguments
/// * `log_dir` - Directory for log files
///
/// # Log File Configuration
/// - File: `{log_dir}/supervisor.1.log`
/// - Max size: 20 MB per file
/// - Max count: 10 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(log_dir: PathBuf) -> anyhow::Result<log4rs::Handle> {
    let config = build_config(&log_dir, LevelFilter::Info)?;
    Ok(log4rs::init_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let config = build_config(&log_dir, LevelFilter::Debug).unwrap();

        assert!(log_dir.is_dir());
        assert_eq!(config.appenders().len(), 2);
        assert_eq!(config.root().level(), LevelFilter::Debug);
    }
}
