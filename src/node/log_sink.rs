//! Rotating log files for node and wallet backend output
//!
//! Each managed process writes its stdout/stderr into its own size-capped
//! file set, separate from the supervisor's own log.

use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::Append;
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Size at which a process log is rolled (5 MB)
pub const SINK_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Total number of files per process log, active file included
pub const SINK_MAX_FILES: u32 = 4;

/// Size-capped, rotating log file for one managed process
#[derive(Debug)]
pub struct LogSink {
    name: String,
    path: PathBuf,
    appender: RollingFileAppender,
    closed: AtomicBool,
}

impl LogSink {
    /// Open `{dir}/{name}`, rolling into `{name}.1` .. `{name}.3`
    pub fn open(dir: &Path, name: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(name);
        let pattern = dir.join(format!("{}.{{}}", name));
        let pattern = pattern
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Log path is not valid UTF-8: {}", dir.display()))?;

        let roller = FixedWindowRoller::builder()
            .base(1)
            .build(pattern, SINK_MAX_FILES - 1)?;
        let trigger = SizeTrigger::new(SINK_MAX_SIZE);
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

        let appender = RollingFileAppender::builder()
            .append(true)
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .build(&path, Box::new(policy))?;

        Ok(Self {
            name: name.to_string(),
            path,
            appender,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line of process output
    pub fn write_line(&self, line: &str) {
        if self.is_closed() {
            return;
        }
        let result = self.appender.append(
            &log::Record::builder()
                .args(format_args!("{}", line))
                .target(&self.name)
                .build(),
        );
        if let Err(e) = result {
            log::warn!("Failed to write to {} log: {}", self.name, e);
        }
    }

    /// Flush and stop accepting writes
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.appender.flush();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
