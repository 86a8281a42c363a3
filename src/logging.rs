use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::fmt;

static SUBSCRIBER_ACTIVE: AtomicBool = AtomicBool::new(false);

pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    SUBSCRIBER_ACTIVE.store(true, Ordering::SeqCst);
    Ok(())
}

fn subscriber_active() -> bool {
    SUBSCRIBER_ACTIVE.load(Ordering::SeqCst)
}

/// Progress lines shown to the person running the pipeline.
///
/// Every line is also emitted as a tracing event. `echoing` prints lines to
/// stderr as they happen unless `init` already routed tracing there.
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
    echo: bool,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoing() -> Self {
        Self {
            lines: Vec::new(),
            echo: !subscriber_active(),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push(message);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    fn push(&mut self, message: String) {
        if self.echo {
            eprintln!("{}", message);
        }
        self.lines.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_recorded_in_order() {
        let mut log = RunLog::new();
        log.info("Sending text to AI...");
        log.error("Failed to extract JSON from AI response!");
        assert_eq!(
            log.lines(),
            ["Sending text to AI...", "Failed to extract JSON from AI response!"]
        );
        assert!(log.contains("extract JSON"));
    }

    #[test]
    fn verbose_subscriber_turns_off_the_echo() {
        init(false).unwrap();
        init(true).unwrap();
        assert!(subscriber_active());
        assert!(!RunLog::echoing().echo);
    }
}
