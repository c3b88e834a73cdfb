use std::io::{self, Write};
use std::sync::Mutex;

use serde::Serialize;

use crate::graph::GraphSummary;
use crate::request::ConstructionRequest;
use crate::retrieval::{ClearResult, ListResult, ProgressEvent, ProgressSink};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_request(request: &ConstructionRequest) -> io::Result<()> {
        Self::print_json(request)
    }

    pub fn print_summary(summary: &GraphSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress on stderr. Level 0 is silent, level 1 prints the first event of
/// each phase, level 2 and above print every event.
pub struct ConsoleProgress {
    verbose: u8,
    last_phase: Mutex<Option<String>>,
}

impl ConsoleProgress {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            last_phase: Mutex::new(None),
        }
    }

    fn should_print(&self, event: &ProgressEvent) -> bool {
        match self.verbose {
            0 => false,
            1 => {
                let mut last = self
                    .last_phase
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let phase = event.phase().map(str::to_string);
                if *last == phase {
                    false
                } else {
                    *last = phase;
                    true
                }
            }
            _ => true,
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        if !self.should_print(&event) {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stderr, "{} ({:.2?})", event.message, elapsed),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_one_prints_phase_changes_only() {
        let progress = ConsoleProgress::new(1);
        assert!(progress.should_print(&ProgressEvent::new("phase=Fetch; a")));
        assert!(!progress.should_print(&ProgressEvent::new("phase=Fetch; b")));
        assert!(progress.should_print(&ProgressEvent::new("phase=Store; c")));
        assert!(!ConsoleProgress::new(0).should_print(&ProgressEvent::new("phase=Fetch; a")));
        assert!(ConsoleProgress::new(2).should_print(&ProgressEvent::new("phase=Fetch; a")));
    }
}
