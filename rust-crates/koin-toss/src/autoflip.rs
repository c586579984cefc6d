//! Repeating the current selection a fixed number of times.
use tracing::{
    debug,
    info,
};

use crate::bet::{
    FlipError,
    Remediation,
};

pub const MAX_AUTO_FLIPS: u32 = 100;
/// Consecutive session-reset retries before a run gives up.
pub const MAX_AUTO_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoFlip {
    enabled: bool,
    count: u32,
    running: bool,
    /// Flips left to submit after the one in flight.
    remaining: u32,
    flips: u32,
    retries: u32,
    consecutive_retries: u32,
    due: bool,
}

impl Default for AutoFlip {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 1,
            running: false,
            remaining: 0,
            flips: 0,
            retries: 0,
            consecutive_retries: 0,
            due: false,
        }
    }
}

impl AutoFlip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Flips of the current (or last) run submitted so far.
    pub fn flips(&self) -> u32 {
        self.flips
    }

    /// Session-reset retries in the current (or last) run.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
        if !self.enabled {
            self.stop();
        }
    }

    /// Ignored while a run is in progress.
    pub fn set_count(&mut self, count: u32) {
        if !self.running {
            self.count = count.clamp(1, MAX_AUTO_FLIPS);
        }
    }

    pub fn submitted(&mut self) {
        if !self.enabled {
            return;
        }
        self.consecutive_retries = 0;
        if !self.running {
            self.running = true;
            self.remaining = self.count - 1;
            self.flips = 1;
            self.retries = 0;
            info!(count = self.count, "auto flip started");
        } else {
            self.remaining = self.remaining.saturating_sub(1);
            self.flips += 1;
        }
    }

    pub fn resolved(&mut self) {
        if !self.running {
            return;
        }
        if self.remaining > 0 {
            self.due = true;
        } else {
            info!(count = self.count, retries = self.retries, "auto flip finished");
            self.running = false;
        }
    }

    /// A failure that asks for a session reset is retried; anything else ends the run.
    pub fn failed(&mut self, error: &FlipError) {
        if !self.running {
            return;
        }
        match error {
            FlipError::Failed(err)
                if err.remediation() == Remediation::ClearSession
                    && self.consecutive_retries < MAX_AUTO_RETRIES =>
            {
                self.retries += 1;
                self.consecutive_retries += 1;
                self.due = true;
                debug!(retries = self.retries, "auto flip retry queued");
            }
            _ => {
                info!(%error, "auto flip stopped");
                self.stop();
            }
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.remaining = 0;
        self.consecutive_retries = 0;
        self.due = false;
    }

    /// Whether the next flip of the run should be submitted now. Clears the flag.
    pub fn take_due(&mut self) -> bool {
        std::mem::take(&mut self.due)
    }
}
