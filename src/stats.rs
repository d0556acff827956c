use std::time::{Duration, Instant};

use tracing::info;

/// Counters for one pump connection.
#[derive(Debug, Clone)]
pub struct LinkStats {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub packets: u64,
    pub status_events: u64,
    pub commands: u64,
    pub polls: u64,
    pub decode_errors: u64,
    pub timeouts: u64,
    t0: Instant,
    last: Instant,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            bytes_rx: 0,
            bytes_tx: 0,
            packets: 0,
            status_events: 0,
            commands: 0,
            polls: 0,
            decode_errors: 0,
            timeouts: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }
    pub fn add_rx(&mut self, n: usize) {
        self.bytes_rx += n as u64;
    }
    pub fn add_tx(&mut self, n: usize) {
        self.bytes_tx += n as u64;
    }
    pub fn inc_packets(&mut self) {
        self.packets += 1;
    }
    pub fn inc_status(&mut self) {
        self.status_events += 1;
    }
    pub fn inc_commands(&mut self) {
        self.commands += 1;
    }
    pub fn inc_polls(&mut self) {
        self.polls += 1;
    }
    pub fn inc_decode_errors(&mut self) {
        self.decode_errors += 1;
    }
    pub fn inc_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn uptime(&self) -> Duration {
        self.t0.elapsed()
    }

    pub fn maybe_log(&mut self, interval: Duration) {
        if self.last.elapsed() >= interval {
            self.log();
            self.last = Instant::now();
        }
    }

    pub fn log(&self) {
        info!(
            rx = self.bytes_rx,
            tx = self.bytes_tx,
            packets = self.packets,
            status = self.status_events,
            commands = self.commands,
            polls = self.polls,
            decode_errors = self.decode_errors,
            timeouts = self.timeouts,
            "link stats over {:.1}s",
            self.uptime().as_secs_f64()
        );
    }
}
