//! In-memory pump speaking the wire protocol, for dispatcher tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::proto::command::RateUnit;
use crate::proto::parser::unit_to_str;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motor {
    Stopped,
    Running,
    Stalled,
}

#[derive(Debug)]
struct SimState {
    rx: VecDeque<u8>,
    line: Vec<u8>,
    commands: Vec<String>,
    motor: Motor,
    diameter: f64,
    rate: f64,
    unit: RateUnit,
    target: f64,
    unplugged: bool,
}

impl SimState {
    fn prompt(&mut self) {
        self.rx.push_back(match self.motor {
            Motor::Stopped => b':',
            Motor::Running => b'>',
            Motor::Stalled => b'*',
        });
    }

    fn answer(&mut self, body: String) {
        self.rx.push_back(b'\n');
        self.rx.extend(body.into_bytes());
        self.rx.push_back(b'\r');
    }

    fn execute(&mut self, cmd: &str) {
        let value = |prefix: &str| cmd[prefix.len()..].parse::<f64>().unwrap_or(0.0);
        match cmd {
            "" => {}
            "RUN" => self.motor = Motor::Running,
            "STP" => self.motor = Motor::Stopped,
            "DIA" => self.answer(format!("{:.5}", self.diameter)),
            "RAT" => self.answer(format!("{:.5} 9 {}", self.rate, unit_to_str(self.unit))),
            "TAR" => self.answer(format!("{:.5}", self.target)),
            c if c.starts_with("MMD") => self.diameter = value("MMD"),
            c if c.starts_with("MLT") => self.target = value("MLT"),
            c => {
                let unit = match &c[..3.min(c.len())] {
                    "MLM" => Some(RateUnit::MlPerMin),
                    "ULM" => Some(RateUnit::UlPerMin),
                    "MLH" => Some(RateUnit::MlPerHour),
                    "ULH" => Some(RateUnit::UlPerHour),
                    _ => None,
                };
                if let Some(u) = unit {
                    self.unit = u;
                    self.rate = value("MLM");
                }
            }
        }
        if !cmd.is_empty() {
            self.commands.push(cmd.to_string());
        }
        self.prompt();
    }
}

/// Cloneable handle; the dispatcher owns one clone as its transport, the
/// test keeps another to inspect and disturb the pump.
#[derive(Debug, Clone)]
pub(crate) struct SimPump {
    inner: Arc<Mutex<SimState>>,
}

impl SimPump {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                rx: VecDeque::new(),
                line: Vec::new(),
                commands: Vec::new(),
                motor: Motor::Stopped,
                diameter: 0.0,
                rate: 0.0,
                unit: RateUnit::MlPerMin,
                target: 0.0,
                unplugged: false,
            })),
        }
    }

    /// Commands received so far, without the trailing `\r`.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.inner.lock().commands.clone()
    }

    pub(crate) fn stall(&self) {
        let mut s = self.inner.lock();
        s.motor = Motor::Stalled;
        s.prompt();
    }

    pub(crate) fn unplug(&self) {
        self.inner.lock().unplugged = true;
    }
}

impl Read for SimPump {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.inner.lock();
        if s.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if s.rx.is_empty() {
            drop(s);
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"));
        }
        let n = buf.len().min(s.rx.len());
        for (slot, b) in buf.iter_mut().zip(s.rx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for SimPump {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut s = self.inner.lock();
        if s.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        for &b in buf {
            if b == b'\r' {
                let line = String::from_utf8_lossy(&std::mem::take(&mut s.line)).into_owned();
                s.execute(&line);
            } else {
                s.line.push(b);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
