//! Temperature loop: acquisition collaborator, PID, actuation output.

use anyhow::{Context, Result, bail};
use std::time::Instant;
use tracing::{debug, info};

use crate::pid::Pid;

/// Name and unit of the channel appended to every reading with the output.
pub const OUTPUT_CHANNEL: &str = "output";
pub const OUTPUT_UNIT: &str = "%";

/// Carrier frequency of the heater/cooler PWM.
pub const PWM_CARRIER_HZ: f64 = 50e3;

/// One acquisition of all input channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    pub names: Vec<String>,
    pub values: Vec<f64>,
    pub units: Vec<String>,
}

impl Readings {
    pub fn push(&mut self, name: &str, value: f64, unit: &str) {
        self.names.push(name.to_string());
        self.values.push(value);
        self.units.push(unit.to_string());
    }
}

/// Hardware side of the loop, provided by the acquisition subsystem.
pub trait Acquisition {
    /// Read every input channel once. The first channel is the controlled
    /// temperature.
    fn read_channels(&mut self) -> Result<Readings>;
    /// Apply an output in percent, `-100..=100`. Last write wins.
    fn write_actuation(&mut self, output: f64) -> Result<()>;
}

/// Output as PWM timing for a bidirectional driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmCommand {
    /// High time per period, seconds.
    pub high: f64,
    /// Low time per period, seconds.
    pub low: f64,
    pub forward: bool,
    pub enabled: bool,
}

impl PwmCommand {
    pub fn from_output(output: f64, carrier_hz: f64) -> Self {
        let period = 1.0 / carrier_hz;
        if output == 0.0 {
            return Self {
                high: 0.0,
                low: period,
                forward: false,
                enabled: false,
            };
        }
        let high = (output.abs() / 100.0).min(1.0) * period;
        Self {
            high,
            low: period - high,
            forward: output > 0.0,
            enabled: true,
        }
    }
}

/// Drives a [`Pid`] from an [`Acquisition`] once per tick.
///
/// Timestamps are milliseconds since the loop was created; integral and
/// derivative times are given in seconds and scaled to match.
pub struct ControlLoop<A> {
    acq: A,
    pid: Pid,
    clock: Instant,
    controlling: bool,
}

impl<A: Acquisition> ControlLoop<A> {
    pub fn new(acq: A, kp: f64, ti_secs: f64, td_secs: f64, guard: f64) -> Self {
        Self {
            acq,
            pid: Pid::new(0.0, kp, ti_secs * 1000.0, td_secs * 1000.0, guard),
            clock: Instant::now(),
            controlling: false,
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    pub fn tick(&mut self) -> Result<Readings> {
        let t = self.now_ms();
        self.tick_at(t)
    }

    /// Read, update the PID when controlling, write the output. Returns the
    /// readings with the output appended as an extra channel.
    pub fn tick_at(&mut self, timestamp_ms: f64) -> Result<Readings> {
        let mut readings = self.acq.read_channels().context("reading channels")?;
        if readings.names.len() != readings.values.len()
            || readings.units.len() != readings.values.len()
        {
            bail!(
                "channel lists disagree: {} names, {} values, {} units",
                readings.names.len(),
                readings.values.len(),
                readings.units.len()
            );
        }
        let feedback = *readings.values.first().context("no input channels")?;

        let output = if self.controlling {
            self.pid.update(feedback, timestamp_ms)
        } else {
            0.0
        };
        self.acq
            .write_actuation(output)
            .context("writing actuation")?;
        debug!(feedback, output, t = timestamp_ms, "control tick");

        readings.push(OUTPUT_CHANNEL, output, OUTPUT_UNIT);
        Ok(readings)
    }

    pub fn is_controlling(&self) -> bool {
        self.controlling
    }

    pub fn set_controlling(&mut self, on: bool) {
        let t = self.now_ms();
        self.set_controlling_at(on, t);
    }

    /// Toggling clears the PID history so the idle gap does not show up as
    /// an integral or derivative kick.
    pub fn set_controlling_at(&mut self, on: bool, timestamp_ms: f64) {
        if on != self.controlling {
            self.pid.clear(timestamp_ms);
            self.controlling = on;
            info!(on, set_point = self.pid.current_set_point(), "temperature control");
        }
    }

    pub fn set_point(&mut self, set_point: f64) {
        self.pid.set_point(set_point);
    }
    pub fn set_kp(&mut self, kp: f64) {
        self.pid.set_kp(kp);
    }
    pub fn set_ti_secs(&mut self, ti: f64) {
        self.pid.set_ti(ti * 1000.0);
    }
    pub fn set_td_secs(&mut self, td: f64) {
        self.pid.set_td(td * 1000.0);
    }
    pub fn set_guard(&mut self, guard: f64) {
        self.pid.set_guard(guard);
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn acquisition(&self) -> &A {
        &self.acq
    }
}
