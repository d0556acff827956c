//! Discrete PID with trapezoidal integration and back-calculation anti-windup.
//!
//! Timestamps are unit-agnostic but `ti` and `td` must use the same unit
//! (the control loop feeds milliseconds).

/// PID controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    set_point: f64,
    kp: f64,
    ti: f64,
    td: f64,
    guard: f64,
    last_timestamp: f64,
    last_error: f64,
    last_integral: f64,
}

impl Pid {
    /// Set point starts at zero. `guard` is the symmetric output clamp.
    pub fn new(timestamp: f64, kp: f64, ti: f64, td: f64, guard: f64) -> Self {
        Self {
            set_point: 0.0,
            kp,
            ti,
            td,
            guard: guard.abs(),
            last_timestamp: timestamp,
            last_error: 0.0,
            last_integral: 0.0,
        }
    }

    pub fn with_set_point(mut self, set_point: f64) -> Self {
        self.set_point = set_point;
        self
    }

    /// Compute the output for one control tick.
    ///
    /// `ti == 0` disables integral action and a zero interval suppresses the
    /// derivative term. On saturation the stored integral is recomputed so
    /// that `kp * (p + i + d)` equals the clamped output.
    pub fn update(&mut self, feedback: f64, timestamp: f64) -> f64 {
        let error = self.set_point - feedback;
        let delta_time = timestamp - self.last_timestamp;

        let p = error;

        let mut i = if self.ti != 0.0 {
            self.last_integral + (error + self.last_error) * delta_time / (2.0 * self.ti)
        } else {
            0.0
        };

        let d = if delta_time != 0.0 {
            (error - self.last_error) * self.td / delta_time
        } else {
            0.0
        };

        let mut output = self.kp * (p + i + d);
        if output.abs() > self.guard {
            output = self.guard.copysign(output);
            // kp == 0 yields a zero output, which never exceeds a non-negative guard
            if self.kp != 0.0 {
                i = output / self.kp - (p + d);
            }
        }

        self.last_timestamp = timestamp;
        self.last_error = error;
        self.last_integral = i;

        output
    }

    /// Forget accumulated error, e.g. when control is toggled.
    pub fn clear(&mut self, timestamp: f64) {
        self.last_timestamp = timestamp;
        self.last_error = 0.0;
        self.last_integral = 0.0;
    }

    pub fn set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }
    pub fn set_kp(&mut self, kp: f64) {
        self.kp = kp;
    }
    pub fn set_ti(&mut self, ti: f64) {
        self.ti = ti;
    }
    pub fn set_td(&mut self, td: f64) {
        self.td = td;
    }
    pub fn set_guard(&mut self, guard: f64) {
        self.guard = guard.abs();
    }

    pub fn current_set_point(&self) -> f64 {
        self.set_point
    }
    pub fn kp(&self) -> f64 {
        self.kp
    }
    pub fn ti(&self) -> f64 {
        self.ti
    }
    pub fn td(&self) -> f64 {
        self.td
    }
    pub fn guard(&self) -> f64 {
        self.guard
    }
    pub fn last_integral(&self) -> f64 {
        self.last_integral
    }
    pub fn last_error(&self) -> f64 {
        self.last_error
    }
}
