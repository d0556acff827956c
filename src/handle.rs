use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cli::SerialOpts;
use crate::dispatcher::{Connection, DispatcherConfig, PumpEvent, Shared};
use crate::error::{PumpError, Result};
use crate::port::open_port;
use crate::proto::command::{DeviceState, RateUnit, RequestKind};
use crate::stats::LinkStats;

/// Caller side of a pump connection.
///
/// Requests go into a coalescing mailbox read by the dispatcher thread;
/// state changes and answers come back on [`PumpHandle::events`]. Dropping
/// the handle closes the link.
///
/// Every stop prompt cancels a pending `Run`, including the `:` that follows
/// each set command. Submit `Run` only once the settings have been answered
/// and the pump has prompted again.
pub struct PumpHandle {
    shared: Arc<Shared>,
    events: Receiver<PumpEvent>,
    worker: Option<JoinHandle<Result<LinkStats>>>,
}

impl PumpHandle {
    /// Open the serial port and start dispatching. The syringe target is
    /// queried right away.
    pub fn open(opts: &SerialOpts, config: DispatcherConfig) -> Result<Self> {
        let port = open_port(opts)?;
        let handle = Self::spawn(port, config)?;
        handle.submit(RequestKind::GetTarget);
        Ok(handle)
    }

    /// Start a dispatcher over any byte transport.
    pub fn spawn<T>(link: T, config: DispatcherConfig) -> Result<Self>
    where
        T: Read + Write + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel();
        let mut conn = Connection::new(link, shared.clone(), tx, config);
        conn.open();
        let worker = thread::Builder::new()
            .name("pump-dispatch".into())
            .spawn(move || conn.run())?;
        Ok(Self {
            shared,
            events: rx,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, req: RequestKind) {
        debug!(?req, "submit");
        self.shared.queue.lock().submit(req);
    }

    /// Send diameter, rate and target, then read them back.
    ///
    /// A `Run` submitted before the three read-back answers arrive is
    /// cancelled by the prompts of the set commands.
    pub fn configure(&self, diameter: f64, rate: f64, unit: RateUnit, target: f64) {
        let mut queue = self.shared.queue.lock();
        queue.submit(RequestKind::SetDiameter(diameter));
        queue.submit(RequestKind::SetRate(rate, unit));
        queue.submit(RequestKind::SetTarget(target));
        queue.submit(RequestKind::GetDiameter);
        queue.submit(RequestKind::GetRate);
        queue.submit(RequestKind::GetTarget);
    }

    pub fn state(&self) -> DeviceState {
        *self.shared.state.lock()
    }

    pub fn events(&self) -> &Receiver<PumpEvent> {
        &self.events
    }

    /// Wait until `f` accepts an event. `None` on timeout or when the
    /// dispatcher has stopped.
    pub fn wait_for<R>(
        &self,
        timeout: Duration,
        mut f: impl FnMut(&PumpEvent) -> Option<R>,
    ) -> Option<R> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(ev) => {
                    if let Some(r) = f(&ev) {
                        return Some(r);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Stop the dispatcher and release the port. Returns the link counters,
    /// or the transport error that ended the link earlier.
    pub fn close(mut self) -> Result<LinkStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<LinkStats> {
        self.shared.shutdown.store(true, Ordering::Release);
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| PumpError::WorkerPanicked)?,
            None => Ok(LinkStats::new()),
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::command::Answer;
    use crate::sim::SimPump;

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            reply_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
            stats_interval: Duration::from_secs(3600),
        }
    }

    fn wait_state(h: &PumpHandle, want: DeviceState) -> bool {
        h.wait_for(WAIT, |ev| (*ev == PumpEvent::State(want)).then_some(()))
            .is_some()
    }

    #[test]
    fn configure_then_read_back() {
        let pump = SimPump::new();
        let h = PumpHandle::spawn(pump.clone(), config()).unwrap();
        assert_eq!(h.state(), DeviceState::Stopped);

        h.configure(4.78, 120.0, RateUnit::UlPerHour, 0.5);
        let mut got = Vec::new();
        h.wait_for(WAIT, |ev| {
            if let PumpEvent::Answer(a) = ev {
                got.push(*a);
            }
            (got.len() == 3).then_some(())
        })
        .unwrap();
        assert_eq!(
            got,
            vec![
                Answer::Diameter(4.78),
                Answer::Rate(120.0, RateUnit::UlPerHour),
                Answer::Target(0.5),
            ]
        );
        assert_eq!(
            pump.commands(),
            ["MMD4.78000", "ULH120.00000", "MLT0.50000", "DIA", "RAT", "TAR"]
        );
        h.close().unwrap();
    }

    #[test]
    fn run_after_configure_read_back() {
        let pump = SimPump::new();
        let h = PumpHandle::spawn(pump.clone(), config()).unwrap();
        h.configure(4.78, 2.0, RateUnit::MlPerMin, 1.0);
        let target = h.wait_for(WAIT, |ev| match ev {
            PumpEvent::Answer(Answer::Target(t)) => Some(*t),
            _ => None,
        });
        assert_eq!(target, Some(1.0));
        // the prompt after the last answer must land first
        thread::sleep(Duration::from_millis(50));

        h.submit(RequestKind::Run);
        assert!(wait_state(&h, DeviceState::Forward));
        assert_eq!(
            pump.commands(),
            ["MMD4.78000", "MLM2.00000", "MLT1.00000", "DIA", "RAT", "TAR", "RUN"]
        );
        h.close().unwrap();
    }

    #[test]
    fn run_stall_and_rerun() {
        let pump = SimPump::new();
        let h = PumpHandle::spawn(pump.clone(), config()).unwrap();
        h.submit(RequestKind::Run);
        assert!(wait_state(&h, DeviceState::Forward));

        // keep-alive polls pick up the stall
        pump.stall();
        assert!(wait_state(&h, DeviceState::Stalled));

        h.submit(RequestKind::Run);
        assert!(wait_state(&h, DeviceState::Forward));
        h.submit(RequestKind::Stop);
        assert!(wait_state(&h, DeviceState::Stopped));

        let stats = h.close().unwrap();
        assert!(stats.polls > 0);
        assert_eq!(pump.commands().iter().filter(|c| c.as_str() == "RUN").count(), 2);
    }

    #[test]
    fn unplug_surfaces_transport_error() {
        let pump = SimPump::new();
        let h = PumpHandle::spawn(pump.clone(), config()).unwrap();
        pump.unplug();
        assert!(wait_state(&h, DeviceState::Disconnected));
        assert_eq!(h.state(), DeviceState::Disconnected);
        assert!(matches!(h.close(), Err(PumpError::Transport(_))));
    }

    #[test]
    fn close_disconnects() {
        let pump = SimPump::new();
        let h = PumpHandle::spawn(pump, config()).unwrap();
        let shared = h.shared.clone();
        h.close().unwrap();
        assert_eq!(*shared.state.lock(), DeviceState::Disconnected);
    }
}
