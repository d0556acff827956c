use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::proto::command::{Answer, DeviceState, RequestKind, StateEvent, StatusMarker};
use crate::proto::framer::{FrameEvent, Framer};
use crate::proto::parser::{DecodeError, KEEP_ALIVE, decode_answer, format_request};
use crate::queue::RequestQueue;
use crate::stats::LinkStats;

/// Delivered to the caller from the dispatcher thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    State(DeviceState),
    Answer(Answer),
    /// A query was answered with something that does not parse. The
    /// connection stays open; resubmitting is up to the caller.
    DecodeFailed {
        request: RequestKind,
        error: DecodeError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// How long to wait for the pump's prompt after a transmission.
    pub reply_timeout: Duration,
    /// Minimum spacing of idle polls while the pump runs.
    pub poll_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// State shared between the dispatcher thread and its handle.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) queue: Mutex<RequestQueue>,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) shutdown: AtomicBool,
}

/// One open pump link. Owns the transport, the packet buffer and the device
/// state; runs on its own thread and is the only writer of all three.
pub struct Connection<T> {
    link: T,
    framer: Framer,
    state: DeviceState,
    /// Request whose answer the next completed packet belongs to.
    awaiting: Option<RequestKind>,
    /// Set while an exchange is open, cleared by the pump's prompt.
    sent_at: Option<Instant>,
    last_poll: Option<Instant>,
    shared: Arc<Shared>,
    events: Sender<PumpEvent>,
    stats: LinkStats,
    config: DispatcherConfig,
    rx_buf: [u8; 256],
}

impl<T: Read + Write> Connection<T> {
    pub(crate) fn new(
        link: T,
        shared: Arc<Shared>,
        events: Sender<PumpEvent>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            link,
            framer: Framer::new(),
            state: DeviceState::Disconnected,
            awaiting: None,
            sent_at: None,
            last_poll: None,
            shared,
            events,
            stats: LinkStats::new(),
            config,
            rx_buf: [0; 256],
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn in_packet(&self) -> bool {
        self.framer.in_packet()
    }

    pub fn open(&mut self) {
        self.apply(StateEvent::Open);
    }

    /// Dispatch until shutdown or a transport failure. The transport is
    /// dropped on return either way.
    pub fn run(mut self) -> Result<LinkStats> {
        info!("dispatcher started");
        let result = loop {
            if self.shared.shutdown.load(Ordering::Acquire) || !self.state.is_connected() {
                break Ok(());
            }
            if let Err(e) = self.step() {
                warn!("link failed: {}", e);
                break Err(e);
            }
            self.stats.maybe_log(self.config.stats_interval);
        };

        // in-flight packet and pending requests are discarded, not flushed
        self.framer.reset();
        self.awaiting = None;
        self.shared.queue.lock().clear();
        self.apply(StateEvent::Close);
        self.stats.log();
        info!("dispatcher stopped");
        match result {
            Ok(()) => Ok(self.stats),
            Err(e) => Err(e),
        }
    }

    /// One iteration: drain input, expire a silent exchange, then transmit
    /// if no packet is being assembled.
    pub fn step(&mut self) -> Result<()> {
        self.poll_link()?;
        self.expire_reply();
        if !self.framer.in_packet() {
            self.transmit_next()?;
        }
        Ok(())
    }

    fn poll_link(&mut self) -> Result<()> {
        loop {
            let n = match self.link.read(&mut self.rx_buf) {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Ok(());
            }
            self.stats.add_rx(n);
            let events = self.framer.push(&self.rx_buf[..n]);
            for ev in events {
                self.handle_frame(ev);
            }
            if n < self.rx_buf.len() {
                return Ok(());
            }
        }
    }

    fn handle_frame(&mut self, ev: FrameEvent) {
        match ev {
            FrameEvent::Status(marker) => self.handle_status(marker),
            FrameEvent::Packet(bytes) => {
                self.stats.inc_packets();
                match self.awaiting.take() {
                    Some(req) if req.is_query() => self.correlate(req, &bytes),
                    Some(req) => {
                        debug!(?req, "ignoring packet {:?}", String::from_utf8_lossy(&bytes))
                    }
                    None => debug!("unsolicited packet {:?}", String::from_utf8_lossy(&bytes)),
                }
            }
        }
    }

    fn handle_status(&mut self, marker: StatusMarker) {
        self.stats.inc_status();
        if marker.cancels_motion() {
            self.shared.queue.lock().clear_motion();
        }
        // the prompt closes whatever exchange was open
        if let Some(req) = self.awaiting.take() {
            debug!(?req, ?marker, "exchange closed by prompt");
        }
        self.sent_at = None;
        self.apply(StateEvent::Marker(marker));
    }

    fn correlate(&mut self, req: RequestKind, packet: &[u8]) {
        match decode_answer(&req, packet) {
            Ok(answer) => {
                debug!(?req, ?answer, "answer");
                self.emit(PumpEvent::Answer(answer));
            }
            Err(error) => {
                warn!(
                    ?req,
                    "dropping answer {:?}: {}",
                    String::from_utf8_lossy(packet),
                    error
                );
                self.stats.inc_decode_errors();
                self.emit(PumpEvent::DecodeFailed {
                    request: req,
                    error,
                });
            }
        }
    }

    fn expire_reply(&mut self) {
        if let Some(sent) = self.sent_at
            && sent.elapsed() >= self.config.reply_timeout
        {
            warn!(request = ?self.awaiting, "no reply from pump");
            self.stats.inc_timeouts();
            self.awaiting = None;
            self.sent_at = None;
            self.framer.reset();
        }
    }

    fn transmit_next(&mut self) -> Result<()> {
        if self.sent_at.is_some() {
            return Ok(());
        }
        let next = self.shared.queue.lock().next(self.state);
        let now = Instant::now();
        if let Some(req) = next {
            let line = format_request(&req);
            debug!(?req, "tx {:?}", line);
            self.write(line.as_bytes())?;
            self.stats.inc_commands();
            self.awaiting = Some(req);
            self.sent_at = Some(now);
        } else if self.state == DeviceState::Forward
            && self
                .last_poll
                .is_none_or(|t| t.elapsed() >= self.config.poll_interval)
        {
            self.write(KEEP_ALIVE)?;
            self.stats.inc_polls();
            self.last_poll = Some(now);
            self.sent_at = Some(now);
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.write_all(bytes)?;
        self.link.flush()?;
        self.stats.add_tx(bytes.len());
        Ok(())
    }

    fn apply(&mut self, event: StateEvent) {
        let next = self.state.transition(event);
        if next != self.state {
            info!(from = ?self.state, to = ?next, "pump state");
            self.state = next;
            *self.shared.state.lock() = next;
            self.emit(PumpEvent::State(next));
        }
    }

    fn emit(&self, ev: PumpEvent) {
        // receiver may be gone; the link keeps running until closed
        let _ = self.events.send(ev);
    }
}
