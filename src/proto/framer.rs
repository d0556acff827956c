use super::command::StatusMarker;

pub const PACKET_START: u8 = b'\n';
pub const PACKET_END: u8 = b'\r';

/// What the framer found in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Asynchronous status marker. Any packet being assembled is dropped.
    Status(StatusMarker),
    /// Bytes between `\n` and `\r`, markers excluded.
    Packet(Vec<u8>),
}

/// Splits the pump's byte stream into status markers and answer packets.
///
/// Status markers win over packet content: they may arrive mid-packet and
/// always abort the packet being assembled. A `\n` restarts assembly, so a
/// truncated packet is silently dropped.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    in_packet: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
            in_packet: false,
        }
    }

    pub fn in_packet(&self) -> bool {
        self.in_packet
    }

    /// Feed one byte.
    pub fn push_byte(&mut self, b: u8) -> Option<FrameEvent> {
        if let Some(marker) = StatusMarker::from_byte(b) {
            self.reset();
            return Some(FrameEvent::Status(marker));
        }
        match b {
            PACKET_START => {
                self.in_packet = true;
                self.buffer.clear();
                None
            }
            PACKET_END if self.in_packet => {
                self.in_packet = false;
                Some(FrameEvent::Packet(std::mem::take(&mut self.buffer)))
            }
            PACKET_END => None,
            _ if self.in_packet => {
                self.buffer.push(b);
                None
            }
            _ => None,
        }
    }

    /// Feed a chunk and collect every event it completes, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Drop any partial packet.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_packet = false;
    }
}
