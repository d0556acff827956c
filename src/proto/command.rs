/// Pump status as last reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Stopped,
    Forward,
    Stalled,
}

/// Inputs that move a [`DeviceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Open,
    Close,
    /// Asynchronous status marker from the device (`:` `>` `*`).
    Marker(StatusMarker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMarker {
    Stopped,
    Forward,
    Stalled,
}

impl StatusMarker {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b':' => Some(StatusMarker::Stopped),
            b'>' => Some(StatusMarker::Forward),
            b'*' => Some(StatusMarker::Stalled),
            _ => None,
        }
    }

    /// Stopped and stalled prompts cancel any pending run/stop action.
    pub fn cancels_motion(self) -> bool {
        matches!(self, StatusMarker::Stopped | StatusMarker::Stalled)
    }
}

impl DeviceState {
    /// Transition table. Markers are ignored while disconnected, and opening
    /// an already open link keeps its state.
    pub fn transition(self, event: StateEvent) -> DeviceState {
        use DeviceState::*;
        match (self, event) {
            (_, StateEvent::Close) => Disconnected,
            (Disconnected, StateEvent::Open) => Stopped,
            (s, StateEvent::Open) => s,
            (Disconnected, StateEvent::Marker(_)) => Disconnected,
            (_, StateEvent::Marker(StatusMarker::Stopped)) => Stopped,
            (_, StateEvent::Marker(StatusMarker::Forward)) => Forward,
            (_, StateEvent::Marker(StatusMarker::Stalled)) => Stalled,
        }
    }

    pub fn is_connected(self) -> bool {
        self != DeviceState::Disconnected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateUnit {
    MlPerMin,
    UlPerMin,
    MlPerHour,
    UlPerHour,
}

impl RateUnit {
    /// Ordinal order of the wire tokens.
    pub const ALL: [RateUnit; 4] = [
        RateUnit::MlPerMin,
        RateUnit::UlPerMin,
        RateUnit::MlPerHour,
        RateUnit::UlPerHour,
    ];

    pub fn ordinal(self) -> usize {
        match self {
            RateUnit::MlPerMin => 0,
            RateUnit::UlPerMin => 1,
            RateUnit::MlPerHour => 2,
            RateUnit::UlPerHour => 3,
        }
    }

    pub fn from_ordinal(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }
}

/// One request the host can make of the pump. Each variant owns a single
/// pending slot; a later submission of the same variant replaces the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestKind {
    SetDiameter(f64),
    SetRate(f64, RateUnit),
    SetTarget(f64),
    Run,
    Stop,
    GetDiameter,
    GetRate,
    GetTarget,
}

impl RequestKind {
    pub const SLOTS: usize = 8;

    /// Slot index, which is also the transmit priority (lower goes first).
    pub fn slot(&self) -> usize {
        match self {
            RequestKind::Stop => 0,
            RequestKind::SetDiameter(_) => 1,
            RequestKind::SetRate(..) => 2,
            RequestKind::SetTarget(_) => 3,
            RequestKind::Run => 4,
            RequestKind::GetDiameter => 5,
            RequestKind::GetRate => 6,
            RequestKind::GetTarget => 7,
        }
    }

    /// Whether the pump accepts this request in `state`.
    pub fn eligible(&self, state: DeviceState) -> bool {
        match self {
            RequestKind::Stop => state == DeviceState::Forward,
            RequestKind::SetDiameter(_)
            | RequestKind::SetRate(..)
            | RequestKind::SetTarget(_)
            | RequestKind::Run => state != DeviceState::Forward,
            RequestKind::GetDiameter | RequestKind::GetRate | RequestKind::GetTarget => true,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            RequestKind::GetDiameter | RequestKind::GetRate | RequestKind::GetTarget
        )
    }
}

/// Decoded answer to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Answer {
    Diameter(f64),
    Rate(f64, RateUnit),
    Target(f64),
}
