use crate::proto::command::{DeviceState, RequestKind};

/// Pending requests, one slot per kind.
///
/// Submitting a kind that is already pending replaces its payload. Slots are
/// drained in slot order, which is the transmit priority. `Run` and `Stop`
/// replace each other: only the latest motion request stays pending.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    slots: [Option<RequestKind>; RequestKind::SLOTS],
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, req: RequestKind) {
        match req {
            RequestKind::Run => self.slots[RequestKind::Stop.slot()] = None,
            RequestKind::Stop => self.slots[RequestKind::Run.slot()] = None,
            _ => {}
        }
        self.slots[req.slot()] = Some(req);
    }

    /// Take the highest priority request the pump accepts in `state`.
    pub fn next(&mut self, state: DeviceState) -> Option<RequestKind> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_some_and(|r| r.eligible(state)))?;
        self.slots[slot].take()
    }

    /// A stop or stall prompt makes pending run/stop actions moot.
    pub fn clear_motion(&mut self) {
        self.slots[RequestKind::Run.slot()] = None;
        self.slots[RequestKind::Stop.slot()] = None;
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }

    pub fn pending(&self) -> impl Iterator<Item = &RequestKind> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.pending().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::command::RateUnit;
    use proptest::prelude::*;

    #[test]
    fn coalesces_same_kind() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::SetDiameter(1.0));
        q.submit(RequestKind::SetDiameter(4.78));
        assert_eq!(q.len(), 1);
        assert_eq!(q.next(DeviceState::Stopped), Some(RequestKind::SetDiameter(4.78)));
        assert!(q.is_empty());
    }

    #[test]
    fn priority_order_when_stopped() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::GetTarget);
        q.submit(RequestKind::Run);
        q.submit(RequestKind::SetRate(2.0, RateUnit::UlPerMin));
        q.submit(RequestKind::GetDiameter);
        q.submit(RequestKind::SetTarget(1.0));
        let mut order = Vec::new();
        while let Some(r) = q.next(DeviceState::Stopped) {
            order.push(r);
        }
        assert_eq!(
            order,
            vec![
                RequestKind::SetRate(2.0, RateUnit::UlPerMin),
                RequestKind::SetTarget(1.0),
                RequestKind::Run,
                RequestKind::GetDiameter,
                RequestKind::GetTarget,
            ]
        );
    }

    #[test]
    fn forward_only_services_stop_and_queries() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::SetDiameter(3.0));
        q.submit(RequestKind::GetRate);
        q.submit(RequestKind::Stop);
        assert_eq!(q.next(DeviceState::Forward), Some(RequestKind::Stop));
        assert_eq!(q.next(DeviceState::Forward), Some(RequestKind::GetRate));
        assert_eq!(q.next(DeviceState::Forward), None);
        // refused requests stay pending for later
        assert_eq!(q.len(), 1);
        assert_eq!(q.next(DeviceState::Stopped), Some(RequestKind::SetDiameter(3.0)));
    }

    #[test]
    fn run_and_stop_replace_each_other() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::Stop);
        q.submit(RequestKind::GetTarget);
        q.submit(RequestKind::Run);
        assert_eq!(
            q.pending().copied().collect::<Vec<_>>(),
            vec![RequestKind::Run, RequestKind::GetTarget]
        );
        q.submit(RequestKind::Stop);
        assert_eq!(
            q.pending().copied().collect::<Vec<_>>(),
            vec![RequestKind::Stop, RequestKind::GetTarget]
        );
    }

    #[test]
    fn stop_waits_while_stopped() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::Stop);
        assert_eq!(q.next(DeviceState::Stopped), None);
        q.clear_motion();
        assert!(q.is_empty());
    }

    #[test]
    fn clear_motion_keeps_settings() {
        let mut q = RequestQueue::new();
        q.submit(RequestKind::Run);
        q.submit(RequestKind::SetTarget(0.5));
        q.clear_motion();
        assert_eq!(q.pending().copied().collect::<Vec<_>>(), vec![RequestKind::SetTarget(0.5)]);
    }

    proptest! {
        #[test]
        fn last_submission_wins(values in proptest::collection::vec(0.0f64..100.0, 1..16)) {
            let mut q = RequestQueue::new();
            for v in &values {
                q.submit(RequestKind::SetTarget(*v));
                q.submit(RequestKind::SetRate(*v, RateUnit::MlPerHour));
            }
            prop_assert_eq!(q.len(), 2);
            let last = *values.last().unwrap();
            prop_assert_eq!(q.next(DeviceState::Stalled), Some(RequestKind::SetRate(last, RateUnit::MlPerHour)));
            prop_assert_eq!(q.next(DeviceState::Stalled), Some(RequestKind::SetTarget(last)));
        }
    }
}
