//! Deterministic stand-ins for the timer and transport seams.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use familyplanner_shared::HouseholdId;

use crate::ws::{
    Channel, ChannelId, ChannelKind, ReconnectPolicy, Scheduler, TimerId, Transport,
    TransportError, TransportEvent, TransportFactory, TransportSink,
};

struct ManualTimer {
    id: TimerId,
    due: Duration,
    task: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Virtual clock: timers only fire when the test calls [`ManualScheduler::advance`].
#[derive(Default)]
pub struct ManualScheduler {
    clock: RefCell<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.clock.borrow().timers.len()
    }

    /// Delay until the earliest pending timer.
    pub fn next_due(&self) -> Option<Duration> {
        let clock = self.clock.borrow();
        clock.timers.iter().map(|t| t.due - clock.now).min()
    }

    /// Move time forward, running every timer that falls due, earliest first.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.borrow().now + by;
        loop {
            let next = {
                let mut clock = self.clock.borrow_mut();
                let earliest = clock
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id.0))
                    .map(|(index, _)| index);
                earliest.map(|index| {
                    let timer = clock.timers.remove(index);
                    clock.now = timer.due;
                    timer
                })
            };
            match next {
                Some(timer) => (timer.task)(),
                None => break,
            }
        }
        self.clock.borrow_mut().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId {
        let mut clock = self.clock.borrow_mut();
        let id = TimerId(clock.next_id);
        clock.next_id += 1;
        let due = clock.now + delay;
        clock.timers.push(ManualTimer { id, due, task });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.clock.borrow_mut().timers.retain(|t| t.id != id);
    }
}

#[derive(Default)]
struct Wire {
    opens: Vec<(String, TransportSink)>,
    sent: Vec<String>,
    closes: usize,
}

/// Records every call and lets the test play the server side.
#[derive(Clone, Default)]
pub struct FakeTransport {
    wire: Rc<RefCell<Wire>>,
}

impl FakeTransport {
    pub fn open_count(&self) -> usize {
        self.wire.borrow().opens.len()
    }

    pub fn close_count(&self) -> usize {
        self.wire.borrow().closes
    }

    pub fn last_url(&self) -> Option<String> {
        self.wire.borrow().opens.last().map(|(url, _)| url.clone())
    }

    pub fn sent(&self) -> Vec<String> {
        self.wire.borrow().sent.clone()
    }

    /// Sink handed to the most recent `open`.
    pub fn sink(&self) -> TransportSink {
        self.wire
            .borrow()
            .opens
            .last()
            .map(|(_, sink)| sink.clone())
            .expect("transport was never opened")
    }

    pub fn deliver(&self, event: TransportEvent) {
        let sink = self.sink();
        sink.deliver(event);
    }

    pub fn accept(&self) {
        self.deliver(TransportEvent::Opened);
    }

    pub fn drop_connection(&self) {
        self.deliver(TransportEvent::Closed { reason: None });
    }

    pub fn push(&self, frame: &str) {
        self.deliver(TransportEvent::Frame(frame.to_string()));
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, url: &str, sink: TransportSink) {
        self.wire.borrow_mut().opens.push((url.to_string(), sink));
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.wire.borrow_mut().sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closes += 1;
    }
}

/// Hands out [`FakeTransport`]s and remembers the latest one per channel kind.
#[derive(Default)]
pub struct FakeTransportFactory {
    created: RefCell<HashMap<ChannelKind, Vec<FakeTransport>>>,
}

impl FakeTransportFactory {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn latest(&self, kind: ChannelKind) -> FakeTransport {
        self.created
            .borrow()
            .get(&kind)
            .and_then(|list| list.last().cloned())
            .expect("no transport created for kind")
    }

    pub fn created(&self, kind: ChannelKind) -> usize {
        self.created.borrow().get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(&self, id: &ChannelId) -> Box<dyn Transport> {
        let transport = FakeTransport::default();
        self.created
            .borrow_mut()
            .entry(id.kind)
            .or_default()
            .push(transport.clone());
        Box::new(transport)
    }
}

pub fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        ..ReconnectPolicy::default()
    }
}

/// A dashboard channel for household 1 wired to fakes.
pub fn fake_channel(policy: ReconnectPolicy) -> (Channel, FakeTransport, Rc<ManualScheduler>) {
    let scheduler = ManualScheduler::new();
    let transport = FakeTransport::default();
    let id = ChannelId {
        kind: ChannelKind::Dashboard,
        household: HouseholdId(1),
    };
    let channel = Channel::new(
        id,
        "ws://planner.test/ws/dashboard/1/".to_string(),
        Box::new(transport.clone()),
        policy,
        scheduler.clone(),
    );
    (channel, transport, scheduler)
}
