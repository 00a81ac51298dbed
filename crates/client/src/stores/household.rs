//! Household store: the latest dashboard, calendar and weather for the active
//! household, fed by channel messages.

use std::cell::RefCell;
use std::rc::Rc;

use familyplanner_shared::{CalendarEvent, Dashboard, ServerMessage, WeatherSnapshot};
use tokio::sync::watch;

use super::reconcile::{apply_delta, apply_snapshot, merge_dashboard, Delta};
use crate::ws::{Channel, ChannelEvent, SubscriberId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HouseholdState {
    pub dashboard: Option<Dashboard>,
    pub events: Vec<CalendarEvent>,
    /// Whether a `calendar_events` snapshot has arrived since the last reset.
    pub events_loaded: bool,
    pub weather: Option<WeatherSnapshot>,
    /// Most recent `error` message from any channel.
    pub last_error: Option<String>,
}

impl HouseholdState {
    /// Every feed has delivered at least one snapshot.
    pub fn is_complete(&self) -> bool {
        self.dashboard.is_some() && self.events_loaded && self.weather.is_some()
    }
}

/// Shared handle; clones see the same state.
///
/// Every applied change bumps a revision published on a watch channel.
#[derive(Clone)]
pub struct HouseholdStore {
    state: Rc<RefCell<HouseholdState>>,
    revision: Rc<watch::Sender<u64>>,
}

impl Default for HouseholdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HouseholdStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Rc::new(RefCell::new(HouseholdState::default())),
            revision: Rc::new(revision),
        }
    }

    pub fn snapshot(&self) -> HouseholdState {
        self.state.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&HouseholdState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Forget everything (on household switch or sign-out).
    pub fn reset(&self) {
        *self.state.borrow_mut() = HouseholdState::default();
        self.bump();
    }

    /// Fold one server message into the state.
    pub fn apply(&self, message: &ServerMessage) {
        {
            let mut state = self.state.borrow_mut();
            match message {
                ServerMessage::DashboardData(dashboard) => {
                    state.dashboard = Some(dashboard.clone());
                }
                ServerMessage::DashboardUpdate(patch) => {
                    let next = merge_dashboard(state.dashboard.as_ref(), patch.clone());
                    state.dashboard = Some(next);
                }
                ServerMessage::WidgetUpdate(delta) => {
                    let Some(dashboard) = state.dashboard.as_mut() else {
                        tracing::debug!(widget = delta.id(), "widget update before dashboard snapshot, ignoring");
                        return;
                    };
                    dashboard.widgets = apply_delta(&dashboard.widgets, Delta::from(delta.clone()));
                }
                ServerMessage::WeatherData(weather) | ServerMessage::WeatherUpdate(weather) => {
                    state.weather = Some(weather.clone());
                }
                ServerMessage::CalendarEvents(events) => {
                    state.events = apply_snapshot(&state.events, events.clone());
                    state.events_loaded = true;
                }
                // Carries no data; the session re-requests the event window.
                ServerMessage::CalendarUpdate => return,
                ServerMessage::Error(err) => {
                    tracing::warn!("server reported error: {}", err.message);
                    state.last_error = Some(err.message.clone());
                }
            }
        }
        self.bump();
    }

    /// Subscribe to every message kind `channel` carries.
    pub fn bind(&self, channel: &Channel) -> Vec<SubscriberId> {
        channel
            .id()
            .kind
            .message_kinds()
            .iter()
            .map(|&kind| {
                let store = self.clone();
                channel.on(kind, move |event| {
                    if let ChannelEvent::Message(message) = event {
                        store.apply(message);
                    }
                    Ok(())
                })
            })
            .collect()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_channel;
    use crate::ws::ReconnectPolicy;
    use familyplanner_shared::{DashboardPatch, ServerError, WidgetDelta, WidgetPatch};

    fn decode(frame: &str) -> ServerMessage {
        ServerMessage::decode(frame).expect("valid frame")
    }

    const DASHBOARD: &str = r#"{"type":"dashboard_data","data":{"id":1,"name":"Home","widgets":[
        {"id":10,"title":"Notes","widget_type":"notes","x_position":0,"y_position":0,"width":2,"height":2,"config":{"content":"milk"}},
        {"id":11,"title":"Clock","widget_type":"clock","x_position":2,"y_position":0,"width":1,"height":1,"config":{}}
    ]}}"#;

    #[test]
    fn snapshot_then_deltas() {
        let store = HouseholdStore::new();
        store.apply(&decode(DASHBOARD));
        store.apply(&ServerMessage::WidgetUpdate(WidgetDelta::Upsert(
            WidgetPatch::new(10).title("Shopping list"),
        )));
        store.apply(&ServerMessage::WidgetUpdate(WidgetDelta::Delete { id: 11 }));

        let state = store.snapshot();
        let dashboard = state.dashboard.expect("dashboard");
        assert_eq!(dashboard.widgets.len(), 1);
        assert_eq!(dashboard.widgets[0].title, "Shopping list");
        assert_eq!(dashboard.widgets[0].width, 2);
    }

    #[test]
    fn widget_update_before_snapshot_is_ignored() {
        let store = HouseholdStore::new();
        let before = store.revision();
        store.apply(&ServerMessage::WidgetUpdate(WidgetDelta::Upsert(WidgetPatch::new(1))));
        assert_eq!(store.snapshot().dashboard, None);
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn dashboard_update_merges() {
        let store = HouseholdStore::new();
        store.apply(&decode(DASHBOARD));
        store.apply(&ServerMessage::DashboardUpdate(DashboardPatch {
            name: Some("Kitchen".to_string()),
            ..DashboardPatch::default()
        }));
        let dashboard = store.snapshot().dashboard.expect("dashboard");
        assert_eq!(dashboard.name, "Kitchen");
        assert_eq!(dashboard.widgets.len(), 2);
    }

    #[test]
    fn calendar_and_weather_replace() {
        let store = HouseholdStore::new();
        store.apply(&decode(
            r#"{"type":"calendar_events","data":[{"id":1,"title":"Dentist","start":"2026-10-19T09:00:00Z","end":"2026-10-19T10:00:00Z","priority":"high"}]}"#,
        ));
        store.apply(&decode(r#"{"type":"calendar_events","data":[]}"#));
        store.apply(&decode(
            r#"{"type":"weather_update","data":{"location":"Oslo","temperature":4.5,"description":"rain"}}"#,
        ));

        let state = store.snapshot();
        assert!(state.events.is_empty());
        assert!(state.events_loaded);
        assert_eq!(state.weather.map(|w| w.condition), Some("rain".to_string()));
    }

    #[test]
    fn errors_are_kept_and_reset_clears() {
        let store = HouseholdStore::new();
        store.apply(&ServerMessage::Error(ServerError {
            message: "nope".to_string(),
        }));
        assert_eq!(store.snapshot().last_error.as_deref(), Some("nope"));

        store.reset();
        assert_eq!(store.snapshot(), HouseholdState::default());
    }

    #[test]
    fn revisions_are_published() {
        let store = HouseholdStore::new();
        let mut revisions = store.watch();
        store.apply(&decode(DASHBOARD));
        assert!(revisions.has_changed().expect("sender alive"));
        assert_eq!(*revisions.borrow_and_update(), 1);
    }

    #[test]
    fn bound_store_follows_channel_messages() {
        let (channel, transport, _scheduler) = fake_channel(ReconnectPolicy::default());
        let store = HouseholdStore::new();
        let ids = store.bind(&channel);
        assert_eq!(ids.len(), 4);

        channel.open();
        transport.accept();
        transport.push(DASHBOARD);
        transport.push(r#"{"type":"widget_update","data":{"id":11,"deleted":true}}"#);

        let dashboard = store.snapshot().dashboard.expect("dashboard");
        assert_eq!(dashboard.widgets.iter().map(|w| w.id).collect::<Vec<_>>(), vec![10]);
    }
}
