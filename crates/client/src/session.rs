//! One household's live session: channels, store and outbound requests,
//! wired together.

use std::rc::Rc;

use chrono::Utc;
use familyplanner_shared::{HouseholdId, MessageKind, NewWidget, Widget, WidgetId, WidgetPatch};
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::requests::RequestCoordinator;
use crate::stores::HouseholdStore;
use crate::ws::{
    Channel, ChannelKind, ChannelRegistry, EventKind, Scheduler, SendError, TransportFactory,
};

/// Owns the registry, store and coordinator for the active household.
///
/// On every `Connected` a channel requests its initial data; a
/// `calendar_update` triggers a fresh event request.
pub struct HouseholdSession {
    registry: ChannelRegistry,
    store: HouseholdStore,
    requests: Rc<RequestCoordinator>,
}

impl HouseholdSession {
    pub fn new(
        config: &ClientConfig,
        scheduler: Rc<dyn Scheduler>,
        transports: Rc<dyn TransportFactory>,
    ) -> Self {
        let registry = ChannelRegistry::new(
            config.ws_base_url.clone(),
            config.reconnect.clone(),
            Rc::clone(&scheduler),
            transports,
        );
        Self {
            registry,
            store: HouseholdStore::new(),
            requests: Rc::new(RequestCoordinator::new(scheduler, config.debounce)),
        }
    }

    pub fn store(&self) -> &HouseholdStore {
        &self.store
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn requests(&self) -> &RequestCoordinator {
        &self.requests
    }

    pub fn household(&self) -> Option<HouseholdId> {
        self.registry.household()
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Point the session at `household`, dropping everything from the previous one.
    pub fn switch_household(&mut self, household: HouseholdId) {
        if self.registry.household() == Some(household) {
            return;
        }
        self.requests.cancel_pending();
        self.store.reset();
        self.registry.activate(household);
        for channel in self.registry.channels() {
            self.store.bind(channel);
            self.bind_initial_requests(channel);
        }
    }

    pub fn reconnect(&self) {
        self.registry.reconnect_all();
    }

    /// Close every channel and clear state.
    pub fn end(&mut self) {
        self.requests.cancel_pending();
        self.registry.deactivate();
        self.store.reset();
    }

    fn bind_initial_requests(&self, channel: &Channel) {
        let requests = Rc::clone(&self.requests);
        let weak = channel.downgrade();
        match channel.id().kind {
            ChannelKind::Dashboard => {
                channel.on(EventKind::Connected, move |_| {
                    if let Some(channel) = weak.upgrade() {
                        requests.get_dashboard(&channel)?;
                    }
                    Ok(())
                });
            }
            ChannelKind::Weather => {
                channel.on(EventKind::Connected, move |_| {
                    if let Some(channel) = weak.upgrade() {
                        requests.request_forecast(&channel, true)?;
                    }
                    Ok(())
                });
            }
            ChannelKind::Calendar => {
                for kind in [EventKind::Connected, MessageKind::CalendarUpdate.into()] {
                    let requests = Rc::clone(&requests);
                    let weak = weak.clone();
                    channel.on(kind, move |_| {
                        if let Some(channel) = weak.upgrade() {
                            requests.request_upcoming_events(&channel, Utc::now())?;
                        }
                        Ok(())
                    });
                }
            }
        }
    }

    fn channel(&self, kind: ChannelKind) -> Result<&Channel, SendError> {
        self.registry
            .channel(kind)
            .ok_or(SendError::NoChannel { kind })
    }

    pub fn refresh_dashboard(&self) -> Result<(), SendError> {
        self.requests.get_dashboard(self.channel(ChannelKind::Dashboard)?)
    }

    /// Add a widget to the loaded dashboard.
    pub fn add_widget(&self, widget: NewWidget) -> Result<(), SendError> {
        let dashboard = self
            .store
            .read(|state| state.dashboard.as_ref().map(|d| d.id))
            .ok_or(SendError::DashboardNotLoaded)?;
        self.requests
            .add_widget(self.channel(ChannelKind::Dashboard)?, dashboard, widget)
    }

    pub fn update_widget(&self, patch: WidgetPatch) -> Result<(), SendError> {
        self.requests
            .update_widget(self.channel(ChannelKind::Dashboard)?, patch)
    }

    pub fn delete_widget(&self, widget_id: WidgetId) -> Result<(), SendError> {
        self.requests
            .delete_widget(self.channel(ChannelKind::Dashboard)?, widget_id)
    }

    /// Debounced counterpart of [`HouseholdSession::update_widget`].
    pub fn edit_widget(&self, patch: WidgetPatch) -> Result<(), SendError> {
        self.requests
            .edit_widget(self.channel(ChannelKind::Dashboard)?, patch);
        Ok(())
    }

    pub fn edit_widget_config(
        &self,
        widget: &Widget,
        changes: Map<String, Value>,
    ) -> Result<(), SendError> {
        self.requests
            .edit_widget_config(self.channel(ChannelKind::Dashboard)?, widget, changes);
        Ok(())
    }

    pub fn refresh_events(&self) -> Result<(), SendError> {
        self.requests
            .request_upcoming_events(self.channel(ChannelKind::Calendar)?, Utc::now())
    }

    pub fn refresh_weather(&self) -> Result<(), SendError> {
        self.requests
            .request_weather_update(self.channel(ChannelKind::Weather)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransportFactory, ManualScheduler};
    use serde_json::json;
    use std::time::Duration;

    fn session() -> (HouseholdSession, Rc<FakeTransportFactory>, Rc<ManualScheduler>) {
        let config = ClientConfig::from_lookup(|key| match key {
            "FAMILYPLANNER_WS_BASE_URL" => Some("ws://planner.test".to_string()),
            _ => None,
        })
        .expect("config");
        let factory = FakeTransportFactory::new();
        let scheduler = ManualScheduler::new();
        let session = HouseholdSession::new(&config, scheduler.clone(), factory.clone());
        (session, factory, scheduler)
    }

    fn actions(factory: &FakeTransportFactory, kind: ChannelKind) -> Vec<String> {
        factory
            .latest(kind)
            .sent()
            .iter()
            .map(|frame| {
                let value: Value = serde_json::from_str(frame).expect("json");
                value["action"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    fn connect_all(factory: &FakeTransportFactory) {
        for kind in ChannelKind::ALL {
            factory.latest(kind).accept();
        }
    }

    #[test]
    fn connecting_requests_initial_data() {
        let (mut session, factory, _scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);

        assert!(session.is_connected());
        assert_eq!(actions(&factory, ChannelKind::Dashboard), vec!["get_dashboard"]);
        assert_eq!(actions(&factory, ChannelKind::Weather), vec!["get_weather"]);
        assert_eq!(actions(&factory, ChannelKind::Calendar), vec!["get_events"]);

        let weather: Value =
            serde_json::from_str(&factory.latest(ChannelKind::Weather).sent()[0]).expect("json");
        assert_eq!(weather["force_update"], json!(true));
    }

    #[test]
    fn calendar_update_rerequests_events() {
        let (mut session, factory, _scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);

        factory
            .latest(ChannelKind::Calendar)
            .push(r#"{"type":"calendar_update","data":{}}"#);
        assert_eq!(
            actions(&factory, ChannelKind::Calendar),
            vec!["get_events", "get_events"]
        );
    }

    #[test]
    fn messages_land_in_the_store() {
        let (mut session, factory, _scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);

        factory.latest(ChannelKind::Dashboard).push(
            r#"{"type":"dashboard_data","data":{"id":8,"name":"Home","widgets":[]}}"#,
        );
        factory.latest(ChannelKind::Weather).push(
            r#"{"type":"weather_data","data":{"location":"Oslo","temperature":3.0,"condition":"snow"}}"#,
        );
        factory
            .latest(ChannelKind::Calendar)
            .push(r#"{"type":"calendar_events","data":[]}"#);

        let state = session.store().snapshot();
        assert!(state.is_complete());
        assert_eq!(state.dashboard.map(|d| d.id), Some(8));
    }

    #[test]
    fn add_widget_needs_a_loaded_dashboard() {
        let (mut session, factory, _scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);

        let widget: NewWidget = serde_json::from_value(json!({
            "title": "Clock", "widget_type": "clock",
            "x_position": 0, "y_position": 0, "width": 1, "height": 1
        }))
        .expect("widget");
        assert!(matches!(
            session.add_widget(widget.clone()),
            Err(SendError::DashboardNotLoaded)
        ));

        factory.latest(ChannelKind::Dashboard).push(
            r#"{"type":"dashboard_data","data":{"id":8,"name":"Home","widgets":[]}}"#,
        );
        session.add_widget(widget).expect("sent");
        assert_eq!(
            actions(&factory, ChannelKind::Dashboard),
            vec!["get_dashboard", "add_widget"]
        );
    }

    #[test]
    fn switching_household_resets_state_and_pending_edits() {
        let (mut session, factory, scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);
        factory.latest(ChannelKind::Dashboard).push(
            r#"{"type":"dashboard_data","data":{"id":8,"name":"Home","widgets":[]}}"#,
        );
        session
            .edit_widget(WidgetPatch::new(1).title("draft"))
            .expect("queued");
        let old_dashboard = factory.latest(ChannelKind::Dashboard);

        session.switch_household(HouseholdId(3));
        assert_eq!(session.household(), Some(HouseholdId(3)));
        assert_eq!(session.store().snapshot().dashboard, None);
        assert_eq!(session.requests().pending_edits(), 0);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(old_dashboard.sent().len(), 1);
        assert_eq!(factory.created(ChannelKind::Dashboard), 2);
    }

    #[test]
    fn intents_without_channels_fail() {
        let (session, _factory, _scheduler) = session();
        assert!(matches!(
            session.refresh_weather(),
            Err(SendError::NoChannel {
                kind: ChannelKind::Weather
            })
        ));
    }

    #[test]
    fn end_closes_everything() {
        let (mut session, factory, _scheduler) = session();
        session.switch_household(HouseholdId(2));
        connect_all(&factory);

        session.end();
        assert!(!session.is_connected());
        assert_eq!(session.household(), None);
        for kind in ChannelKind::ALL {
            assert_eq!(factory.latest(kind).close_count(), 1);
        }
    }
}
