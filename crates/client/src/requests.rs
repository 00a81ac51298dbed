//! Outbound requests: typed intents over [`Channel::send`] and a trailing
//! debounce for rapid widget edits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use familyplanner_shared::{ClientAction, DashboardId, NewWidget, Widget, WidgetId, WidgetPatch};
use serde_json::{Map, Value};

use crate::ws::{Channel, Scheduler, SendError, TimerId};

/// Length of the window requested by [`RequestCoordinator::request_upcoming_events`].
pub const UPCOMING_EVENTS_DAYS: i64 = 7;

struct PendingEdit {
    timer: TimerId,
    channel: Channel,
    patch: WidgetPatch,
}

impl PendingEdit {
    fn emit(self) -> Result<(), SendError> {
        self.channel.send(&ClientAction::UpdateWidget { widget: self.patch })
    }
}

pub struct RequestCoordinator {
    scheduler: Rc<dyn Scheduler>,
    debounce: Duration,
    pending: Rc<RefCell<HashMap<WidgetId, PendingEdit>>>,
}

impl RequestCoordinator {
    pub fn new(scheduler: Rc<dyn Scheduler>, debounce: Duration) -> Self {
        Self {
            scheduler,
            debounce,
            pending: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn send_action(&self, channel: &Channel, action: ClientAction) -> Result<(), SendError> {
        channel.send(&action)
    }

    pub fn get_dashboard(&self, channel: &Channel) -> Result<(), SendError> {
        self.send_action(channel, ClientAction::GetDashboard)
    }

    pub fn add_widget(
        &self,
        channel: &Channel,
        dashboard: DashboardId,
        widget: NewWidget,
    ) -> Result<(), SendError> {
        self.send_action(channel, ClientAction::add_widget_to(dashboard, widget))
    }

    pub fn update_widget(&self, channel: &Channel, patch: WidgetPatch) -> Result<(), SendError> {
        self.send_action(channel, ClientAction::UpdateWidget { widget: patch })
    }

    pub fn delete_widget(&self, channel: &Channel, widget_id: WidgetId) -> Result<(), SendError> {
        self.send_action(channel, ClientAction::DeleteWidget { widget_id })
    }

    pub fn request_events(
        &self,
        channel: &Channel,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<(), SendError> {
        self.send_action(
            channel,
            ClientAction::GetEvents {
                start_date,
                end_date,
            },
        )
    }

    /// Events from `now` through the following week.
    pub fn request_upcoming_events(
        &self,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Result<(), SendError> {
        self.request_events(channel, now, now + chrono::Duration::days(UPCOMING_EVENTS_DAYS))
    }

    pub fn request_forecast(&self, channel: &Channel, force_update: bool) -> Result<(), SendError> {
        self.send_action(
            channel,
            ClientAction::GetWeather {
                force_update: Some(force_update),
            },
        )
    }

    pub fn request_weather_update(&self, channel: &Channel) -> Result<(), SendError> {
        self.send_action(channel, ClientAction::RequestWeatherUpdate)
    }

    /// Queue `patch` and send it once edits to the same widget go quiet.
    ///
    /// A newer edit restarts the window and is merged over the pending one,
    /// so only a single `update_widget` goes out per burst.
    pub fn edit_widget(&self, channel: &Channel, patch: WidgetPatch) {
        let id = patch.id;
        let mut pending = self.pending.borrow_mut();
        let patch = match pending.remove(&id) {
            Some(previous) => {
                self.scheduler.cancel(previous.timer);
                let mut merged = previous.patch;
                merged.merge(patch);
                merged
            }
            None => patch,
        };

        let edits = Rc::downgrade(&self.pending);
        let timer = self.scheduler.schedule(
            self.debounce,
            Box::new(move || {
                let Some(edits) = edits.upgrade() else {
                    return;
                };
                let edit = edits.borrow_mut().remove(&id);
                if let Some(edit) = edit {
                    if let Err(err) = edit.emit() {
                        tracing::warn!(widget = id, "debounced update not sent: {err}");
                    }
                }
            }),
        );
        pending.insert(
            id,
            PendingEdit {
                timer,
                channel: channel.clone(),
                patch,
            },
        );
    }

    /// Debounced edit of individual `config` keys, layered over the widget's
    /// current config and any edit still waiting to go out.
    pub fn edit_widget_config(&self, channel: &Channel, widget: &Widget, changes: Map<String, Value>) {
        let base = self
            .pending
            .borrow()
            .get(&widget.id)
            .and_then(|edit| edit.patch.config.clone())
            .unwrap_or_else(|| widget.config.clone());
        let mut config = match base {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        config.extend(changes);
        self.edit_widget(channel, WidgetPatch::new(widget.id).config(Value::Object(config)));
    }

    pub fn pending_edits(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Send every pending edit now. Returns the last failure, if any.
    pub fn flush(&self) -> Result<(), SendError> {
        let edits: Vec<PendingEdit> = self.pending.borrow_mut().drain().map(|(_, e)| e).collect();
        let mut result = Ok(());
        for edit in edits {
            self.scheduler.cancel(edit.timer);
            if let Err(err) = edit.emit() {
                tracing::warn!("pending update not sent: {err}");
                result = Err(err);
            }
        }
        result
    }

    /// Drop every pending edit without sending.
    pub fn cancel_pending(&self) {
        let edits: Vec<PendingEdit> = self.pending.borrow_mut().drain().map(|(_, e)| e).collect();
        if !edits.is_empty() {
            tracing::debug!(count = edits.len(), "discarding pending widget edits");
        }
        for edit in edits {
            self.scheduler.cancel(edit.timer);
        }
    }
}

impl Drop for RequestCoordinator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
