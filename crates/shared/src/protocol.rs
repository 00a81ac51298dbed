//! Push protocol envelopes.
//!
//! Inbound frames are `{"type": ..., "data": ...}` and decode into the closed
//! [`ServerMessage`] enum. Outbound frames are `{"action": ..., ...fields}`
//! and are produced from [`ClientAction`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ProtocolError;
use crate::models::{
    CalendarEvent, Dashboard, DashboardId, DashboardPatch, NewWidget, WeatherSnapshot, WidgetId,
    WidgetPatch,
};

/// Raw inbound envelope, before the payload is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Discriminant of [`ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DashboardData,
    DashboardUpdate,
    WidgetUpdate,
    WeatherData,
    WeatherUpdate,
    CalendarEvents,
    CalendarUpdate,
    Error,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::DashboardData,
        MessageKind::DashboardUpdate,
        MessageKind::WidgetUpdate,
        MessageKind::WeatherData,
        MessageKind::WeatherUpdate,
        MessageKind::CalendarEvents,
        MessageKind::CalendarUpdate,
        MessageKind::Error,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::DashboardData => "dashboard_data",
            MessageKind::DashboardUpdate => "dashboard_update",
            MessageKind::WidgetUpdate => "widget_update",
            MessageKind::WeatherData => "weather_data",
            MessageKind::WeatherUpdate => "weather_update",
            MessageKind::CalendarEvents => "calendar_events",
            MessageKind::CalendarUpdate => "calendar_update",
            MessageKind::Error => "error",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-widget change from `widget_update`.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetDelta {
    Upsert(WidgetPatch),
    Delete { id: WidgetId },
}

impl WidgetDelta {
    pub fn id(&self) -> WidgetId {
        match self {
            WidgetDelta::Upsert(patch) => patch.id,
            WidgetDelta::Delete { id } => *id,
        }
    }

    fn from_data(data: Value) -> Result<Self, serde_json::Error> {
        let deleted = data.get("deleted").and_then(Value::as_bool) == Some(true);
        let patch: WidgetPatch = serde_json::from_value(data)?;
        if deleted {
            Ok(WidgetDelta::Delete { id: patch.id })
        } else {
            Ok(WidgetDelta::Upsert(patch))
        }
    }
}

/// Failure reported by the server; carries nothing recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub message: String,
}

impl ServerError {
    fn from_data(data: &Value) -> Self {
        let message = match data {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
            Value::Null => "unspecified server error".to_string(),
            other => other.to_string(),
        };
        Self { message }
    }
}

/// Every inbound message kind the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    DashboardData(Dashboard),
    DashboardUpdate(DashboardPatch),
    WidgetUpdate(WidgetDelta),
    WeatherData(WeatherSnapshot),
    WeatherUpdate(WeatherSnapshot),
    CalendarEvents(Vec<CalendarEvent>),
    CalendarUpdate,
    Error(ServerError),
}

impl ServerMessage {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: InboundEnvelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: InboundEnvelope) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_wire(&envelope.kind)
            .ok_or_else(|| ProtocolError::UnknownType(envelope.kind.clone()))?;
        let data = envelope.data;
        let invalid = |source: serde_json::Error| ProtocolError::InvalidPayload { kind, source };

        let message = match kind {
            MessageKind::DashboardData => {
                ServerMessage::DashboardData(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::DashboardUpdate => {
                ServerMessage::DashboardUpdate(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::WidgetUpdate => {
                ServerMessage::WidgetUpdate(WidgetDelta::from_data(data).map_err(invalid)?)
            }
            MessageKind::WeatherData => {
                ServerMessage::WeatherData(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::WeatherUpdate => {
                ServerMessage::WeatherUpdate(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::CalendarEvents => {
                ServerMessage::CalendarEvents(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::CalendarUpdate => ServerMessage::CalendarUpdate,
            MessageKind::Error => ServerMessage::Error(ServerError::from_data(&data)),
        };
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::DashboardData(_) => MessageKind::DashboardData,
            ServerMessage::DashboardUpdate(_) => MessageKind::DashboardUpdate,
            ServerMessage::WidgetUpdate(_) => MessageKind::WidgetUpdate,
            ServerMessage::WeatherData(_) => MessageKind::WeatherData,
            ServerMessage::WeatherUpdate(_) => MessageKind::WeatherUpdate,
            ServerMessage::CalendarEvents(_) => MessageKind::CalendarEvents,
            ServerMessage::CalendarUpdate => MessageKind::CalendarUpdate,
            ServerMessage::Error(_) => MessageKind::Error,
        }
    }
}

/// Outbound requests, serialized as `{"action": "<name>", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    GetDashboard,
    UpdateWidget {
        widget: WidgetPatch,
    },
    AddWidget {
        widget: NewWidget,
    },
    DeleteWidget {
        widget_id: WidgetId,
    },
    GetEvents {
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    GetWeather {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        force_update: Option<bool>,
    },
    RequestWeatherUpdate,
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::GetDashboard => "get_dashboard",
            ClientAction::UpdateWidget { .. } => "update_widget",
            ClientAction::AddWidget { .. } => "add_widget",
            ClientAction::DeleteWidget { .. } => "delete_widget",
            ClientAction::GetEvents { .. } => "get_events",
            ClientAction::GetWeather { .. } => "get_weather",
            ClientAction::RequestWeatherUpdate => "request_weather_update",
        }
    }

    pub fn add_widget_to(dashboard: DashboardId, mut widget: NewWidget) -> Self {
        widget.dashboard = Some(dashboard);
        ClientAction::AddWidget { widget }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
