//! Shared data models for the family planner dashboard.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type WidgetId = u64;
pub type DashboardId = u64;
pub type EventId = u64;

// --- Households ---

/// Identifier of the household (family) a session is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseholdId(pub u64);

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for HouseholdId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for HouseholdId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// --- Widgets ---

/// Widget type tag.
///
/// Tags this client does not know about are kept verbatim in `Unknown` so the
/// widget still shows up (as a generic tile) and serializes back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WidgetKind {
    Weather,
    Calendar,
    Notes,
    Shopping,
    Tasks,
    Clock,
    Photos,
    Unknown(String),
}

impl WidgetKind {
    pub fn as_str(&self) -> &str {
        match self {
            WidgetKind::Weather => "weather",
            WidgetKind::Calendar => "calendar",
            WidgetKind::Notes => "notes",
            WidgetKind::Shopping => "shopping",
            WidgetKind::Tasks => "tasks",
            WidgetKind::Clock => "clock",
            WidgetKind::Photos => "photos",
            WidgetKind::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, WidgetKind::Unknown(_))
    }
}

impl Default for WidgetKind {
    fn default() -> Self {
        WidgetKind::Unknown(String::new())
    }
}

impl From<String> for WidgetKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "weather" => WidgetKind::Weather,
            "calendar" => WidgetKind::Calendar,
            "notes" => WidgetKind::Notes,
            "shopping" => WidgetKind::Shopping,
            "tasks" => WidgetKind::Tasks,
            "clock" => WidgetKind::Clock,
            "photos" => WidgetKind::Photos,
            _ => WidgetKind::Unknown(tag),
        }
    }
}

impl From<WidgetKind> for String {
    fn from(kind: WidgetKind) -> Self {
        match kind {
            WidgetKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dashboard tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub widget_type: WidgetKind,
    #[serde(default)]
    pub x_position: i32,
    #[serde(default)]
    pub y_position: i32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Per-type configuration, opaque to the sync layer.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Widget {
    /// Shallow merge: every field present in the patch replaces the current one.
    pub fn apply_patch(&mut self, patch: WidgetPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(widget_type) = patch.widget_type {
            self.widget_type = widget_type;
        }
        if let Some(x) = patch.x_position {
            self.x_position = x;
        }
        if let Some(y) = patch.y_position {
            self.y_position = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(config) = patch.config {
            self.config = config;
        }
    }
}

impl From<WidgetPatch> for Widget {
    fn from(patch: WidgetPatch) -> Self {
        let mut widget = Widget {
            id: patch.id,
            title: String::new(),
            widget_type: WidgetKind::default(),
            x_position: 0,
            y_position: 0,
            width: 0,
            height: 0,
            config: serde_json::Value::Null,
        };
        widget.apply_patch(patch);
        widget
    }
}

/// Partial widget: `id` plus whichever fields changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WidgetPatch {
    pub id: WidgetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<WidgetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl WidgetPatch {
    pub fn new(id: WidgetId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Layer a later patch for the same widget over this one.
    pub fn merge(&mut self, later: WidgetPatch) {
        self.title = later.title.or(self.title.take());
        self.widget_type = later.widget_type.or(self.widget_type.take());
        self.x_position = later.x_position.or(self.x_position);
        self.y_position = later.y_position.or(self.y_position);
        self.width = later.width.or(self.width);
        self.height = later.height.or(self.height);
        self.config = later.config.or(self.config.take());
    }
}

/// Widget as submitted by `add_widget`; the server assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewWidget {
    pub title: String,
    pub widget_type: WidgetKind,
    pub x_position: i32,
    pub y_position: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardId>,
}

// --- Dashboards ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub id: DashboardId,
    #[serde(default)]
    pub name: String,
    /// Insertion order is rendering order.
    #[serde(default)]
    pub widgets: Vec<Widget>,
    /// Owning household, as sent by the server.
    #[serde(default)]
    pub family: serde_json::Value,
    #[serde(default)]
    pub is_default: bool,
}

impl Dashboard {
    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }
}

/// Partial dashboard carried by `dashboard_update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DashboardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widgets: Option<Vec<Widget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

// --- Calendar ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: EventId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

// --- Weather ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub temperature: f64,
    #[serde(default, alias = "description")]
    pub condition: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherSnapshot {
    #[serde(default)]
    pub location: String,
    pub temperature: f64,
    #[serde(default, alias = "description")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub forecast: Vec<ForecastDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_widget_type_survives_round_trip() {
        let widget: Widget = serde_json::from_value(json!({
            "id": 3,
            "title": "Aquarium",
            "widget_type": "fish_tank",
            "config": {"litres": 60}
        }))
        .expect("widget");

        assert_eq!(widget.widget_type, WidgetKind::Unknown("fish_tank".into()));
        assert!(!widget.widget_type.is_known());

        let back = serde_json::to_value(&widget).expect("serialize");
        assert_eq!(back["widget_type"], "fish_tank");
        assert_eq!(back["config"]["litres"], 60);
    }

    #[test]
    fn known_widget_types_parse() {
        for (tag, kind) in [
            ("weather", WidgetKind::Weather),
            ("notes", WidgetKind::Notes),
            ("photos", WidgetKind::Photos),
        ] {
            assert_eq!(WidgetKind::from(tag.to_string()), kind);
            assert_eq!(kind.as_str(), tag);
        }
    }

    #[test]
    fn patch_merge_keeps_earlier_fields_unless_overridden() {
        let mut pending = WidgetPatch::new(7).title("Groceries");
        pending.merge(WidgetPatch::new(7).config(json!({"content": "milk"})));
        pending.merge(WidgetPatch::new(7).config(json!({"content": "milk, eggs"})));

        assert_eq!(pending.title.as_deref(), Some("Groceries"));
        assert_eq!(pending.config, Some(json!({"content": "milk, eggs"})));
    }

    #[test]
    fn weather_accepts_description_alias() {
        let weather: WeatherSnapshot = serde_json::from_value(json!({
            "temperature": 18.0,
            "description": "Partly cloudy",
            "location": "Dornbirn",
            "forecast": [
                {"date": "2024-05-02", "temperature": 20.0, "description": "Sunny", "icon": "sunny"}
            ]
        }))
        .expect("weather");

        assert_eq!(weather.condition, "Partly cloudy");
        assert_eq!(weather.forecast[0].condition, "Sunny");
        assert!(weather.last_updated.is_none());
    }

    #[test]
    fn unrecognised_priority_falls_back() {
        let event: CalendarEvent = serde_json::from_value(json!({
            "id": 1,
            "title": "Dentist",
            "start": "2024-05-02T09:00:00Z",
            "end": "2024-05-02T10:00:00Z",
            "priority": "urgent"
        }))
        .expect("event");

        assert_eq!(event.priority, Priority::Other);
        assert!(event.location.is_none());
    }

    #[test]
    fn household_id_parses_from_env_style_strings() {
        assert_eq!(" 42 ".parse::<HouseholdId>().expect("id"), HouseholdId(42));
        assert!("abc".parse::<HouseholdId>().is_err());
    }
}
