//! Pure merge functions for server snapshots and deltas.
//!
//! Nothing here mutates its input: each function returns the next collection
//! and the caller swaps it in.

use familyplanner_shared::{Dashboard, DashboardPatch, Widget, WidgetDelta, WidgetId, WidgetPatch};

/// An item with a stable id that can absorb a partial update.
pub trait Record: Clone {
    type Id: PartialEq + Copy;
    type Patch;

    fn id(&self) -> Self::Id;
    fn patch_id(patch: &Self::Patch) -> Self::Id;
    /// Shallow merge; fields absent from the patch are kept.
    fn merge(&mut self, patch: Self::Patch);
    fn from_patch(patch: Self::Patch) -> Self;
}

impl Record for Widget {
    type Id = WidgetId;
    type Patch = WidgetPatch;

    fn id(&self) -> WidgetId {
        self.id
    }

    fn patch_id(patch: &WidgetPatch) -> WidgetId {
        patch.id
    }

    fn merge(&mut self, patch: WidgetPatch) {
        self.apply_patch(patch);
    }

    fn from_patch(patch: WidgetPatch) -> Self {
        Widget::from(patch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delta<T: Record> {
    Upsert(T::Patch),
    Delete(T::Id),
}

impl From<WidgetDelta> for Delta<Widget> {
    fn from(delta: WidgetDelta) -> Self {
        match delta {
            WidgetDelta::Upsert(patch) => Delta::Upsert(patch),
            WidgetDelta::Delete { id } => Delta::Delete(id),
        }
    }
}

/// A snapshot replaces the collection outright, including dropping ids it
/// no longer lists.
pub fn apply_snapshot<T: Clone>(_previous: &[T], incoming: Vec<T>) -> Vec<T> {
    incoming
}

/// Apply one upsert or delete.
///
/// An upsert merges into the item with the same id, or appends a new item
/// built from the patch. Deleting an unknown id leaves the collection as is.
pub fn apply_delta<T: Record>(current: &[T], delta: Delta<T>) -> Vec<T> {
    match delta {
        Delta::Delete(id) => current.iter().filter(|r| r.id() != id).cloned().collect(),
        Delta::Upsert(patch) => {
            let id = T::patch_id(&patch);
            let mut next = current.to_vec();
            if let Some(pos) = next.iter().position(|r| r.id() == id) {
                next[pos].merge(patch);
            } else {
                next.push(T::from_patch(patch));
            }
            next
        }
    }
}

/// Overlay a partial dashboard on the one already held.
///
/// With nothing held yet the patch is applied over an empty dashboard.
pub fn merge_dashboard(prior: Option<&Dashboard>, patch: DashboardPatch) -> Dashboard {
    let mut next = prior.cloned().unwrap_or_else(|| Dashboard {
        id: patch.id.unwrap_or_default(),
        name: String::new(),
        widgets: Vec::new(),
        family: serde_json::Value::Null,
        is_default: false,
    });
    if let Some(id) = patch.id {
        next.id = id;
    }
    if let Some(name) = patch.name {
        next.name = name;
    }
    if let Some(widgets) = patch.widgets {
        next.widgets = widgets;
    }
    if let Some(family) = patch.family {
        next.family = family;
    }
    if let Some(is_default) = patch.is_default {
        next.is_default = is_default;
    }
    next
}
