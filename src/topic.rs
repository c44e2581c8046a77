/// Data structures for Tab Topics: the persisted Topic record and its parts
use serde::{Deserialize, Serialize};

use crate::util::{display_host, maybe_pluralize, truncate};
use crate::{Error, Result};

/// Store-assigned Topic id, stable for the record's lifetime.
pub type TopicId = u32;
/// Browser-assigned window id.
pub type WindowId = i32;
/// Browser-assigned tab id. Not stable across tab replacement.
pub type TabId = i32;

/// New Topics sort last until the user reorders them.
pub const ORDER_LAST: u32 = 255;

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 32;

/// Sanitized snapshot of one live tab, as persisted on a Topic.
/// Exactly these fields; nothing extension-internal is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub active: bool,
    pub index: i32,
    pub pinned: bool,
    pub selected: bool,
    pub title: String,
    pub url: String,
}

/// A tab the user pinned permanently to a Topic, independent of live tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub created_time: f64,
    pub title: String,
    pub url: String,
    pub fav_src: String,
}

/// A persisted, named, colored group of tabs, optionally bound to a live window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub color: String,
    pub order: u32,
    /// Live window currently bound to this Topic. Stale-tolerant cache:
    /// set at load time, cleared at close time, re-validated by the matcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default)]
    pub tabs: Vec<TabSnapshot>,
    #[serde(default)]
    pub favorites: Vec<Favorite>,
    pub created_time: f64,
    /// Soft-delete timestamp; present means the Topic is trashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<f64>,
}

impl Topic {
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    /// One-line tab summary for the sidebar, e.g. "github.com +3 other tabs".
    pub fn info_line(&self) -> String {
        let count = self.tabs.len();
        if count == 0 {
            return "no tabs open".to_string();
        }
        let mut info = self
            .tabs
            .iter()
            .filter(|tab| !tab.pinned)
            .find_map(|tab| display_host(&tab.url))
            .map(|host| truncate(&host, 20))
            .unwrap_or_default();
        if count > 1 {
            let more = maybe_pluralize(count - 1, "other tab", "s");
            info = format!("{} +{}", info, more);
        }
        info
    }
}

/// Fields needed to create a new Topic record. The store assigns id and order.
#[derive(Debug, Clone)]
pub struct TopicDraft {
    pub name: String,
    pub color: String,
    pub window_id: Option<WindowId>,
    pub tabs: Vec<TabSnapshot>,
    pub favorites: Vec<Favorite>,
    pub created_time: f64,
}

impl TopicDraft {
    pub fn new(name: &str, color: &str, created_time: f64) -> Self {
        TopicDraft {
            name: name.to_string(),
            color: color.to_string(),
            window_id: None,
            tabs: Vec::new(),
            favorites: Vec::new(),
            created_time,
        }
    }
}

/// Partial update for a Topic record: `None` leaves a field unchanged.
/// The double options carry "set to nothing" for clearable fields.
#[derive(Debug, Clone, Default)]
pub struct TopicPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub order: Option<u32>,
    pub window_id: Option<Option<WindowId>>,
    pub tabs: Option<Vec<TabSnapshot>>,
    pub favorites: Option<Vec<Favorite>>,
    pub deleted: Option<Option<f64>>,
}

impl TopicPatch {
    pub fn tabs(tabs: Vec<TabSnapshot>) -> Self {
        TopicPatch {
            tabs: Some(tabs),
            ..Default::default()
        }
    }

    pub fn bind_window(window_id: WindowId) -> Self {
        TopicPatch {
            window_id: Some(Some(window_id)),
            ..Default::default()
        }
    }

    pub fn clear_window() -> Self {
        TopicPatch {
            window_id: Some(None),
            ..Default::default()
        }
    }
}

/// Validate a user-facing Topic name (explicit create/rename path).
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len < NAME_MIN_LEN || len > NAME_MAX_LEN {
        return Err(Error::Validation(format!(
            "topic name must be {}-{} characters, got {}",
            NAME_MIN_LEN, NAME_MAX_LEN, len
        )));
    }
    Ok(())
}

/// Validate a "#rrggbb" hex color string.
pub fn validate_color(color: &str) -> Result<()> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| Error::Validation(format!("color must start with '#': {}", color)))?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!(
            "color must be #rrggbb, got {}",
            color
        )));
    }
    Ok(())
}
