/// Cross-instance event bus: typed broadcast messages keeping every open
/// popup instance convergent on the same view of topics, windows and tabs.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use crate::host::{LiveTab, WindowInfo};
use crate::topic::{TabId, TabSnapshot, Topic, TopicId, WindowId};

/// One broadcast message. Serialized as `{"action": ..., "detail": ...}`,
/// the shape the runtime message channel carries between extension pages.
/// Each payload holds exactly what receivers need; receivers reconcile
/// idempotently because delivery order across senders is not guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "detail", rename_all_fields = "camelCase")]
pub enum BusEvent {
    TabCreated {
        tab: LiveTab,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
    },
    TabMoved {
        tab_id: TabId,
        window_id: WindowId,
        from_index: i32,
        to_index: i32,
    },
    TabUpdated {
        tab_id: TabId,
        tab: LiveTab,
        /// True when the tab finished loading; receivers refresh titles then.
        complete: bool,
    },
    /// Browser swapped a tab's id (discard/reload cycles). Receivers re-key
    /// their mirror entry; nothing else about the tab changed.
    TabReplaced {
        added_tab_id: TabId,
        removed_tab_id: TabId,
    },
    WindowCreated {
        window: WindowInfo,
    },
    WindowRemoved {
        window_id: WindowId,
        /// Set when the window's representation became a Topic; the window
        /// itself stays open and the Topic must not be touched.
        #[serde(default)]
        converted: bool,
    },
    TopicAdd {
        topic: Topic,
    },
    TopicRemove {
        id: TopicId,
    },
    TopicMove {
        id: TopicId,
        from: usize,
        to: usize,
    },
    TopicInfoUpdated {
        topic_id: TopicId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tabs: Option<Vec<TabSnapshot>>,
    },
    TopicLoaded {
        id: TopicId,
        window_id: WindowId,
    },
    /// Request to the background controller to open a fresh browser window.
    CreateWindow,
    UpdateWindowInfo {
        window_id: WindowId,
    },
}

/// Fire-and-forget broadcast to every other listening instance. Delivery is
/// best-effort: no listeners (no popup open) is normal, never an error.
pub trait EventBus {
    async fn broadcast(&self, event: &BusEvent);
}

impl<T: EventBus> EventBus for &T {
    async fn broadcast(&self, event: &BusEvent) {
        (*self).broadcast(event).await
    }
}

/// Bus that records everything it is asked to send. Used by tests and by
/// headless runs where no runtime channel exists.
#[derive(Default)]
pub struct RecordingBus {
    sent: RefCell<Vec<BusEvent>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<BusEvent> {
        self.sent.borrow().clone()
    }

    pub fn take(&self) -> Vec<BusEvent> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl EventBus for RecordingBus {
    async fn broadcast(&self, event: &BusEvent) {
        debug!("bus: recording {:?}", event);
        self.sent.borrow_mut().push(event.clone());
    }
}

/// Diagnostic for a failed delivery. Undeliverable broadcasts are swallowed
/// here and nowhere else.
pub fn log_undeliverable(event: &BusEvent, reason: &str) {
    info!("broadcast undeliverable ({}): {:?}", reason, event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_action_and_detail() {
        let event = BusEvent::TopicRemove { id: 12 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"action":"TopicRemove","detail":{"id":12}}"#);
    }

    #[test]
    fn test_field_names_follow_runtime_convention() {
        let event = BusEvent::TopicLoaded {
            id: 3,
            window_id: 44,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"windowId\":44"));
    }

    #[test]
    fn test_unit_event_has_no_detail() {
        let json = serde_json::to_string(&BusEvent::CreateWindow).unwrap();
        assert_eq!(json, r#"{"action":"CreateWindow"}"#);
    }

    #[test]
    fn test_window_removed_converted_defaults_false() {
        let json = r#"{"action":"WindowRemoved","detail":{"windowId":9}}"#;
        let event: BusEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            BusEvent::WindowRemoved {
                window_id: 9,
                converted: false
            }
        );
    }

    #[test]
    fn test_info_updated_roundtrip_with_partial_fields() {
        let event = BusEvent::TopicInfoUpdated {
            topic_id: 5,
            name: Some("Reading".to_string()),
            color: None,
            tabs: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("color"));
        let back: BusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_recording_bus_keeps_order() {
        let bus = RecordingBus::new();
        bus.broadcast(&BusEvent::CreateWindow).await;
        bus.broadcast(&BusEvent::TopicRemove { id: 1 }).await;
        let sent = bus.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], BusEvent::TopicRemove { id: 1 });
        assert!(bus.sent().is_empty());
    }
}
