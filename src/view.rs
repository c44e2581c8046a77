/// Per-instance view reconciliation. Every popup instance owns one
/// `ViewState`, feeds every bus event through `apply`, and executes the
/// returned side effects. Instances converge because `apply` is idempotent:
/// an event for an already-known entity is a no-op, an event for a vanished
/// entity is benign.
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::events::{BusEvent, EventBus};
use crate::host::{window_title, LiveTab, WindowHost, WindowInfo};
use crate::matcher::match_window_to_topic;
use crate::mirror::{sync_tabs_coalesced, SyncGate};
use crate::store::{StorageBackend, TopicStore};
use crate::topic::{Topic, TopicId, TopicPatch, WindowId};
use crate::Result;

/// Work an event handler cannot do synchronously: store writes, host
/// queries, re-broadcasts. Returned by `apply`, executed by `run_effects`.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Re-read the ordered topic list from the store.
    ReloadTopics,
    /// Mirror the window's live tabs onto its Topic record.
    SyncTopicTabs {
        topic_id: TopicId,
        window_id: WindowId,
    },
    /// Persist the removal of a Topic's window binding.
    ClearTopicBinding { topic_id: TopicId },
    /// Recompute the cached sidebar title for a window.
    RefreshWindowTitle { window_id: WindowId },
    /// Relay an event to the other instances.
    Broadcast(BusEvent),
}

/// In-memory model of what this popup instance shows: the ordered Topics,
/// the plain browsing windows, and the live tabs of the instance's own
/// window.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub current_window: WindowId,
    pub current_topic: Option<TopicId>,
    pub topics: Vec<Topic>,
    pub windows: Vec<WindowInfo>,
    pub tabs: Vec<LiveTab>,
    /// Sidebar titles for plain windows, filled by `RefreshWindowTitle`.
    pub titles: HashMap<WindowId, String>,
}

impl ViewState {
    /// Build the startup view for the instance running in `current`:
    /// resolve the window's own Topic identity, list topics, and list the
    /// windows no topic claims.
    pub async fn bootstrap<B, H>(store: &TopicStore<B>, host: &H) -> Result<ViewState>
    where
        B: StorageBackend,
        H: WindowHost,
    {
        let current = host.current_window().await?;
        let current_topic = match_window_to_topic(store, host, current.id).await?;
        let topics = store.ordered_all().await?;

        let mut windows = Vec::new();
        let mut titles = HashMap::new();
        for window in host.all_windows().await? {
            if topics.iter().any(|t| t.window_id == Some(window.id)) {
                continue;
            }
            if let Ok(tabs) = host.window_tabs(window.id).await {
                titles.insert(window.id, window_title(&tabs, &host.ui_url()));
            }
            windows.push(window);
        }
        let tabs = host.window_tabs(current.id).await?;

        debug!(
            "view: bootstrap window={} topic={:?} ({} topics, {} plain windows)",
            current.id,
            current_topic.as_ref().map(|t| t.id),
            topics.len(),
            windows.len()
        );
        Ok(ViewState {
            current_window: current.id,
            current_topic: current_topic.map(|t| t.id),
            topics,
            windows,
            tabs,
            titles,
        })
    }

    fn topic_for_window(&self, window_id: WindowId) -> Option<TopicId> {
        self.topics
            .iter()
            .find(|t| t.window_id == Some(window_id))
            .map(|t| t.id)
    }

    fn renumber_tabs(&mut self) {
        for (index, tab) in self.tabs.iter_mut().enumerate() {
            tab.index = index as i32;
        }
    }

    /// Effects fired when this instance's own window content changed.
    fn own_window_changed(&self) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if let Some(topic_id) = self.current_topic {
            effects.push(SideEffect::SyncTopicTabs {
                topic_id,
                window_id: self.current_window,
            });
        }
        effects.push(SideEffect::RefreshWindowTitle {
            window_id: self.current_window,
        });
        effects.push(SideEffect::Broadcast(BusEvent::UpdateWindowInfo {
            window_id: self.current_window,
        }));
        effects
    }

    /// Fold one bus event into the view. Returns the side effects the
    /// instance must execute; pure otherwise.
    pub fn apply(&mut self, event: &BusEvent) -> Vec<SideEffect> {
        match event {
            BusEvent::TopicAdd { topic } => {
                if topic.is_deleted() {
                    debug!("view: TopicAdd skipped for trashed topic {}", topic.id);
                    return Vec::new();
                }
                if self.topics.iter().any(|t| t.id == topic.id) {
                    return Vec::new();
                }
                // a converted window stops being a plain window
                if let Some(window_id) = topic.window_id {
                    self.windows.retain(|w| w.id != window_id);
                    self.titles.remove(&window_id);
                    if window_id == self.current_window {
                        self.current_topic = Some(topic.id);
                    }
                }
                self.topics.push(topic.clone());
                Vec::new()
            }
            BusEvent::TopicRemove { id } => {
                self.topics.retain(|t| t.id != *id);
                if self.current_topic == Some(*id) {
                    self.current_topic = None;
                }
                Vec::new()
            }
            BusEvent::TopicMove { id, from, to } => {
                debug!("view: topic {} moved {} -> {}", id, from, to);
                vec![SideEffect::ReloadTopics]
            }
            BusEvent::TopicInfoUpdated {
                topic_id,
                name,
                color,
                tabs,
            } => {
                let Some(topic) = self.topics.iter_mut().find(|t| t.id == *topic_id) else {
                    // likely already removed by a racing instance
                    info!("view: TopicInfoUpdated for unknown topic {}", topic_id);
                    return Vec::new();
                };
                if let Some(name) = name {
                    topic.name = name.clone();
                }
                if let Some(color) = color {
                    topic.color = color.clone();
                }
                if let Some(tabs) = tabs {
                    topic.tabs = tabs.clone();
                }
                Vec::new()
            }
            BusEvent::TopicLoaded { id, window_id } => {
                // a WindowCreated may have arrived first; drop the wrong entry
                self.windows.retain(|w| w.id != *window_id);
                self.titles.remove(window_id);
                if let Some(topic) = self.topics.iter_mut().find(|t| t.id == *id) {
                    topic.window_id = Some(*window_id);
                }
                Vec::new()
            }
            BusEvent::WindowCreated { window } => {
                if self.windows.iter().any(|w| w.id == window.id) {
                    // session restore re-announces windows we already track
                    debug!("view: WindowCreated ignored for known window {}", window.id);
                    return Vec::new();
                }
                if self.topic_for_window(window.id).is_some() {
                    // a loaded Topic's window is not a plain browsing window
                    return Vec::new();
                }
                self.windows.push(window.clone());
                vec![SideEffect::RefreshWindowTitle {
                    window_id: window.id,
                }]
            }
            BusEvent::WindowRemoved {
                window_id,
                converted,
            } => {
                let mut effects = Vec::new();
                if !converted {
                    if let Some(topic_id) = self.topic_for_window(*window_id) {
                        if let Some(topic) =
                            self.topics.iter_mut().find(|t| t.id == topic_id)
                        {
                            topic.window_id = None;
                        }
                        effects.push(SideEffect::ClearTopicBinding { topic_id });
                    }
                }
                self.windows.retain(|w| w.id != *window_id);
                self.titles.remove(window_id);
                effects
            }
            BusEvent::UpdateWindowInfo { window_id } => {
                vec![SideEffect::RefreshWindowTitle {
                    window_id: *window_id,
                }]
            }
            BusEvent::TabCreated { tab } => {
                if tab.window_id != self.current_window {
                    return Vec::new();
                }
                if self.tabs.iter().any(|t| t.id == tab.id) {
                    return Vec::new();
                }
                let slot = (tab.index.max(0) as usize).min(self.tabs.len());
                self.tabs.insert(slot, tab.clone());
                self.renumber_tabs();
                self.own_window_changed()
            }
            BusEvent::TabRemoved { tab_id, window_id } => {
                if *window_id != self.current_window {
                    return Vec::new();
                }
                let before = self.tabs.len();
                self.tabs.retain(|t| t.id != *tab_id);
                if self.tabs.len() == before {
                    return Vec::new();
                }
                self.renumber_tabs();
                self.own_window_changed()
            }
            BusEvent::TabMoved {
                tab_id,
                window_id,
                to_index,
                ..
            } => {
                if *window_id != self.current_window {
                    return Vec::new();
                }
                let Some(position) = self.tabs.iter().position(|t| t.id == *tab_id) else {
                    return Vec::new();
                };
                let tab = self.tabs.remove(position);
                let slot = (*to_index).max(0) as usize;
                self.tabs.insert(slot.min(self.tabs.len()), tab);
                self.renumber_tabs();
                self.own_window_changed()
            }
            BusEvent::TabUpdated { tab_id, tab, complete } => {
                if tab.window_id != self.current_window {
                    return Vec::new();
                }
                let Some(entry) = self.tabs.iter_mut().find(|t| t.id == *tab_id) else {
                    return Vec::new();
                };
                let index = entry.index;
                *entry = tab.clone();
                entry.index = index;
                if *complete {
                    self.own_window_changed()
                } else if let Some(topic_id) = self.current_topic {
                    // keep mirroring during loads; titles wait for complete
                    vec![SideEffect::SyncTopicTabs {
                        topic_id,
                        window_id: self.current_window,
                    }]
                } else {
                    Vec::new()
                }
            }
            BusEvent::TabReplaced {
                added_tab_id,
                removed_tab_id,
            } => {
                // discard/reload swapped the browser-assigned id; re-key only
                if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == *removed_tab_id) {
                    debug!(
                        "view: tab {} re-identified as {}",
                        removed_tab_id, added_tab_id
                    );
                    tab.id = *added_tab_id;
                }
                Vec::new()
            }
            BusEvent::CreateWindow => Vec::new(),
        }
    }
}

/// Execute side effects against the store/host/bus. Failures degrade to a
/// log line and leave prior state unchanged; nothing here may take down the
/// instance.
pub async fn run_effects<B, H, E>(
    view: &mut ViewState,
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    gate: &SyncGate,
    effects: Vec<SideEffect>,
) where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    for effect in effects {
        match effect {
            SideEffect::ReloadTopics => match store.ordered_all().await {
                Ok(topics) => view.topics = topics,
                Err(err) => warn!("view: topic reload failed: {}", err),
            },
            SideEffect::SyncTopicTabs {
                topic_id,
                window_id,
            } => {
                if let Err(err) =
                    sync_tabs_coalesced(gate, store, host, bus, topic_id, window_id).await
                {
                    // the next triggering event re-syncs to a consistent state
                    info!("view: tab sync deferred for topic {}: {}", topic_id, err);
                }
            }
            SideEffect::ClearTopicBinding { topic_id } => {
                if let Err(err) = store.update(topic_id, TopicPatch::clear_window()).await {
                    warn!("view: clearing binding of topic {} failed: {}", topic_id, err);
                }
            }
            SideEffect::RefreshWindowTitle { window_id } => {
                match host.window_tabs(window_id).await {
                    Ok(tabs) => {
                        view.titles
                            .insert(window_id, window_title(&tabs, &host.ui_url()));
                    }
                    Err(_) => {
                        // window already gone
                        view.titles.remove(&window_id);
                    }
                }
            }
            SideEffect::Broadcast(event) => bus.broadcast(&event).await,
        }
    }
}

/// Fold an incoming event into the view and execute everything it implies.
pub async fn handle_event<B, H, E>(
    view: &mut ViewState,
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    gate: &SyncGate,
    event: &BusEvent,
) where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    let effects = view.apply(event);
    run_effects(view, store, host, bus, gate, effects).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingBus;
    use crate::host::MemoryHost;
    use crate::lifecycle::{convert_window_to_topic, create_topic};
    use crate::store::MemoryBackend;

    async fn bootstrapped(
        store: &TopicStore<MemoryBackend>,
        host: &MemoryHost,
    ) -> ViewState {
        ViewState::bootstrap(store, host).await.unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_partitions_windows_and_topics() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();

        let topic_win = host.open_window(&["https://work.example/"]);
        let topic = convert_window_to_topic(&store, &host, &bus, topic_win)
            .await
            .unwrap();
        let plain_win = host.open_window(&["https://news.example/"]);
        host.focus_window(plain_win).await.unwrap();

        let view = bootstrapped(&store, &host).await;
        assert_eq!(view.current_window, plain_win);
        assert_eq!(view.current_topic, None);
        assert_eq!(view.topics.len(), 1);
        assert_eq!(view.topics[0].id, topic.id);
        // the topic-bound window is not listed as a plain window
        let plain_ids: Vec<WindowId> = view.windows.iter().map(|w| w.id).collect();
        assert_eq!(plain_ids, vec![plain_win]);
        assert_eq!(
            view.titles.get(&plain_win).map(String::as_str),
            Some("news.example")
        );
    }

    #[tokio::test]
    async fn test_bootstrap_detects_own_topic() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        let win = host.open_window(&["https://work.example/"]);
        let topic = convert_window_to_topic(&store, &host, &bus, win)
            .await
            .unwrap();

        let view = bootstrapped(&store, &host).await;
        assert_eq!(view.current_topic, Some(topic.id));
    }

    #[tokio::test]
    async fn test_topic_add_is_idempotent_and_claims_window() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        host.open_window(&["https://a/"]);
        let mut view = bootstrapped(&store, &host).await;
        let other_win = view.current_window + 10;
        view.windows.push(WindowInfo {
            id: other_win,
            focused: false,
        });

        let topic = create_topic(&store, &bus, "Work", "#336699").await.unwrap();
        let mut announced = topic.clone();
        announced.window_id = Some(other_win);

        let event = BusEvent::TopicAdd { topic: announced };
        assert!(view.apply(&event).is_empty());
        assert_eq!(view.topics.len(), 1);
        // converted window left the plain list
        assert!(!view.windows.iter().any(|w| w.id == other_win));
        // replaying the same event changes nothing
        assert!(view.apply(&event).is_empty());
        assert_eq!(view.topics.len(), 1);
    }

    #[tokio::test]
    async fn test_window_created_idempotent() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        host.open_window(&["https://a/"]);
        let mut view = bootstrapped(&store, &host).await;
        let window = WindowInfo {
            id: 77,
            focused: false,
        };

        let effects = view.apply(&BusEvent::WindowCreated {
            window: window.clone(),
        });
        assert_eq!(
            effects,
            vec![SideEffect::RefreshWindowTitle { window_id: 77 }]
        );
        // second announcement (session restore) is a no-op
        assert!(view
            .apply(&BusEvent::WindowCreated { window })
            .is_empty());
        assert_eq!(view.windows.iter().filter(|w| w.id == 77).count(), 1);
    }

    #[tokio::test]
    async fn test_window_removed_clears_topic_binding() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        let topic_win = host.open_window(&["https://work.example/"]);
        let topic = convert_window_to_topic(&store, &host, &bus, topic_win)
            .await
            .unwrap();
        let own = host.open_window(&["https://me.example/"]);
        host.focus_window(own).await.unwrap();
        let mut view = bootstrapped(&store, &host).await;

        host.close_window(topic_win);
        let gate = SyncGate::new();
        handle_event(
            &mut view,
            &store,
            &host,
            &bus,
            &gate,
            &BusEvent::WindowRemoved {
                window_id: topic_win,
                converted: false,
            },
        )
        .await;

        // in-memory and persisted bindings both cleared
        assert_eq!(view.topics[0].window_id, None);
        let stored = store.get(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.window_id, None);
    }

    #[tokio::test]
    async fn test_window_removed_converted_leaves_topic_alone() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        let win = host.open_window(&["https://work.example/"]);
        let topic = convert_window_to_topic(&store, &host, &bus, win)
            .await
            .unwrap();
        let mut view = bootstrapped(&store, &host).await;

        let effects = view.apply(&BusEvent::WindowRemoved {
            window_id: win,
            converted: true,
        });
        assert!(effects.is_empty());
        assert_eq!(view.topics[0].window_id, Some(win));
        let _ = topic;
    }

    #[tokio::test]
    async fn test_tab_created_syncs_topic_and_relays() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        let win = host.open_window(&["https://work.example/"]);
        let topic = convert_window_to_topic(&store, &host, &bus, win)
            .await
            .unwrap();
        let mut view = bootstrapped(&store, &host).await;
        bus.take();

        let new_tab = host
            .create_tab(crate::host::CreateTab {
                window_id: Some(win),
                url: Some("https://added.example/".to_string()),
                active: false,
                pinned: false,
            })
            .await
            .unwrap();

        let gate = SyncGate::new();
        handle_event(
            &mut view,
            &store,
            &host,
            &bus,
            &gate,
            &BusEvent::TabCreated {
                tab: new_tab.clone(),
            },
        )
        .await;

        assert_eq!(view.tabs.len(), 2);
        // the mirror persisted both tabs
        let stored = store.get(topic.id).await.unwrap().unwrap();
        let urls: Vec<String> = stored.tabs.into_iter().map(|t| t.url).collect();
        assert_eq!(urls, vec!["https://work.example/", "https://added.example/"]);
        // other instances heard about the mirror and the window change
        let sent = bus.sent();
        assert!(sent
            .iter()
            .any(|e| matches!(e, BusEvent::TopicInfoUpdated { .. })));
        assert!(sent
            .iter()
            .any(|e| matches!(e, BusEvent::UpdateWindowInfo { window_id } if *window_id == win)));

        // replaying the created event is a pure no-op
        let effects = view.apply(&BusEvent::TabCreated { tab: new_tab });
        assert!(effects.is_empty());
        assert_eq!(view.tabs.len(), 2);
    }

    #[tokio::test]
    async fn test_tab_events_for_other_windows_ignored() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        host.open_window(&["https://a/"]);
        let mut view = bootstrapped(&store, &host).await;

        let foreign = LiveTab {
            id: 999,
            window_id: view.current_window + 1,
            index: 0,
            url: "https://elsewhere/".to_string(),
            title: String::new(),
            active: false,
            pinned: false,
            highlighted: false,
            fav_icon_url: None,
            discarded: false,
            audible: false,
        };
        assert!(view.apply(&BusEvent::TabCreated { tab: foreign }).is_empty());
        assert_eq!(view.tabs.len(), 1);
    }

    #[tokio::test]
    async fn test_tab_replaced_rekeys_mirror() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        host.open_window(&["https://a/"]);
        let mut view = bootstrapped(&store, &host).await;
        let old_id = view.tabs[0].id;

        let effects = view.apply(&BusEvent::TabReplaced {
            added_tab_id: 4321,
            removed_tab_id: old_id,
        });
        assert!(effects.is_empty());
        assert_eq!(view.tabs[0].id, 4321);
        // unknown old id: benign no-op
        assert!(view
            .apply(&BusEvent::TabReplaced {
                added_tab_id: 1,
                removed_tab_id: old_id,
            })
            .is_empty());
    }

    #[tokio::test]
    async fn test_tab_moved_reorders_view() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a/", "https://b/", "https://c/"]);
        let mut view = bootstrapped(&store, &host).await;
        let first = view.tabs[0].id;

        view.apply(&BusEvent::TabMoved {
            tab_id: first,
            window_id: win,
            from_index: 0,
            to_index: 2,
        });
        let urls: Vec<&str> = view.tabs.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b/", "https://c/", "https://a/"]);
        assert_eq!(view.tabs[2].index, 2);
    }

    #[tokio::test]
    async fn test_topic_move_reloads_from_store() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        host.open_window(&["https://a/"]);
        let a = create_topic(&store, &bus, "Alpha", "#111111").await.unwrap();
        let b = create_topic(&store, &bus, "Beta", "#222222").await.unwrap();
        let mut view = bootstrapped(&store, &host).await;
        assert_eq!(view.topics[0].id, a.id);

        crate::lifecycle::save_topic_order(&store, &[b.id, a.id])
            .await
            .unwrap();
        let gate = SyncGate::new();
        handle_event(
            &mut view,
            &store,
            &host,
            &bus,
            &gate,
            &BusEvent::TopicMove {
                id: b.id,
                from: 1,
                to: 0,
            },
        )
        .await;
        assert_eq!(view.topics[0].id, b.id);
    }

    #[tokio::test]
    async fn test_topic_loaded_moves_window_out_of_plain_list() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        host.open_window(&["https://me/"]);
        let topic = create_topic(&store, &bus, "Work", "#336699").await.unwrap();
        let mut view = bootstrapped(&store, &host).await;
        view.windows.push(WindowInfo {
            id: 55,
            focused: false,
        });

        view.apply(&BusEvent::TopicLoaded {
            id: topic.id,
            window_id: 55,
        });
        assert!(!view.windows.iter().any(|w| w.id == 55));
        assert_eq!(view.topics[0].window_id, Some(55));
    }
}
