/// Window/tab host surface: the slice of the browser API the core needs,
/// behind a trait so the reconciliation logic runs against a live browser
/// or an in-memory simulation.
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use crate::i18n::translate;
use crate::topic::{TabId, WindowId};
use crate::util::{display_host, truncate};
use crate::{Error, Result};

/// A live browser window, as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
}

/// A live browser tab. Identity is the browser-assigned id, which is not
/// stable across tab replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTab {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: i32,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub audible: bool,
}

/// Options for creating a tab.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTab {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub active: bool,
    pub pinned: bool,
}

/// Mutable tab properties; `None` leaves the property alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_discardable: Option<bool>,
}

/// Host API for querying and mutating browser windows and tabs.
/// Every call may suspend; none are cancellable.
pub trait WindowHost {
    /// URL prefix of the extension's own UI page; tabs under it are
    /// extension-internal and never persisted.
    fn ui_url(&self) -> String;

    async fn all_windows(&self) -> Result<Vec<WindowInfo>>;
    async fn current_window(&self) -> Result<WindowInfo>;
    async fn create_window(&self) -> Result<WindowInfo>;
    async fn focus_window(&self, window_id: WindowId) -> Result<()>;

    /// All tabs of the window, extension pages included.
    async fn window_tabs(&self, window_id: WindowId) -> Result<Vec<LiveTab>>;
    async fn create_tab(&self, options: CreateTab) -> Result<LiveTab>;
    async fn remove_tab(&self, tab_id: TabId) -> Result<()>;
    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<()>;
    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<()>;
}

impl<T: WindowHost> WindowHost for &T {
    fn ui_url(&self) -> String {
        (*self).ui_url()
    }

    async fn all_windows(&self) -> Result<Vec<WindowInfo>> {
        (*self).all_windows().await
    }

    async fn current_window(&self) -> Result<WindowInfo> {
        (*self).current_window().await
    }

    async fn create_window(&self) -> Result<WindowInfo> {
        (*self).create_window().await
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<()> {
        (*self).focus_window(window_id).await
    }

    async fn window_tabs(&self, window_id: WindowId) -> Result<Vec<LiveTab>> {
        (*self).window_tabs(window_id).await
    }

    async fn create_tab(&self, options: CreateTab) -> Result<LiveTab> {
        (*self).create_tab(options).await
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
        (*self).remove_tab(tab_id).await
    }

    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<()> {
        (*self).update_tab(tab_id, update).await
    }

    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<()> {
        (*self).move_tab(tab_id, index).await
    }
}

/// Sidebar title for a plain browsing window: hostname of the first unpinned
/// page plus an overflow count, e.g. "github.com +2".
pub fn window_title(tabs: &[LiveTab], ui_url: &str) -> String {
    let pages: Vec<&LiveTab> = tabs.iter().filter(|t| !t.url.starts_with(ui_url)).collect();
    let title = pages
        .iter()
        .filter(|t| !t.pinned)
        .find_map(|t| display_host(&t.url))
        .map(|host| truncate(&host, 14))
        .unwrap_or_default();
    if pages.is_empty() || title.is_empty() {
        translate("newWindow", "New Window")
    } else if pages.len() == 1 {
        title
    } else {
        format!("{} +{}", title, pages.len() - 1)
    }
}

#[derive(Default)]
struct HostState {
    windows: Vec<WindowInfo>,
    tabs: Vec<LiveTab>,
    next_window_id: WindowId,
    next_tab_id: TabId,
}

/// In-memory window/tab host. Drives the core on the native target where no
/// browser exists; tests build scenarios directly against it.
pub struct MemoryHost {
    ui_url: String,
    state: RefCell<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost {
            ui_url: "ext://tab-topics/popup.html".to_string(),
            state: RefCell::new(HostState {
                windows: Vec::new(),
                tabs: Vec::new(),
                next_window_id: 1,
                next_tab_id: 1,
            }),
        }
    }

    /// Open a window pre-populated with one tab per URL. Titles mirror URLs.
    pub fn open_window(&self, urls: &[&str]) -> WindowId {
        let mut state = self.state.borrow_mut();
        let window_id = state.next_window_id;
        state.next_window_id += 1;
        for window in &mut state.windows {
            window.focused = false;
        }
        state.windows.push(WindowInfo {
            id: window_id,
            focused: true,
        });
        for (index, url) in urls.iter().enumerate() {
            let id = state.next_tab_id;
            state.next_tab_id += 1;
            state.tabs.push(LiveTab {
                id,
                window_id,
                index: index as i32,
                url: url.to_string(),
                title: url.to_string(),
                active: index == 0,
                pinned: false,
                highlighted: index == 0,
                fav_icon_url: None,
                discarded: false,
                audible: false,
            });
        }
        window_id
    }

    /// Drop a window and its tabs, as if the user closed it.
    pub fn close_window(&self, window_id: WindowId) {
        let mut state = self.state.borrow_mut();
        state.windows.retain(|w| w.id != window_id);
        state.tabs.retain(|t| t.window_id != window_id);
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.focused)
            .map(|w| w.id)
    }

    fn reindex(state: &mut HostState, window_id: WindowId) {
        let mut index = 0;
        for tab in state.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.index = index;
            index += 1;
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for MemoryHost {
    fn ui_url(&self) -> String {
        self.ui_url.clone()
    }

    async fn all_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.state.borrow().windows.clone())
    }

    async fn current_window(&self) -> Result<WindowInfo> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|w| w.focused)
            .cloned()
            .ok_or_else(|| Error::Host("no focused window".to_string()))
    }

    async fn create_window(&self) -> Result<WindowInfo> {
        // a fresh browser window starts with one blank tab
        let window_id = self.open_window(&["about:newtab"]);
        Ok(WindowInfo {
            id: window_id,
            focused: true,
        })
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.windows.iter().any(|w| w.id == window_id) {
            return Err(Error::Host(format!("no such window: {}", window_id)));
        }
        for window in &mut state.windows {
            window.focused = window.id == window_id;
        }
        Ok(())
    }

    async fn window_tabs(&self, window_id: WindowId) -> Result<Vec<LiveTab>> {
        let state = self.state.borrow();
        if !state.windows.iter().any(|w| w.id == window_id) {
            return Err(Error::Host(format!("no such window: {}", window_id)));
        }
        let mut tabs: Vec<LiveTab> = state
            .tabs
            .iter()
            .filter(|t| t.window_id == window_id)
            .cloned()
            .collect();
        tabs.sort_by_key(|t| t.index);
        Ok(tabs)
    }

    async fn create_tab(&self, options: CreateTab) -> Result<LiveTab> {
        let mut state = self.state.borrow_mut();
        let window_id = match options.window_id {
            Some(id) => id,
            None => state
                .windows
                .iter()
                .find(|w| w.focused)
                .map(|w| w.id)
                .ok_or_else(|| Error::Host("no focused window".to_string()))?,
        };
        if !state.windows.iter().any(|w| w.id == window_id) {
            return Err(Error::Host(format!("no such window: {}", window_id)));
        }
        let id = state.next_tab_id;
        state.next_tab_id += 1;
        let index = state
            .tabs
            .iter()
            .filter(|t| t.window_id == window_id)
            .count() as i32;
        if options.active {
            for tab in state.tabs.iter_mut().filter(|t| t.window_id == window_id) {
                tab.active = false;
            }
        }
        let url = options.url.unwrap_or_else(|| "about:newtab".to_string());
        let tab = LiveTab {
            id,
            window_id,
            index,
            title: url.clone(),
            url,
            active: options.active,
            pinned: options.pinned,
            highlighted: options.active,
            fav_icon_url: None,
            discarded: false,
            audible: false,
        };
        state.tabs.push(tab.clone());
        Ok(tab)
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(tab) = state.tabs.iter().find(|t| t.id == tab_id).cloned() else {
            return Err(Error::Host(format!("no such tab: {}", tab_id)));
        };
        state.tabs.retain(|t| t.id != tab_id);
        Self::reindex(&mut state, tab.window_id);
        Ok(())
    }

    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(position) = state.tabs.iter().position(|t| t.id == tab_id) else {
            return Err(Error::Host(format!("no such tab: {}", tab_id)));
        };
        if update.active == Some(true) {
            let window_id = state.tabs[position].window_id;
            for tab in state.tabs.iter_mut().filter(|t| t.window_id == window_id) {
                tab.active = false;
            }
        }
        let tab = &mut state.tabs[position];
        if let Some(active) = update.active {
            tab.active = active;
        }
        if let Some(pinned) = update.pinned {
            tab.pinned = pinned;
        }
        if let Some(highlighted) = update.highlighted {
            tab.highlighted = highlighted;
        }
        Ok(())
    }

    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(tab) = state.tabs.iter().find(|t| t.id == tab_id).cloned() else {
            return Err(Error::Host(format!("no such tab: {}", tab_id)));
        };
        let mut ordered: Vec<LiveTab> = state
            .tabs
            .iter()
            .filter(|t| t.window_id == tab.window_id)
            .cloned()
            .collect();
        ordered.sort_by_key(|t| t.index);
        ordered.retain(|t| t.id != tab_id);
        let slot = (index.max(0) as usize).min(ordered.len());
        ordered.insert(slot, tab.clone());
        for (new_index, entry) in ordered.iter().enumerate() {
            if let Some(stored) = state.tabs.iter_mut().find(|t| t.id == entry.id) {
                stored.index = new_index as i32;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(url: &str, pinned: bool) -> LiveTab {
        LiveTab {
            id: 1,
            window_id: 1,
            index: 0,
            url: url.to_string(),
            title: url.to_string(),
            active: false,
            pinned,
            highlighted: false,
            fav_icon_url: None,
            discarded: false,
            audible: false,
        }
    }

    #[test]
    fn test_window_title_empty_window() {
        assert_eq!(window_title(&[], "ext://x/"), "New Window");
    }

    #[test]
    fn test_window_title_ignores_extension_tab() {
        let tabs = vec![tab("ext://x/popup.html", true), tab("https://github.com/", false)];
        assert_eq!(window_title(&tabs, "ext://x/"), "github.com");
    }

    #[test]
    fn test_window_title_overflow_count() {
        let tabs = vec![
            tab("https://www.github.com/", false),
            tab("https://docs.example.org/", false),
            tab("https://mail.example.org/", false),
        ];
        assert_eq!(window_title(&tabs, "ext://x/"), "github.com +2");
    }

    #[tokio::test]
    async fn test_memory_host_window_and_tab_lifecycle() {
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a.example/", "https://b.example/"]);
        let tabs = host.window_tabs(win).await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[1].index, 1);

        host.remove_tab(tabs[0].id).await.unwrap();
        let tabs = host.window_tabs(win).await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].index, 0);

        host.close_window(win);
        assert!(host.window_tabs(win).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_host_move_tab_reindexes() {
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a/", "https://b/", "https://c/"]);
        let tabs = host.window_tabs(win).await.unwrap();
        host.move_tab(tabs[0].id, 2).await.unwrap();
        let urls: Vec<String> = host
            .window_tabs(win)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.url)
            .collect();
        assert_eq!(urls, vec!["https://b/", "https://c/", "https://a/"]);
    }

    #[tokio::test]
    async fn test_memory_host_focus_tracking() {
        let host = MemoryHost::new();
        let first = host.open_window(&["https://a/"]);
        let second = host.open_window(&["https://b/"]);
        assert_eq!(host.focused_window(), Some(second));
        host.focus_window(first).await.unwrap();
        assert_eq!(host.current_window().await.unwrap().id, first);
    }
}
