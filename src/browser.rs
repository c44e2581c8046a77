/// Browser-backed implementations of the storage, host and bus seams, plus
/// the background entry points the extension's service worker calls into.
use log::debug;
use wasm_bindgen::prelude::*;

use crate::background;
use crate::events::{log_undeliverable, BusEvent, EventBus};
use crate::host::{CreateTab, LiveTab, TabUpdate, WindowHost, WindowInfo};
use crate::store::StorageBackend;
use crate::topic::{TabId, WindowId};
use crate::{Error, Result};

// Import JS bridge functions
#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    fn extensionUiUrl() -> String;

    #[wasm_bindgen(catch)]
    async fn getAllWindows() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getCurrentWindow() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn createWindow() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn focusWindow(window_id: i32) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getWindowTabs(window_id: i32) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn createTab(options: JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeTab(tab_id: i32) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateTab(tab_id: i32, props: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn moveTab(tab_id: i32, index: i32) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendRuntimeMessage(message: JsValue) -> std::result::Result<(), JsValue>;

    pub fn onRuntimeMessage(callback: &js_sys::Function);
}

fn host_err(context: &str, err: JsValue) -> Error {
    Error::Host(format!("{}: {:?}", context, err))
}

fn decode<T: serde::de::DeserializeOwned>(context: &str, value: JsValue) -> Result<T> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|err| Error::Host(format!("{}: decode failed: {:?}", context, err)))
}

fn encode<T: serde::Serialize>(context: &str, value: &T) -> Result<JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| Error::Host(format!("{}: encode failed: {:?}", context, err)))
}

/// Live browser windows and tabs, reached through the bridge.
pub struct BrowserHost {
    ui_url: String,
}

impl BrowserHost {
    pub fn new() -> Self {
        BrowserHost {
            ui_url: extensionUiUrl(),
        }
    }
}

impl Default for BrowserHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for BrowserHost {
    fn ui_url(&self) -> String {
        self.ui_url.clone()
    }

    async fn all_windows(&self) -> Result<Vec<WindowInfo>> {
        let value = getAllWindows().await.map_err(|e| host_err("getAllWindows", e))?;
        decode("getAllWindows", value)
    }

    async fn current_window(&self) -> Result<WindowInfo> {
        let value = getCurrentWindow()
            .await
            .map_err(|e| host_err("getCurrentWindow", e))?;
        decode("getCurrentWindow", value)
    }

    async fn create_window(&self) -> Result<WindowInfo> {
        let value = createWindow().await.map_err(|e| host_err("createWindow", e))?;
        decode("createWindow", value)
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<()> {
        focusWindow(window_id)
            .await
            .map_err(|e| host_err("focusWindow", e))
    }

    async fn window_tabs(&self, window_id: WindowId) -> Result<Vec<LiveTab>> {
        let value = getWindowTabs(window_id)
            .await
            .map_err(|e| host_err("getWindowTabs", e))?;
        decode("getWindowTabs", value)
    }

    async fn create_tab(&self, options: CreateTab) -> Result<LiveTab> {
        let value = createTab(encode("createTab", &options)?)
            .await
            .map_err(|e| host_err("createTab", e))?;
        decode("createTab", value)
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
        removeTab(tab_id).await.map_err(|e| host_err("removeTab", e))
    }

    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<()> {
        updateTab(tab_id, encode("updateTab", &update)?)
            .await
            .map_err(|e| host_err("updateTab", e))
    }

    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<()> {
        moveTab(tab_id, index).await.map_err(|e| host_err("moveTab", e))
    }
}

/// `chrome.storage.local`, string values under string keys.
pub struct BrowserBackend;

impl StorageBackend for BrowserBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let value = getStorage(key)
            .await
            .map_err(|e| Error::Storage(format!("getStorage({}): {:?}", key, e)))?;
        if value.is_null() || value.is_undefined() {
            Ok(None)
        } else {
            Ok(value.as_string())
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        setStorage(key, value)
            .await
            .map_err(|e| Error::Storage(format!("setStorage({}): {:?}", key, e)))
    }
}

/// Runtime-message broadcast channel. Delivery failure (no popup open) is
/// logged and swallowed; it must never surface to the caller.
pub struct RuntimeBus;

impl EventBus for RuntimeBus {
    async fn broadcast(&self, event: &BusEvent) {
        let message = match serde_wasm_bindgen::to_value(event) {
            Ok(value) => value,
            Err(err) => {
                log_undeliverable(event, &format!("encode failed: {:?}", err));
                return;
            }
        };
        if let Err(err) = sendRuntimeMessage(message).await {
            log_undeliverable(event, &format!("{:?}", err));
        }
    }
}

/// Subscribe the popup to runtime messages. The callback receives the raw
/// `{action, detail}` object; undecodable messages are dropped with a log
/// line (another page may speak a newer dialect).
pub fn subscribe_bus_events<F>(on_event: F)
where
    F: Fn(BusEvent) + 'static,
{
    let closure = Closure::wrap(Box::new(move |message: JsValue| {
        match serde_wasm_bindgen::from_value::<BusEvent>(message) {
            Ok(event) => on_event(event),
            Err(err) => debug!("bus: ignored undecodable message: {:?}", err),
        }
    }) as Box<dyn Fn(JsValue)>);
    onRuntimeMessage(closure.as_ref().unchecked_ref());
    closure.forget();
}

// Background entry points, called by js/background.js listeners.

#[wasm_bindgen]
pub async fn bg_window_created(window: JsValue) -> std::result::Result<(), JsValue> {
    let window: WindowInfo =
        decode("bg_window_created", window).map_err(|e| JsValue::from_str(&e.to_string()))?;
    background::on_window_created(&BrowserHost::new(), &RuntimeBus, window)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub async fn bg_window_removed(window_id: i32) {
    background::on_window_removed(&RuntimeBus, window_id).await;
}

#[wasm_bindgen]
pub async fn bg_tab_created(tab: JsValue) -> std::result::Result<(), JsValue> {
    let tab: LiveTab =
        decode("bg_tab_created", tab).map_err(|e| JsValue::from_str(&e.to_string()))?;
    background::on_tab_created(&RuntimeBus, tab).await;
    Ok(())
}

#[wasm_bindgen]
pub async fn bg_tab_removed(tab_id: i32, window_id: i32, is_window_closing: bool) {
    background::on_tab_removed(&RuntimeBus, tab_id, window_id, is_window_closing).await;
}

#[wasm_bindgen]
pub async fn bg_tab_moved(tab_id: i32, window_id: i32, from_index: i32, to_index: i32) {
    background::on_tab_moved(&RuntimeBus, tab_id, window_id, from_index, to_index).await;
}

#[wasm_bindgen]
pub async fn bg_tab_updated(tab: JsValue, complete: bool) -> std::result::Result<(), JsValue> {
    let tab: LiveTab =
        decode("bg_tab_updated", tab).map_err(|e| JsValue::from_str(&e.to_string()))?;
    background::on_tab_updated(&RuntimeBus, tab, complete).await;
    Ok(())
}

#[wasm_bindgen]
pub async fn bg_tab_replaced(added_tab_id: i32, removed_tab_id: i32) {
    background::on_tab_replaced(&RuntimeBus, added_tab_id, removed_tab_id).await;
}

/// Handle a `CreateWindow` request from a popup; returns the new window id.
#[wasm_bindgen]
pub async fn bg_create_window() -> std::result::Result<i32, JsValue> {
    let window = background::create_window_with_ui(&BrowserHost::new())
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(window.id)
}

/// A window appeared (or the toolbar icon was clicked): make sure its pinned
/// UI tab exists.
#[wasm_bindgen]
pub async fn bg_ensure_ui_tab(window_id: i32) -> std::result::Result<(), JsValue> {
    background::ensure_singleton_tab(&BrowserHost::new(), window_id)
        .await
        .map(|_| ())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
