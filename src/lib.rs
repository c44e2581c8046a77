/// Tab Topics - Chrome Extension for grouping browser windows into Topics
/// Built with Rust + WASM + Yew

mod background;
pub mod browser;
mod config;
mod events;
mod favicon;
mod host;
mod i18n;
mod lifecycle;
mod matcher;
mod mirror;
mod store;
mod topic;
mod util;
pub mod ui;
mod view;

pub use background::{ensure_singleton_tab, SingletonOutcome};
pub use events::{BusEvent, EventBus, RecordingBus};
pub use favicon::{acronym, font_size_fitting, invert_color, random_color};
pub use host::{LiveTab, MemoryHost, WindowHost, WindowInfo};
pub use store::{MemoryBackend, StorageBackend, TopicQuery, TopicStore};
pub use topic::{Favorite, TabSnapshot, Topic, TopicDraft, TopicPatch};
pub use view::{SideEffect, ViewState};

use wasm_bindgen::prelude::*;

/// Crate-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("browser call failed: {0}")]
    Host(String),

    #[error("tab sync interrupted: {0}")]
    PartialSync(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Start the Yew app for the popup page (one instance per browser window)
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}
