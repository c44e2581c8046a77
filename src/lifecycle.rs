/// Topic lifecycle: create, rename, recolor, convert, load, trash, plus the
/// favorite list and sidebar ordering.
use log::{debug, warn};

use crate::events::{BusEvent, EventBus};
use crate::favicon::random_color;
use crate::host::{window_title, CreateTab, WindowHost};
use crate::mirror::sanitize_tabs;
use crate::store::{StorageBackend, TopicStore};
use crate::topic::{
    validate_color, validate_name, Favorite, Topic, TopicDraft, TopicId, TopicPatch, WindowId,
};
use crate::util::now_ms;
use crate::{Error, Result};

/// What `load_topic` did with the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The bound window was still open and has been raised.
    Focused(WindowId),
    /// A new window was created and bound; its own popup instance restores
    /// the tabs.
    Opened(WindowId),
}

fn constraint_to_validation(err: Error) -> Error {
    match err {
        Error::Constraint(msg) => Error::Validation(msg),
        other => other,
    }
}

/// Create a Topic from an explicit name and color. Duplicate names surface
/// as `Validation` so the caller can ask the user for another one; nothing
/// is persisted on failure.
pub async fn create_topic<B, E>(
    store: &TopicStore<B>,
    bus: &E,
    name: &str,
    color: &str,
) -> Result<Topic>
where
    B: StorageBackend,
    E: EventBus,
{
    validate_name(name)?;
    validate_color(color)?;
    let id = store
        .add(TopicDraft::new(name, color, now_ms()))
        .await
        .map_err(constraint_to_validation)?;
    let topic = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} missing after add", id)))?;
    bus.broadcast(&BusEvent::TopicAdd {
        topic: topic.clone(),
    })
    .await;
    Ok(topic)
}

pub async fn rename_topic<B, E>(
    store: &TopicStore<B>,
    bus: &E,
    id: TopicId,
    new_name: &str,
) -> Result<()>
where
    B: StorageBackend,
    E: EventBus,
{
    validate_name(new_name)?;
    let patch = TopicPatch {
        name: Some(new_name.to_string()),
        ..Default::default()
    };
    let updated = store
        .update(id, patch)
        .await
        .map_err(constraint_to_validation)?;
    if updated == 0 {
        return Err(Error::NotFound(format!("topic {} not found for rename", id)));
    }
    bus.broadcast(&BusEvent::TopicInfoUpdated {
        topic_id: id,
        name: Some(new_name.to_string()),
        color: None,
        tabs: None,
    })
    .await;
    Ok(())
}

pub async fn recolor_topic<B, E>(
    store: &TopicStore<B>,
    bus: &E,
    id: TopicId,
    new_color: &str,
) -> Result<()>
where
    B: StorageBackend,
    E: EventBus,
{
    validate_color(new_color)?;
    let patch = TopicPatch {
        color: Some(new_color.to_string()),
        ..Default::default()
    };
    if store.update(id, patch).await? == 0 {
        return Err(Error::NotFound(format!(
            "topic {} not found for recolor",
            id
        )));
    }
    bus.broadcast(&BusEvent::TopicInfoUpdated {
        topic_id: id,
        name: None,
        color: Some(new_color.to_string()),
        tabs: None,
    })
    .await;
    Ok(())
}

/// Turn a plain browsing window into a Topic. The window stays open; only
/// its representation changes, so the `WindowRemoved` that follows the
/// `TopicAdd` is flagged `converted` and receivers leave the new Topic alone.
pub async fn convert_window_to_topic<B, H, E>(
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    window_id: WindowId,
) -> Result<Topic>
where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    let ui_url = host.ui_url();
    let live = host.window_tabs(window_id).await?;
    let name = window_title(&live, &ui_url);
    let mut draft = TopicDraft::new(&name, &random_color(), now_ms());
    draft.window_id = Some(window_id);
    draft.tabs = sanitize_tabs(&live, &ui_url);
    let id = store.add(draft).await.map_err(constraint_to_validation)?;
    let topic = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} missing after convert", id)))?;
    debug!(
        "lifecycle: window {} converted to topic {} ({} tabs)",
        window_id,
        id,
        topic.tabs.len()
    );
    bus.broadcast(&BusEvent::TopicAdd {
        topic: topic.clone(),
    })
    .await;
    bus.broadcast(&BusEvent::WindowRemoved {
        window_id,
        converted: true,
    })
    .await;
    Ok(topic)
}

/// Open a Topic: raise its window when the binding is still live, otherwise
/// create and bind a fresh window. The binding is persisted before any tab
/// restoration starts, so a crash mid-restore leaves a discoverable partial
/// binding instead of an orphan window. Restoration itself belongs to the
/// new window's popup instance (`restore_topic_tabs`).
pub async fn load_topic<B, H, E>(
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    id: TopicId,
) -> Result<LoadOutcome>
where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    let topic = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} not found", id)))?;
    if topic.is_deleted() {
        warn!("lifecycle: refusing to load trashed topic {}", id);
        return Err(Error::NotFound(format!("topic {} is trashed", id)));
    }

    if let Some(window_id) = topic.window_id {
        let windows = host.all_windows().await?;
        if windows.iter().any(|w| w.id == window_id) {
            host.focus_window(window_id).await?;
            debug!("lifecycle: topic {} focused window {}", id, window_id);
            return Ok(LoadOutcome::Focused(window_id));
        }
    }

    let window = host.create_window().await?;
    store.update(id, TopicPatch::bind_window(window.id)).await?;
    bus.broadcast(&BusEvent::TopicLoaded {
        id,
        window_id: window.id,
    })
    .await;
    debug!("lifecycle: topic {} opened window {}", id, window.id);
    Ok(LoadOutcome::Opened(window.id))
}

/// Soft-delete. The record stays in the store; the formerly bound window is
/// re-announced as a plain browsing window so every instance offers it again.
pub async fn trash_topic<B, H, E>(
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    id: TopicId,
) -> Result<()>
where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    let topic = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} not found", id)))?;
    let patch = TopicPatch {
        deleted: Some(Some(now_ms())),
        window_id: Some(None),
        ..Default::default()
    };
    if store.update(id, patch).await? == 0 {
        warn!("lifecycle: trash failed to update topic {}", id);
        return Err(Error::NotFound(format!("topic {} not found", id)));
    }
    bus.broadcast(&BusEvent::TopicRemove { id }).await;

    if let Some(window_id) = topic.window_id {
        let windows = host.all_windows().await?;
        if let Some(window) = windows.into_iter().find(|w| w.id == window_id) {
            bus.broadcast(&BusEvent::WindowCreated { window }).await;
        }
    }
    Ok(())
}

/// Restore a freshly loaded Topic's tabs into its new window.
///
/// Blank startup tabs are closed first. If more than one tab then remains
/// (beyond the pinned extension page) the window was already populated, as
/// on a popup refresh or session restore, and restoration is skipped.
pub async fn restore_topic_tabs<H>(host: &H, topic: &Topic, window_id: WindowId) -> Result<bool>
where
    H: WindowHost,
{
    let tabs = host.window_tabs(window_id).await?;
    let mut remaining = tabs.len();
    for tab in &tabs {
        if tab.url.starts_with("about:") || tab.url.starts_with("chrome://newtab") {
            debug!("restore: closing startup tab {} ({})", tab.index, tab.url);
            host.remove_tab(tab.id).await?;
            remaining -= 1;
        }
    }
    if remaining != 1 {
        debug!(
            "restore: skipped for topic {}, {} tabs already present",
            topic.id, remaining
        );
        return Ok(false);
    }
    for saved in &topic.tabs {
        host.create_tab(CreateTab {
            window_id: Some(window_id),
            url: Some(saved.url.clone()),
            active: saved.active,
            pinned: saved.pinned,
        })
        .await?;
    }
    debug!(
        "restore: topic {} restored {} tabs into window {}",
        topic.id,
        topic.tabs.len(),
        window_id
    );
    Ok(true)
}

/// Add a favorite to a Topic, keyed by exact URL. Idempotent.
pub async fn add_favorite<B>(
    store: &TopicStore<B>,
    topic_id: TopicId,
    favorite: Favorite,
) -> Result<Vec<Favorite>>
where
    B: StorageBackend,
{
    let topic = store
        .get(topic_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} not found", topic_id)))?;
    let mut favorites = topic.favorites;
    if favorites.iter().any(|f| f.url == favorite.url) {
        return Ok(favorites);
    }
    favorites.push(favorite);
    let patch = TopicPatch {
        favorites: Some(favorites.clone()),
        ..Default::default()
    };
    store.update(topic_id, patch).await?;
    Ok(favorites)
}

/// Remove a favorite by exact URL. Open tabs for that URL stay open.
pub async fn remove_favorite<B>(
    store: &TopicStore<B>,
    topic_id: TopicId,
    url: &str,
) -> Result<Vec<Favorite>>
where
    B: StorageBackend,
{
    let topic = store
        .get(topic_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("topic {} not found", topic_id)))?;
    let mut favorites = topic.favorites;
    favorites.retain(|f| f.url != url);
    let patch = TopicPatch {
        favorites: Some(favorites.clone()),
        ..Default::default()
    };
    store.update(topic_id, patch).await?;
    Ok(favorites)
}

/// Persist the sidebar order after a drag: position in the slice becomes the
/// record's `order`. Returns how many records were updated.
pub async fn save_topic_order<B>(store: &TopicStore<B>, ordered: &[TopicId]) -> Result<usize>
where
    B: StorageBackend,
{
    let mut updated = 0;
    for (position, id) in ordered.iter().enumerate() {
        let patch = TopicPatch {
            order: Some(position as u32),
            ..Default::default()
        };
        updated += store.update(*id, patch).await?;
    }
    Ok(updated)
}
