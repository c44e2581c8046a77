/// Window–Topic matcher: resolves which Topic a live window belongs to.
use log::{debug, warn};

use crate::host::WindowHost;
use crate::store::{StorageBackend, TopicQuery, TopicStore};
use crate::topic::{Topic, TopicPatch, WindowId};
use crate::Result;

/// Match a live window to a persisted Topic.
///
/// Fast path: a non-deleted Topic whose cached `window_id` equals the
/// argument; trusted because bindings are set at load time and cleared at
/// close time, and never mutates the store. Fallback: positional comparison
/// of the window's tab URL sequence (extension pages excluded) against every
/// non-deleted Topic's saved tabs; a full match re-binds the Topic. The
/// fallback recovers bindings lost across browser relaunches and knowingly
/// gives up on any reorder or add/remove since the last save.
pub async fn match_window_to_topic<B, H>(
    store: &TopicStore<B>,
    host: &H,
    window_id: WindowId,
) -> Result<Option<Topic>>
where
    B: StorageBackend,
    H: WindowHost,
{
    // fast path: cached binding
    let mut bound = store.find_where(TopicQuery::WindowId(window_id)).await?;
    if let Some(topic) = bound.drain(..).next() {
        debug!(
            "matcher: window {} bound to topic {} via cached id",
            window_id, topic.id
        );
        return Ok(Some(topic));
    }

    // content matching: exact positional URL-sequence identity
    let ui_url = host.ui_url();
    let live_urls: Vec<String> = host
        .window_tabs(window_id)
        .await?
        .into_iter()
        .filter(|tab| !tab.url.starts_with(&ui_url))
        .map(|tab| tab.url)
        .collect();
    if live_urls.is_empty() {
        // an empty window must not bind to a topic with no saved tabs
        return Ok(None);
    }

    let candidates: Vec<Topic> = store
        .ordered_all()
        .await?
        .into_iter()
        .filter(|topic| {
            topic.tabs.len() == live_urls.len()
                && topic
                    .tabs
                    .iter()
                    .zip(live_urls.iter())
                    .all(|(saved, live)| &saved.url == live)
        })
        .collect();

    let Some(topic) = candidates.first() else {
        return Ok(None);
    };
    if candidates.len() > 1 {
        // duplicate saved sessions make this choice arbitrary
        warn!(
            "matcher: {} topics structurally match window {}, binding first (topic {})",
            candidates.len(),
            window_id,
            topic.id
        );
    }

    debug!(
        "matcher: window {} content-matched topic {}, persisting binding",
        window_id, topic.id
    );
    store
        .update(topic.id, TopicPatch::bind_window(window_id))
        .await?;
    let mut rebound = topic.clone();
    rebound.window_id = Some(window_id);
    Ok(Some(rebound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::store::MemoryBackend;
    use crate::topic::{TabSnapshot, TopicDraft};
    use crate::util::now_ms;

    fn snapshot(url: &str) -> TabSnapshot {
        TabSnapshot {
            active: false,
            index: 0,
            pinned: false,
            selected: false,
            title: url.to_string(),
            url: url.to_string(),
        }
    }

    fn draft_with_tabs(name: &str, urls: &[&str]) -> TopicDraft {
        let mut draft = TopicDraft::new(name, "#336699", now_ms());
        draft.tabs = urls.iter().map(|u| snapshot(u)).collect();
        draft
    }

    #[tokio::test]
    async fn test_fast_path_does_not_touch_store() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a/"]);
        let mut draft = draft_with_tabs("Work", &["https://a/"]);
        draft.window_id = Some(win);
        let id = store.add(draft).await.unwrap();

        let before = store.get(id).await.unwrap().unwrap();
        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert_eq!(matched.unwrap().id, id);
        let after = store.get(id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_content_match_binds_in_order() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a", "https://b"]);
        let id = store
            .add(draft_with_tabs("Work", &["https://a", "https://b"]))
            .await
            .unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert_eq!(matched.unwrap().window_id, Some(win));
        // binding was persisted
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.window_id, Some(win));
    }

    #[tokio::test]
    async fn test_content_match_is_order_sensitive() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://b", "https://a"]);
        store
            .add(draft_with_tabs("Work", &["https://a", "https://b"]))
            .await
            .unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn test_content_match_ignores_extension_tab() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let ui = format!("{}?instance=1", host.ui_url());
        let win = host.open_window(&[ui.as_str(), "https://a"]);
        store
            .add(draft_with_tabs("Work", &["https://a"]))
            .await
            .unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert!(matched.is_some());
    }

    #[tokio::test]
    async fn test_trashed_topics_never_match() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a"]);
        let id = store
            .add(draft_with_tabs("Work", &["https://a"]))
            .await
            .unwrap();
        let patch = TopicPatch {
            deleted: Some(Some(now_ms())),
            ..Default::default()
        };
        store.update(id, patch).await.unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn test_empty_window_matches_nothing() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&[]);
        store.add(draft_with_tabs("Empty", &[])).await.unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_structural_match_takes_first() {
        let store = TopicStore::new(MemoryBackend::new());
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a"]);
        let first = store
            .add(draft_with_tabs("First", &["https://a"]))
            .await
            .unwrap();
        store
            .add(draft_with_tabs("Second", &["https://a"]))
            .await
            .unwrap();

        let matched = match_window_to_topic(&store, &host, win).await.unwrap();
        assert_eq!(matched.unwrap().id, first);
    }
}
