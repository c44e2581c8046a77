/// Tab mirror: keeps a Topic's persisted tab list equal to its live window.
use log::debug;
use std::cell::Cell;

use crate::events::{BusEvent, EventBus};
use crate::host::{LiveTab, WindowHost};
use crate::store::{StorageBackend, TopicStore};
use crate::topic::{TabSnapshot, TopicId, TopicPatch, WindowId};
use crate::{Error, Result};

/// Project live tabs onto the persisted whitelist, dropping the extension's
/// own pages. Nothing outside these six fields ever reaches the store.
pub fn sanitize_tabs(tabs: &[LiveTab], ui_url: &str) -> Vec<TabSnapshot> {
    tabs.iter()
        .filter(|tab| !tab.url.starts_with(ui_url))
        .map(|tab| TabSnapshot {
            active: tab.active,
            index: tab.index,
            pinned: tab.pinned,
            selected: tab.highlighted,
            title: tab.title.clone(),
            url: tab.url.clone(),
        })
        .collect()
}

/// Snapshot the live window into the Topic record and tell everyone.
///
/// The persisted value is a full idempotent snapshot, never a delta, so
/// concurrent syncs for the same Topic converge under last-write-wins. After
/// writing, the Topic is re-read so the broadcast carries what actually
/// landed in the store rather than what this caller believes it wrote.
pub async fn sync_tabs_to_topic<B, H, E>(
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    topic_id: TopicId,
    window_id: WindowId,
) -> Result<Vec<TabSnapshot>>
where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    let live = host
        .window_tabs(window_id)
        .await
        .map_err(|err| Error::PartialSync(format!("window {} query failed: {}", window_id, err)))?;
    let snapshots = sanitize_tabs(&live, &host.ui_url());
    debug!(
        "mirror: topic {} window {} -> {} tabs",
        topic_id,
        window_id,
        snapshots.len()
    );
    store.update(topic_id, TopicPatch::tabs(snapshots)).await?;

    // refresh from the store: another instance may have written meanwhile
    let tabs = store
        .get(topic_id)
        .await?
        .map(|topic| topic.tabs)
        .ok_or_else(|| Error::NotFound(format!("topic {} vanished during sync", topic_id)))?;

    bus.broadcast(&BusEvent::TopicInfoUpdated {
        topic_id,
        name: None,
        color: None,
        tabs: Some(tabs.clone()),
    })
    .await;
    Ok(tabs)
}

/// Coalesces bursts of sync requests (tab-update events fire constantly while
/// pages load). A request arriving while a pass runs marks one re-run; the
/// re-run snapshots the then-current state, so the outcome equals running
/// every request serially.
#[derive(Default)]
pub struct SyncGate {
    busy: Cell<bool>,
    again: Cell<bool>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True: caller owns the pass and must call `finish` (or `abort`).
    /// False: a pass is in flight and will re-run on completion.
    pub fn begin(&self) -> bool {
        if self.busy.get() {
            self.again.set(true);
            false
        } else {
            self.busy.set(true);
            true
        }
    }

    /// True when requests arrived mid-pass and one more pass must run.
    pub fn finish(&self) -> bool {
        if self.again.get() {
            self.again.set(false);
            true
        } else {
            self.busy.set(false);
            false
        }
    }

    pub fn abort(&self) {
        self.busy.set(false);
        self.again.set(false);
    }
}

/// Gate-aware sync entry point. Returns `None` when the request was folded
/// into a pass already in flight.
pub async fn sync_tabs_coalesced<B, H, E>(
    gate: &SyncGate,
    store: &TopicStore<B>,
    host: &H,
    bus: &E,
    topic_id: TopicId,
    window_id: WindowId,
) -> Result<Option<Vec<TabSnapshot>>>
where
    B: StorageBackend,
    H: WindowHost,
    E: EventBus,
{
    if !gate.begin() {
        return Ok(None);
    }
    loop {
        match sync_tabs_to_topic(store, host, bus, topic_id, window_id).await {
            Ok(tabs) => {
                if !gate.finish() {
                    return Ok(Some(tabs));
                }
            }
            Err(err) => {
                gate.abort();
                return Err(err);
            }
        }
    }
}
