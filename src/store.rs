/// Persistent Topic store over a key/value storage backend.
///
/// The whole topic collection is serialized as one JSON document under a
/// single storage key, the way the extension's local storage area is used:
/// load, modify, save. Callers within one extension context may interleave at
/// await points; writes are idempotent snapshots, so last-write-wins merging
/// across popup instances is accepted (the event bus re-converges views).
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::topic::{Topic, TopicDraft, TopicId, TopicPatch, WindowId, ORDER_LAST};
use crate::{Error, Result};

/// Storage key for the topic collection document.
pub const TOPICS_KEY: &str = "tab_topics_db";

/// Durable string key/value storage. Browser-backed on wasm, in-memory for
/// the native target and tests.
pub trait StorageBackend {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: StorageBackend> StorageBackend for &T {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        (*self).load(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        (*self).save(key, value).await
    }
}

/// In-memory backend. Single-context only, which matches the extension's
/// cooperative scheduling model.
#[derive(Default)]
pub struct MemoryBackend {
    cells: RefCell<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cells.borrow().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.cells
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Typed lookup filters for `TopicStore::find_where`.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicQuery {
    Name(String),
    WindowId(WindowId),
}

/// Root document persisted under `TOPICS_KEY`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicDoc {
    next_id: TopicId,
    topics: Vec<Topic>,
}

impl TopicDoc {
    fn new() -> Self {
        TopicDoc {
            next_id: 1,
            topics: Vec::new(),
        }
    }
}

/// Topic collection with store-assigned integer ids and a uniqueness
/// constraint on the name of non-deleted records.
pub struct TopicStore<B> {
    backend: B,
}

impl<B: StorageBackend> TopicStore<B> {
    pub fn new(backend: B) -> Self {
        TopicStore { backend }
    }

    async fn read_doc(&self) -> Result<TopicDoc> {
        match self.backend.load(TOPICS_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(TopicDoc::new()),
        }
    }

    async fn write_doc(&self, doc: &TopicDoc) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        self.backend.save(TOPICS_KEY, &json).await
    }

    fn name_taken(doc: &TopicDoc, name: &str, except: Option<TopicId>) -> bool {
        doc.topics.iter().any(|t| {
            !t.is_deleted() && t.name == name && Some(t.id) != except
        })
    }

    /// Insert a new Topic. Fails with `Constraint` when the name collides
    /// with an existing non-deleted record.
    pub async fn add(&self, draft: TopicDraft) -> Result<TopicId> {
        let mut doc = self.read_doc().await?;
        if Self::name_taken(&doc, &draft.name, None) {
            return Err(Error::Constraint(format!(
                "topic name already in use: {}",
                draft.name
            )));
        }
        let id = doc.next_id;
        doc.next_id += 1;
        doc.topics.push(Topic {
            id,
            name: draft.name,
            color: draft.color,
            order: ORDER_LAST,
            window_id: draft.window_id,
            tabs: draft.tabs,
            favorites: draft.favorites,
            created_time: draft.created_time,
            deleted: None,
        });
        self.write_doc(&doc).await?;
        debug!("store: added topic id={}", id);
        Ok(id)
    }

    /// Merge `patch` into the record. Returns the number of updated records
    /// (0 when the id is unknown, 1 otherwise). Fields absent from the patch
    /// are never touched.
    pub async fn update(&self, id: TopicId, patch: TopicPatch) -> Result<usize> {
        let mut doc = self.read_doc().await?;
        if let Some(name) = &patch.name {
            if Self::name_taken(&doc, name, Some(id)) {
                return Err(Error::Constraint(format!(
                    "topic name already in use: {}",
                    name
                )));
            }
        }
        let Some(topic) = doc.topics.iter_mut().find(|t| t.id == id) else {
            debug!("store: update for unknown topic id={}", id);
            return Ok(0);
        };
        if let Some(name) = patch.name {
            topic.name = name;
        }
        if let Some(color) = patch.color {
            topic.color = color;
        }
        if let Some(order) = patch.order {
            topic.order = order;
        }
        if let Some(window_id) = patch.window_id {
            topic.window_id = window_id;
        }
        if let Some(tabs) = patch.tabs {
            topic.tabs = tabs;
        }
        if let Some(favorites) = patch.favorites {
            topic.favorites = favorites;
        }
        if let Some(deleted) = patch.deleted {
            topic.deleted = deleted;
        }
        self.write_doc(&doc).await?;
        Ok(1)
    }

    /// Hard removal. Internal maintenance only; the lifecycle soft-deletes.
    pub async fn remove(&self, id: TopicId) -> Result<bool> {
        let mut doc = self.read_doc().await?;
        let before = doc.topics.len();
        doc.topics.retain(|t| t.id != id);
        let removed = doc.topics.len() < before;
        if removed {
            self.write_doc(&doc).await?;
        }
        Ok(removed)
    }

    /// Direct lookup by id; the only operation that can see trashed records.
    pub async fn get(&self, id: TopicId) -> Result<Option<Topic>> {
        let doc = self.read_doc().await?;
        Ok(doc.topics.into_iter().find(|t| t.id == id))
    }

    /// All non-deleted Topics, ordered by `order` (ties by id).
    pub async fn ordered_all(&self) -> Result<Vec<Topic>> {
        let doc = self.read_doc().await?;
        let mut topics: Vec<Topic> =
            doc.topics.into_iter().filter(|t| !t.is_deleted()).collect();
        topics.sort_by_key(|t| (t.order, t.id));
        Ok(topics)
    }

    /// Non-deleted Topics matching the filter, in store order.
    pub async fn find_where(&self, query: TopicQuery) -> Result<Vec<Topic>> {
        let doc = self.read_doc().await?;
        Ok(doc
            .topics
            .into_iter()
            .filter(|t| !t.is_deleted())
            .filter(|t| match &query {
                TopicQuery::Name(name) => &t.name == name,
                TopicQuery::WindowId(window_id) => t.window_id == Some(*window_id),
            })
            .collect())
    }
}
