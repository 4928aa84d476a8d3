//! Saving and loading canvases through a pluggable backend.
//!
//! The engine only needs the four calls of [`CanvasStorage`]. Concrete media
//! (browser storage, files, databases) live outside the engine;
//! [`MemoryStorage`] is provided for tests and embedding.
//!
//! [`StorageManager`] tracks one "current" canvas record and compares the
//! store revision with the revision of the last save or load to decide whether
//! there are unsaved changes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_core::clock::Clock;
use trellis_core::config::StorageConfig;
use trellis_core::{CanvasState, ErrorCode, codes};
use trellis_events::event::StorageEventData;
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload};
use trellis_graph::{GraphStore, StoreError};

use crate::transfer::CanvasDocument;

const SOURCE: &str = "storage";

/// Name given to a canvas saved without one.
pub const DEFAULT_CANVAS_NAME: &str = "Untitled canvas";

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Listing entry for a stored canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    /// Storage id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// First save, epoch milliseconds.
    pub create_time: u64,
    /// Latest save, epoch milliseconds.
    pub update_time: u64,
    /// Document size in bytes.
    pub size: usize,
}

/// A stored canvas: its summary plus the serialized [`CanvasDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCanvas {
    /// Listing entry.
    #[serde(flatten)]
    pub summary: CanvasSummary,
    /// JSON document.
    pub document: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a storage operation failed.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No canvas with this id is stored.
    #[error("canvas '{0}' not found")]
    NotFound(String),
    /// The document could not be written or read back.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Auto-save intervals must be positive.
    #[error("auto-save interval must be greater than zero")]
    InvalidInterval,
    /// The store refused the loaded canvas.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => codes::CANVAS_NOT_FOUND,
            StorageError::Serialization(_) => codes::SERIALIZATION_ERROR,
            StorageError::Backend(_) => codes::STORAGE_ERROR,
            StorageError::InvalidInterval => codes::INVALID_ARGUMENT,
            StorageError::Store(err) => err.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A storage medium for canvas documents.
#[async_trait]
pub trait CanvasStorage: Send + Sync + 'static {
    /// Inserts or overwrites the record with `canvas.summary.id`.
    async fn put(&self, canvas: StoredCanvas) -> Result<(), StorageError>;

    /// Reads one record.
    async fn get(&self, id: &str) -> Result<Option<StoredCanvas>, StorageError>;

    /// Deletes one record. Returns false if it did not exist.
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;

    /// Lists every record.
    async fn list(&self) -> Result<Vec<CanvasSummary>, StorageError>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    canvases: RwLock<IndexMap<String, StoredCanvas>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored canvases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.canvases.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canvases.read().is_empty()
    }
}

#[async_trait]
impl CanvasStorage for MemoryStorage {
    async fn put(&self, canvas: StoredCanvas) -> Result<(), StorageError> {
        self.canvases.write().insert(canvas.summary.id.clone(), canvas);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredCanvas>, StorageError> {
        Ok(self.canvases.read().get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.canvases.write().shift_remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<CanvasSummary>, StorageError> {
        let mut summaries: Vec<CanvasSummary> = self
            .canvases
            .read()
            .values()
            .map(|canvas| canvas.summary.clone())
            .collect();
        summaries.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        Ok(summaries)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StorageManager
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SaveState {
    current: Option<CanvasSummary>,
    clean_revision: u64,
    auto_save: bool,
    interval_ms: u64,
    last_save: u64,
}

/// Saves and loads the canvas of one store.
pub struct StorageManager {
    store: Arc<GraphStore>,
    backend: Arc<dyn CanvasStorage>,
    state: Mutex<SaveState>,
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl StorageManager {
    /// Creates a manager. Auto-save settings come from the store's
    /// [`StorageConfig`]; the current revision counts as saved.
    #[must_use]
    pub fn new(store: Arc<GraphStore>, backend: Arc<dyn CanvasStorage>) -> Self {
        let StorageConfig {
            auto_save,
            auto_save_interval_ms,
        } = store.config().storage;
        let state = SaveState {
            current: None,
            clean_revision: store.revision(),
            auto_save,
            interval_ms: auto_save_interval_ms.max(1),
            last_save: store.clock().now_millis(),
        };
        Self {
            store,
            backend,
            state: Mutex::new(state),
        }
    }

    /// The backend in use.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CanvasStorage> {
        &self.backend
    }

    /// The record the canvas was last saved to or loaded from.
    #[must_use]
    pub fn current_canvas(&self) -> Option<CanvasSummary> {
        self.state.lock().current.clone()
    }

    /// Returns true if the store changed since the last save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.store.revision() != self.state.lock().clean_revision
    }

    /// Saves the canvas and returns the record id.
    ///
    /// The first save creates a record; later saves overwrite it. `name`
    /// renames the record.
    ///
    /// # Errors
    ///
    /// Returns the backend's error; the canvas stays dirty.
    pub async fn save_canvas(&self, name: Option<&str>) -> Result<String, StorageError> {
        self.save(name, false).await.map(|summary| summary.id)
    }

    /// Saves if auto-save is enabled, there are unsaved changes and the
    /// interval has elapsed since the last save. Returns whether it saved.
    ///
    /// # Errors
    ///
    /// See [`save_canvas`](Self::save_canvas).
    pub async fn auto_save_canvas(&self) -> Result<bool, StorageError> {
        let now = self.store.clock().now_millis();
        let due = {
            let state = self.state.lock();
            state.auto_save && now.saturating_sub(state.last_save) >= state.interval_ms
        };
        if !due || !self.has_unsaved_changes() {
            return Ok(false);
        }
        self.save(None, true).await?;
        Ok(true)
    }

    async fn save(&self, name: Option<&str>, auto_save: bool) -> Result<CanvasSummary, StorageError> {
        let now = self.store.clock().now_millis();
        let revision = self.store.revision();
        let document = CanvasDocument::new(self.store.graph(), Some(self.store.viewport())).with_metadata(now);
        let summary = {
            let state = self.state.lock();
            match &state.current {
                Some(current) => CanvasSummary {
                    name: name.map_or_else(|| current.name.clone(), str::to_owned),
                    update_time: now,
                    ..current.clone()
                },
                None => CanvasSummary {
                    id: format!("canvas_{}", nanoid::nanoid!(12)),
                    name: name.unwrap_or(DEFAULT_CANVAS_NAME).to_owned(),
                    create_time: now,
                    update_time: now,
                    size: 0,
                },
            }
        };
        self.emit(CanvasEventType::SaveStart, &summary, None, auto_save).await;

        let stored = match serde_json::to_string(&document) {
            Ok(text) => StoredCanvas {
                summary: CanvasSummary {
                    size: text.len(),
                    ..summary
                },
                document: text,
            },
            Err(err) => {
                let err = StorageError::from(err);
                self.emit(CanvasEventType::SaveError, &summary, Some(&err), auto_save).await;
                return Err(err);
            }
        };
        let summary = stored.summary.clone();
        if let Err(err) = self.backend.put(stored).await {
            tracing::warn!(id = %summary.id, code = err.code(), error = %err, "save failed");
            self.emit(CanvasEventType::SaveError, &summary, Some(&err), auto_save).await;
            return Err(err);
        }

        {
            let mut state = self.state.lock();
            state.current = Some(summary.clone());
            state.clean_revision = revision;
            state.last_save = now;
        }
        tracing::debug!(id = %summary.id, bytes = summary.size, auto_save, "canvas saved");
        self.emit(CanvasEventType::SaveEnd, &summary, None, auto_save).await;
        if auto_save {
            self.emit(CanvasEventType::AutoSave, &summary, None, true).await;
        }
        Ok(summary)
    }

    /// Replaces the canvas with a stored one and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for unknown ids,
    /// [`StorageError::Serialization`] for unreadable documents and
    /// [`StorageError::Store`] if the store refuses the graph. The canvas is
    /// unchanged on failure.
    pub async fn load_canvas(&self, id: &str) -> Result<CanvasState, StorageError> {
        let pending = CanvasSummary {
            id: id.to_owned(),
            name: String::new(),
            create_time: 0,
            update_time: 0,
            size: 0,
        };
        self.emit(CanvasEventType::LoadStart, &pending, None, false).await;
        match self.load(id).await {
            Ok((summary, state)) => {
                tracing::debug!(id, nodes = state.nodes.len(), "canvas loaded");
                self.emit(CanvasEventType::LoadEnd, &summary, None, false).await;
                Ok(state)
            }
            Err(err) => {
                tracing::warn!(id, code = err.code(), error = %err, "load failed");
                self.emit(CanvasEventType::LoadError, &pending, Some(&err), false).await;
                Err(err)
            }
        }
    }

    async fn load(&self, id: &str) -> Result<(CanvasSummary, CanvasState), StorageError> {
        let stored = self
            .backend
            .get(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_owned()))?;
        let document: CanvasDocument = serde_json::from_str(&stored.document)?;
        self.store.replace_graph(document.graph, document.viewport).await?;
        let mut state = self.state.lock();
        state.current = Some(stored.summary.clone());
        state.clean_revision = self.store.revision();
        Ok((stored.summary, self.store.state()))
    }

    /// Deletes a stored canvas. Deleting the current record detaches the
    /// canvas from it; the next save creates a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for unknown ids.
    pub async fn delete_canvas(&self, id: &str) -> Result<(), StorageError> {
        if !self.backend.remove(id).await? {
            return Err(StorageError::NotFound(id.to_owned()));
        }
        let mut state = self.state.lock();
        if state.current.as_ref().is_some_and(|current| current.id == id) {
            state.current = None;
        }
        Ok(())
    }

    /// Lists stored canvases, most recently saved first for [`MemoryStorage`].
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn get_canvas_list(&self) -> Result<Vec<CanvasSummary>, StorageError> {
        self.backend.list().await
    }

    /// Sets the minimum time between automatic saves.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInterval`] for zero.
    pub fn set_auto_save_interval(&self, interval_ms: u64) -> Result<(), StorageError> {
        if interval_ms == 0 {
            return Err(StorageError::InvalidInterval);
        }
        self.state.lock().interval_ms = interval_ms;
        Ok(())
    }

    /// Current auto-save interval.
    #[must_use]
    pub fn auto_save_interval(&self) -> u64 {
        self.state.lock().interval_ms
    }

    /// Turns auto-save on.
    pub fn enable_auto_save(&self) {
        self.state.lock().auto_save = true;
    }

    /// Turns auto-save off.
    pub fn disable_auto_save(&self) {
        self.state.lock().auto_save = false;
    }

    /// Whether auto-save is on.
    #[must_use]
    pub fn is_auto_save_enabled(&self) -> bool {
        self.state.lock().auto_save
    }

    async fn emit(
        &self,
        kind: CanvasEventType,
        summary: &CanvasSummary,
        error: Option<&StorageError>,
        auto_save: bool,
    ) {
        let data = StorageEventData {
            id: Some(summary.id.clone()),
            name: (!summary.name.is_empty()).then(|| summary.name.clone()),
            size: (summary.size > 0).then_some(summary.size),
            error: error.map(ToString::to_string),
            auto_save,
        };
        let event = CanvasEvent::new(kind, EventPayload::Storage(data)).from_source(SOURCE);
        self.store.bus().emit(event).await;
    }
}
