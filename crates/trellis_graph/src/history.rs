//! Snapshot-based linear undo/redo.
//!
//! The manager listens for `canvas:state-changed` on the store's bus. Every
//! [`CommitOrigin::Mutation`] commit pushes the previous present onto
//! `past`, installs the committed snapshot as the new present and discards
//! `future`. Undo and redo install a neighbouring snapshot through
//! [`GraphStore::adopt`], whose commit carries [`CommitOrigin::Adoption`] and
//! is ignored here.
//!
//! `past + 1 + future` never exceeds the configured bound; the oldest entries
//! are dropped first. Manual snapshots taken with
//! [`create_snapshot`](HistoryManager::create_snapshot) are kept apart and do
//! not count towards the bound.

use core::fmt;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use trellis_core::canvas::{CanvasSnapshot, HistoryState, SnapshotType};
use trellis_core::clock::Clock;
use trellis_core::SnapshotId;
use trellis_events::event::{CommitOrigin, HistoryEventData};
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload, HandlerError, ListenerConfig, SubscriptionId};

use crate::error::HistoryError;
use crate::store::GraphStore;

struct Timeline {
    past: VecDeque<Arc<CanvasSnapshot>>,
    present: Arc<CanvasSnapshot>,
    /// Redo stack; index 0 is the next redo.
    future: VecDeque<Arc<CanvasSnapshot>>,
    manual: IndexMap<SnapshotId, Arc<CanvasSnapshot>>,
    max_size: usize,
}

impl Timeline {
    fn len(&self) -> usize {
        self.past.len() + 1 + self.future.len()
    }

    fn trim(&mut self) {
        while self.len() > self.max_size && !self.past.is_empty() {
            self.past.pop_front();
        }
        while self.len() > self.max_size && !self.future.is_empty() {
            self.future.pop_back();
        }
    }

    fn find(&self, id: &SnapshotId) -> Option<Arc<CanvasSnapshot>> {
        self.manual
            .get(id)
            .or_else(|| self.past.iter().find(|s| &s.id == id))
            .or_else(|| (&self.present.id == id).then_some(&self.present))
            .or_else(|| self.future.iter().find(|s| &s.id == id))
            .cloned()
    }

    fn event_data(&self, snapshot: Option<&CanvasSnapshot>) -> HistoryEventData {
        HistoryEventData {
            can_undo: !self.past.is_empty(),
            can_redo: !self.future.is_empty(),
            history_size: self.len(),
            snapshot_id: snapshot.map(|s| s.id.clone()),
            description: snapshot.and_then(|s| s.description.clone()),
        }
    }
}

/// Undo/redo over one [`GraphStore`].
pub struct HistoryManager {
    store: Arc<GraphStore>,
    timeline: Mutex<Timeline>,
    subscription: SubscriptionId,
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timeline = self.timeline.lock();
        f.debug_struct("HistoryManager")
            .field("past", &timeline.past.len())
            .field("future", &timeline.future.len())
            .field("manual", &timeline.manual.len())
            .field("max_size", &timeline.max_size)
            .finish_non_exhaustive()
    }
}

impl Drop for HistoryManager {
    fn drop(&mut self) {
        self.store.bus().off(&self.subscription);
    }
}

impl HistoryManager {
    /// Attaches a history to `store`, bounded by its `history.max_size`.
    ///
    /// The store's current state becomes the initial present.
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Arc<Self> {
        let max_size = store.config().history.max_size.max(1);
        let present = Arc::new(store.snapshot(SnapshotType::Auto));
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let subscription = store.bus().on_async(
                CanvasEventType::CanvasStateChanged,
                ListenerConfig::default(),
                move |event: CanvasEvent| {
                    let weak = weak.clone();
                    async move {
                        let Some(commit) = event.as_commit() else {
                            return Ok::<(), HandlerError>(());
                        };
                        if commit.origin != CommitOrigin::Mutation {
                            return Ok(());
                        }
                        let snapshot = Arc::clone(&commit.snapshot);
                        if let Some(history) = weak.upgrade() {
                            history.record(snapshot);
                            history.emit(CanvasEventType::HistoryChanged, None).await;
                        }
                        Ok(())
                    }
                },
            );
            Self {
                store,
                timeline: Mutex::new(Timeline {
                    past: VecDeque::new(),
                    present,
                    future: VecDeque::new(),
                    manual: IndexMap::new(),
                    max_size,
                }),
                subscription,
            }
        })
    }

    fn record(&self, snapshot: Arc<CanvasSnapshot>) {
        let mut timeline = self.timeline.lock();
        let previous = core::mem::replace(&mut timeline.present, snapshot);
        timeline.past.push_back(previous);
        timeline.future.clear();
        timeline.trim();
        tracing::debug!(
            past = timeline.past.len(),
            max_size = timeline.max_size,
            "history entry recorded"
        );
    }

    async fn emit(&self, kind: CanvasEventType, snapshot: Option<&CanvasSnapshot>) {
        let data = self.timeline.lock().event_data(snapshot);
        let event = CanvasEvent::new(kind, EventPayload::History(data)).from_source("history");
        self.store.bus().emit(event).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Undo / redo
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns true if there is an earlier state.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.timeline.lock().past.is_empty()
    }

    /// Returns true if there is an undone state to return to.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.timeline.lock().future.is_empty()
    }

    /// Installs the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToUndo`] when `past` is empty, or the
    /// store's refusal (e.g. read-only mode). The state is unchanged on error.
    pub async fn undo(&self) -> Result<Arc<CanvasSnapshot>, HistoryError> {
        let target = self
            .timeline
            .lock()
            .past
            .back()
            .cloned()
            .ok_or(HistoryError::NothingToUndo)?;
        self.store.adopt(&target, false).await?;
        {
            let mut timeline = self.timeline.lock();
            timeline.past.pop_back();
            let present = core::mem::replace(&mut timeline.present, Arc::clone(&target));
            timeline.future.push_front(present);
        }
        self.emit(CanvasEventType::HistoryUndo, Some(&target)).await;
        self.emit(CanvasEventType::HistoryChanged, Some(&target)).await;
        Ok(target)
    }

    /// Re-installs the most recently undone state.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToRedo`] when `future` is empty, or the
    /// store's refusal.
    pub async fn redo(&self) -> Result<Arc<CanvasSnapshot>, HistoryError> {
        let target = self
            .timeline
            .lock()
            .future
            .front()
            .cloned()
            .ok_or(HistoryError::NothingToRedo)?;
        self.store.adopt(&target, false).await?;
        {
            let mut timeline = self.timeline.lock();
            timeline.future.pop_front();
            let present = core::mem::replace(&mut timeline.present, Arc::clone(&target));
            timeline.past.push_back(present);
        }
        self.emit(CanvasEventType::HistoryRedo, Some(&target)).await;
        self.emit(CanvasEventType::HistoryChanged, Some(&target)).await;
        Ok(target)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Captures the current state as a named manual snapshot.
    pub async fn create_snapshot(&self, description: Option<&str>) -> Arc<CanvasSnapshot> {
        let mut snapshot = self.store.snapshot(SnapshotType::Manual);
        if let Some(description) = description {
            snapshot = snapshot.with_description(description);
        }
        let snapshot = Arc::new(snapshot);
        self.timeline
            .lock()
            .manual
            .insert(snapshot.id.clone(), Arc::clone(&snapshot));
        self.emit(CanvasEventType::SnapshotCreated, Some(&snapshot)).await;
        snapshot
    }

    /// Looks up a manual or timeline snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SnapshotNotFound`] for unknown ids.
    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<Arc<CanvasSnapshot>, HistoryError> {
        self.timeline
            .lock()
            .find(id)
            .ok_or_else(|| HistoryError::SnapshotNotFound(id.clone()))
    }

    /// Manual snapshots in creation order, followed by the timeline from
    /// oldest to newest.
    #[must_use]
    pub fn all_snapshots(&self) -> Vec<Arc<CanvasSnapshot>> {
        let timeline = self.timeline.lock();
        timeline
            .manual
            .values()
            .chain(timeline.past.iter())
            .chain(core::iter::once(&timeline.present))
            .chain(timeline.future.iter())
            .cloned()
            .collect()
    }

    /// Removes a manual snapshot or a `past`/`future` entry.
    ///
    /// # Errors
    ///
    /// Refuses to delete the present state and reports unknown ids.
    pub async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), HistoryError> {
        {
            let mut timeline = self.timeline.lock();
            if &timeline.present.id == id {
                return Err(HistoryError::PresentSnapshot(id.clone()));
            }
            let removed = timeline.manual.shift_remove(id).is_some() || {
                let before = timeline.past.len() + timeline.future.len();
                timeline.past.retain(|s| &s.id != id);
                timeline.future.retain(|s| &s.id != id);
                before != timeline.past.len() + timeline.future.len()
            };
            if !removed {
                return Err(HistoryError::SnapshotNotFound(id.clone()));
            }
        }
        self.emit(CanvasEventType::HistoryChanged, None).await;
        Ok(())
    }

    /// Jumps to any known snapshot, restoring its viewport.
    ///
    /// The entries right before and after the present are reached through
    /// [`undo`](Self::undo) and [`redo`](Self::redo), so the timeline is
    /// kept. Any other target is a fresh change: `future` is discarded and
    /// the current present is pushed onto `past`.
    ///
    /// # Errors
    ///
    /// Reports unknown ids and store refusals.
    pub async fn restore_snapshot(&self, id: &SnapshotId) -> Result<Arc<CanvasSnapshot>, HistoryError> {
        let target = self.get_snapshot(id)?;
        let (previous, next) = {
            let timeline = self.timeline.lock();
            if timeline.present.id == target.id {
                return Ok(target);
            }
            (
                timeline.past.back().is_some_and(|s| s.id == target.id),
                timeline.future.front().is_some_and(|s| s.id == target.id),
            )
        };
        if previous || next {
            let restored = if previous { self.undo().await? } else { self.redo().await? };
            self.store.set_viewport(restored.viewport).await;
            tracing::debug!(snapshot = %restored.id, "snapshot restored along the timeline");
            self.emit(CanvasEventType::SnapshotRestored, Some(&restored)).await;
            return Ok(restored);
        }
        self.store.adopt(&target, true).await?;
        let present = Arc::new(target.recaptured(self.store.clock().now_millis()));
        {
            let mut timeline = self.timeline.lock();
            let previous = core::mem::replace(&mut timeline.present, Arc::clone(&present));
            timeline.past.push_back(previous);
            timeline.future.clear();
            timeline.trim();
        }
        tracing::debug!(snapshot = %target.id, "snapshot restored");
        self.emit(CanvasEventType::SnapshotRestored, Some(&target)).await;
        self.emit(CanvasEventType::HistoryChanged, Some(&present)).await;
        Ok(present)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Drops `past` and `future` and re-captures the present. Manual
    /// snapshots are kept.
    pub async fn clear_history(&self) {
        let present = Arc::new(self.store.snapshot(SnapshotType::Auto));
        {
            let mut timeline = self.timeline.lock();
            timeline.past.clear();
            timeline.future.clear();
            timeline.present = present;
        }
        self.emit(CanvasEventType::HistoryChanged, None).await;
    }

    /// `past + 1 + future`.
    #[must_use]
    pub fn history_size(&self) -> usize {
        self.timeline.lock().len()
    }

    /// Changes the bound, dropping the oldest entries if needed.
    pub fn set_max_size(&self, max_size: usize) {
        let mut timeline = self.timeline.lock();
        timeline.max_size = max_size.max(1);
        timeline.trim();
    }

    /// A copy of the timeline.
    #[must_use]
    pub fn state(&self) -> HistoryState {
        let timeline = self.timeline.lock();
        HistoryState {
            past: timeline.past.iter().cloned().collect(),
            present: Arc::clone(&timeline.present),
            future: timeline.future.iter().cloned().collect(),
            max_size: timeline.max_size,
            can_undo: !timeline.past.is_empty(),
            can_redo: !timeline.future.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Graph, Viewport};

    fn snapshot(n: u64) -> Arc<CanvasSnapshot> {
        Arc::new(CanvasSnapshot::capture(
            Graph::new(),
            Viewport::default(),
            n,
            SnapshotType::Auto,
        ))
    }

    fn timeline(max_size: usize) -> Timeline {
        Timeline {
            past: VecDeque::new(),
            present: snapshot(0),
            future: VecDeque::new(),
            manual: IndexMap::new(),
            max_size,
        }
    }

    #[test]
    fn trim_drops_oldest_past_first() {
        let mut t = timeline(3);
        for n in 1..=5 {
            let previous = core::mem::replace(&mut t.present, snapshot(n));
            t.past.push_back(previous);
            t.trim();
        }
        assert_eq!(t.len(), 3);
        let stamps: Vec<u64> = t.past.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![3, 4]);
    }

    #[test]
    fn find_covers_every_list() {
        let mut t = timeline(10);
        let manual = snapshot(7);
        t.manual.insert(manual.id.clone(), Arc::clone(&manual));
        let future = snapshot(9);
        t.future.push_back(Arc::clone(&future));
        assert!(t.find(&manual.id).is_some());
        assert!(t.find(&future.id).is_some());
        assert!(t.find(&t.present.id.clone()).is_some());
        assert!(t.find(&SnapshotId::from("missing")).is_none());
    }
}
