//! Plane change accumulation between ticks.
//!
//! The sensor producer reports plane additions, updates and removals whenever
//! they happen, possibly from another thread. [`ChangeTracker`] folds those
//! notifications into one pending change set that the frame loop drains once
//! per tick.
//!
//! # Drain rules
//!
//! - An id notified as removed is never part of `updated` in the same drain.
//! - Repeated notifications for the same id collapse; the latest plane data wins
//!   but the id keeps its first position.
//! - Subsumed planes are never re-emitted. If they were emitted earlier their id
//!   is moved to `removed` so consumers retire them.
//! - Planes failing validation are dropped from the tick with a warning.
//! - Once an id has been drained as removed it is retired for the rest of the
//!   session and later updates for it are ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::types::{Plane, TrackableId};

/// Plane deltas accumulated since the previous drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneChangeSet {
    /// Planes added or modified, to be fully re-emitted
    pub updated: Vec<Plane>,
    /// Ids to emit as tombstones
    pub removed: Vec<TrackableId>,
}

impl PlaneChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    active: bool,
    updated: Vec<Plane>,
    updated_index: HashMap<TrackableId, usize>,
    removed: Vec<TrackableId>,
    removed_index: HashSet<TrackableId>,
    /// Planes that downstream consumers currently know about
    emitted: HashSet<TrackableId>,
    retired: HashSet<TrackableId>,
}

impl TrackerState {
    fn clear(&mut self) {
        self.updated.clear();
        self.updated_index.clear();
        self.removed.clear();
        self.removed_index.clear();
        self.emitted.clear();
        self.retired.clear();
    }

    fn push_updated(&mut self, plane: &Plane) {
        if self.retired.contains(&plane.id) {
            log::debug!("Ignoring update for retired plane {}", plane.id);
            return;
        }
        match self.updated_index.get(&plane.id) {
            Some(&slot) => self.updated[slot] = plane.clone(),
            None => {
                self.updated_index
                    .insert(plane.id.clone(), self.updated.len());
                self.updated.push(plane.clone());
            }
        }
    }

    fn push_removed(&mut self, id: &TrackableId) {
        if self.removed_index.insert(id.clone()) {
            self.removed.push(id.clone());
        }
    }
}

/// Accumulates plane notifications for one capture session.
///
/// Notifications are ignored while the tracker is inactive, so nothing builds
/// up between sessions.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    state: Mutex<TrackerState>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a fresh session seeded with the full current plane inventory.
    pub fn activate(&self, inventory: &[Plane]) {
        let mut state = self.lock();
        state.clear();
        state.active = true;
        for plane in inventory {
            state.push_updated(plane);
        }
        log::debug!("Plane tracker activated with {} planes", inventory.len());
    }

    /// Stop accumulating and forget all pending and emitted state.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        state.clear();
        state.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Record a batch of plane changes from the producer.
    pub fn notify(&self, added: &[Plane], updated: &[Plane], removed: &[Plane]) {
        let mut state = self.lock();
        if !state.active {
            log::trace!("Plane tracker inactive, dropping notification");
            return;
        }
        for plane in added.iter().chain(updated) {
            state.push_updated(plane);
        }
        for plane in removed {
            state.push_removed(&plane.id);
        }
    }

    /// Take and clear everything accumulated since the previous drain.
    pub fn drain(&self) -> PlaneChangeSet {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.updated);
        state.updated_index.clear();
        let mut removed = std::mem::take(&mut state.removed);
        let mut removed_index = std::mem::take(&mut state.removed_index);

        let mut updated = Vec::with_capacity(pending.len());
        for plane in pending {
            if removed_index.contains(&plane.id) {
                continue;
            }
            if let Some(by) = &plane.subsumed_by {
                if state.emitted.contains(&plane.id) {
                    log::debug!("Plane {} subsumed by {}, retiring", plane.id, by);
                    removed_index.insert(plane.id.clone());
                    removed.push(plane.id);
                }
                continue;
            }
            if let Err(e) = plane.validate() {
                log::warn!("Dropping plane from this tick: {}", e);
                continue;
            }
            state.emitted.insert(plane.id.clone());
            updated.push(plane);
        }

        for id in &removed {
            state.emitted.remove(id);
            state.retired.insert(id.clone());
        }

        PlaneChangeSet { updated, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pose, Vec2};
    use std::sync::Arc;

    fn plane(id: &str) -> Plane {
        Plane::new(
            TrackableId::new(id).unwrap(),
            Pose::identity(),
            vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)],
        )
    }

    fn id(token: &str) -> TrackableId {
        TrackableId::new(token).unwrap()
    }

    fn active_tracker() -> ChangeTracker {
        let tracker = ChangeTracker::new();
        tracker.activate(&[]);
        tracker
    }

    #[test]
    fn test_removal_wins_over_update() {
        let tracker = active_tracker();
        tracker.notify(&[plane("A")], &[plane("B")], &[]);
        tracker.notify(&[], &[plane("A")], &[plane("A")]);
        tracker.notify(&[], &[plane("B")], &[]);

        let changes = tracker.drain();
        let updated: Vec<_> = changes.updated.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(updated, vec!["B"]);
        assert_eq!(changes.removed, vec![id("A")]);
    }

    #[test]
    fn test_added_and_removed_in_same_window() {
        let tracker = active_tracker();
        tracker.notify(&[plane("P1")], &[], &[]);
        tracker.notify(&[], &[], &[plane("P1")]);

        let changes = tracker.drain();
        assert!(changes.updated.is_empty());
        assert_eq!(changes.removed, vec![id("P1")]);
    }

    #[test]
    fn test_duplicate_notifications_collapse() {
        let tracker = active_tracker();
        let mut moved = plane("A");
        moved.pose.position.x = 4.0;
        tracker.notify(&[plane("A")], &[plane("B")], &[]);
        tracker.notify(&[], &[moved.clone()], &[plane("C"), plane("C")]);

        let changes = tracker.drain();
        assert_eq!(changes.updated.len(), 2);
        assert_eq!(changes.updated[0], moved);
        assert_eq!(changes.updated[1].id, id("B"));
        assert_eq!(changes.removed, vec![id("C")]);
    }

    #[test]
    fn test_second_drain_is_empty() {
        let tracker = active_tracker();
        tracker.notify(&[plane("A")], &[], &[plane("B")]);
        assert!(!tracker.drain().is_empty());
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_subsumed_plane_retired_once_emitted() {
        let tracker = active_tracker();
        tracker.notify(&[plane("A"), plane("B")], &[], &[]);
        assert_eq!(tracker.drain().updated.len(), 2);

        tracker.notify(&[], &[plane("A").subsumed(id("B")), plane("B")], &[]);
        let changes = tracker.drain();
        assert_eq!(changes.updated.len(), 1);
        assert_eq!(changes.updated[0].id, id("B"));
        assert_eq!(changes.removed, vec![id("A")]);
    }

    #[test]
    fn test_subsumed_plane_never_emitted_is_silent() {
        let tracker = active_tracker();
        tracker.notify(&[plane("A").subsumed(id("B"))], &[], &[]);
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_malformed_plane_dropped() {
        let tracker = active_tracker();
        let mut degenerate = plane("A");
        degenerate.boundary.truncate(2);
        tracker.notify(&[degenerate, plane("B")], &[], &[]);

        let changes = tracker.drain();
        assert_eq!(changes.updated.len(), 1);
        assert_eq!(changes.updated[0].id, id("B"));
    }

    #[test]
    fn test_retired_plane_not_reemitted() {
        let tracker = active_tracker();
        tracker.notify(&[plane("P1")], &[], &[]);
        tracker.drain();
        tracker.notify(&[], &[], &[plane("P1")]);
        assert_eq!(tracker.drain().removed, vec![id("P1")]);

        tracker.notify(&[], &[plane("P1")], &[]);
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_inactive_tracker_ignores_notifications() {
        let tracker = ChangeTracker::new();
        tracker.notify(&[plane("A")], &[], &[]);
        assert!(tracker.drain().is_empty());

        tracker.activate(&[]);
        tracker.notify(&[plane("A")], &[], &[]);
        tracker.deactivate();
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_activate_seeds_inventory_and_resets() {
        let tracker = active_tracker();
        tracker.notify(&[plane("old")], &[], &[]);

        tracker.activate(&[plane("A"), plane("B")]);
        let changes = tracker.drain();
        let ids: Vec<_> = changes.updated.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_concurrent_notify_never_overlaps_sets() {
        let tracker = Arc::new(active_tracker());
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let name = format!("W{}_{}", worker, i % 10);
                        if i % 3 == 0 {
                            tracker.notify(&[], &[], &[plane(&name)]);
                        } else {
                            tracker.notify(&[], &[plane(&name)], &[]);
                        }
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for _ in 0..50 {
            drained.push(tracker.drain());
        }
        for worker in workers {
            worker.join().unwrap();
        }
        drained.push(tracker.drain());

        for changes in drained {
            let removed: HashSet<_> = changes.removed.iter().collect();
            assert!(changes.updated.iter().all(|p| !removed.contains(&p.id)));
        }
    }
}
