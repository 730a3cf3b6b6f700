//! The frame graph, world-transform cache, query engine and change notifier (components B-E).
//!
//! These four subsystems share one struct because they share one invariant: cache entries and
//! dirty marks are indexed exactly like frames and children, so a single interning step at `add`
//! time is all the bookkeeping any of them need.

use std::collections::HashMap;

use crate::error::GraphError;
use crate::frame::{Children, Frame, FrameIdx};
use crate::math::Transform;

type Listener = Box<dyn FnMut(&str)>;

/// An opaque handle returned by [`FrameTree::on_change`].
///
/// Pass it to [`FrameTree::unsubscribe`] to stop receiving change notifications. Unsubscribing
/// twice (or after the owning frame has been removed) is a harmless no-op, matching the
/// idempotent-unsubscribe contract of the spec this crate implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unsubscribe(pub(crate) FrameIdx, pub(crate) u64);

/// A graph of named rigid-body reference frames with a lazily-invalidated world-transform cache.
///
/// See the crate-level documentation for the algorithmic contract. In short: mutators invalidate
/// cache entries but never eagerly recompute them; queries recompute on demand and memoize the
/// result.
///
/// Slots are arena-allocated and recycled: `remove` drops the removed `Frame` and pushes its slot
/// onto `free` for reuse by a later `add`, so repeated add/remove churn on the same logical frame
/// does not grow storage without bound. `order` tracks the ids currently live, in the order they
/// were (re-)inserted, since slot index is no longer the same thing as insertion order once slots
/// are recycled.
#[derive(Default)]
pub struct FrameTree {
    pub(crate) frames: Vec<Option<Frame>>,
    pub(crate) children: Vec<Children>,
    pub(crate) index: HashMap<String, FrameIdx>,
    pub(crate) dirty: Vec<bool>,
    pub(crate) world_cache: Vec<Option<Transform>>,
    order: Vec<FrameIdx>,
    free: Vec<FrameIdx>,
    listeners: Vec<Vec<(u64, Listener)>>,
    next_listener_id: u64,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames currently live in the graph (excludes recycled, removed slots).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Frame ids in insertion order, which is also topological order (§3). Reflects only frames
    /// currently live; a removed frame's slot may be recycled by a later `add`, at which point it
    /// reappears at the end of this order, as a fresh insertion.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(move |&idx| self.frame(idx).id.as_str())
    }

    /// The ids of `id`'s direct children, in the order they were added.
    pub fn children(&self, id: &str) -> Result<impl Iterator<Item = &str>, GraphError> {
        let idx = self.idx_of(id)?;
        Ok(self.children[idx.as_usize()]
            .iter()
            .map(move |&c| self.frame(c).id.as_str()))
    }

    pub(crate) fn idx_of(&self, id: &str) -> Result<FrameIdx, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::FrameNotFound(id.to_string()))
    }

    /// Borrows the live frame at `idx`. Panics if `idx` names a removed, tombstoned slot; every
    /// `FrameIdx` reachable from the public API (via `index`, `order`, or a live frame's `parent`
    /// / `children` links) always names a live slot, so this is an internal invariant, not a
    /// caller-triggerable condition.
    pub(crate) fn frame(&self, idx: FrameIdx) -> &Frame {
        self.frames[idx.as_usize()]
            .as_ref()
            .expect("FrameIdx reachable from the graph must reference a live frame")
    }

    /// Adds a new root or child frame (§4.B `add`).
    ///
    /// Fails without mutating the graph if `id` already exists, `parent` is given but absent, or
    /// the declared parent chain would create a cycle back to `id`.
    pub fn add(
        &mut self,
        id: &str,
        parent: Option<&str>,
        local: Transform,
    ) -> Result<Vec<String>, GraphError> {
        if self.index.contains_key(id) {
            return Err(GraphError::DuplicateFrame(id.to_string()));
        }
        let parent_idx = match parent {
            Some(p) => Some(
                self.index
                    .get(p)
                    .copied()
                    .ok_or_else(|| GraphError::ParentNotFound(p.to_string()))?,
            ),
            None => None,
        };
        if let Some(p) = parent_idx {
            self.check_no_cycle(p, id)?;
        }

        let frame = Frame {
            id: id.to_string(),
            parent: parent_idx,
            local_transform: local,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.frames[idx.as_usize()] = Some(frame);
                self.dirty[idx.as_usize()] = true;
                self.world_cache[idx.as_usize()] = None;
                idx
            }
            None => {
                let idx = FrameIdx(self.frames.len() as u32);
                self.frames.push(Some(frame));
                self.children.push(Children::new());
                self.dirty.push(true);
                self.world_cache.push(None);
                self.listeners.push(Vec::new());
                idx
            }
        };
        self.index.insert(id.to_string(), idx);
        self.order.push(idx);
        if let Some(p) = parent_idx {
            self.children[p.as_usize()].push(idx);
        }

        tracing::debug!(frame = id, parent = parent, "frame added");
        let stale = vec![id.to_string()];
        self.fire(&stale)?;
        Ok(stale)
    }

    /// Walks the *already-linked* ancestor chain starting at `parent_idx`; fails `CycleDetected`
    /// if it ever reaches `new_id` (which cannot yet be in the graph, so reaching it means the
    /// caller constructed a cycle through some existing frame's `parent` field).
    fn check_no_cycle(&self, parent_idx: FrameIdx, new_id: &str) -> Result<(), GraphError> {
        let mut current = Some(parent_idx);
        let mut steps = 0usize;
        while let Some(c) = current {
            if self.frame(c).id == new_id {
                return Err(GraphError::CycleDetected(new_id.to_string()));
            }
            steps += 1;
            if steps > self.order.len() {
                // Existing parent pointers already form a cycle amongst themselves.
                return Err(GraphError::CycleDetected(self.frame(c).id.clone()));
            }
            current = self.frame(c).parent;
        }
        Ok(())
    }

    /// Removes a leaf frame (§4.B `remove`). Fails `HasChildren` if `id` has any children.
    ///
    /// Drops the removed `Frame` and recycles its slot for a future `add`, so storage does not
    /// grow without bound across repeated add/remove churn (§5 memory model).
    pub fn remove(&mut self, id: &str) -> Result<(), GraphError> {
        let idx = self.idx_of(id)?;
        if !self.children[idx.as_usize()].is_empty() {
            return Err(GraphError::HasChildren(id.to_string()));
        }
        if let Some(parent) = self.frame(idx).parent {
            self.children[parent.as_usize()].retain(|&c| c != idx);
        }
        self.index.remove(id);
        self.order.retain(|&o| o != idx);
        self.listeners[idx.as_usize()].clear();
        self.world_cache[idx.as_usize()] = None;
        self.dirty[idx.as_usize()] = false;
        self.frames[idx.as_usize()] = None;
        self.free.push(idx);
        tracing::debug!(frame = id, "frame removed");
        Ok(())
    }

    /// Replaces `id`'s local transform, invalidating its entire subtree (§4.B `set_local`, §4.C
    /// dirty propagation). Returns the dirtied subtree as the stale-set.
    pub fn set_local(&mut self, id: &str, t: Transform) -> Result<Vec<String>, GraphError> {
        let idx = self.idx_of(id)?;
        self.frames[idx.as_usize()].as_mut().expect("live frame").local_transform = t;
        let stale = self.mark_subtree_dirty(idx);
        self.fire(&stale)?;
        Ok(stale)
    }

    /// Applies a batch of local-transform updates atomically (§4.B `batchSetLocal`).
    ///
    /// All ids are validated before anything is mutated. A repeated id applies last-write-wins.
    /// The returned stale-set is the ancestor-deduplicated union of touched subtrees: a frame
    /// whose ancestor is also present in `updates` does not get its own subtree traversal.
    pub fn set_local_batch(&mut self, updates: &[(&str, Transform)]) -> Result<Vec<String>, GraphError> {
        let mut resolved: Vec<(FrameIdx, Transform)> = Vec::with_capacity(updates.len());
        for &(id, t) in updates {
            resolved.push((self.idx_of(id)?, t));
        }

        // Last write wins: keep only the final transform per frame, while preserving first-seen
        // order of the key-set for the dedup pass below.
        let mut last_write: HashMap<FrameIdx, Transform> = HashMap::with_capacity(resolved.len());
        let mut key_order: Vec<FrameIdx> = Vec::with_capacity(resolved.len());
        for (idx, t) in &resolved {
            if !last_write.contains_key(idx) {
                key_order.push(*idx);
            }
            last_write.insert(*idx, *t);
        }

        for idx in &key_order {
            self.frames[idx.as_usize()].as_mut().expect("live frame").local_transform = last_write[idx];
        }

        let key_set: std::collections::HashSet<FrameIdx> = key_order.iter().copied().collect();
        let mut stale = Vec::new();
        for &idx in &key_order {
            if self.has_ancestor_in(idx, &key_set) {
                continue;
            }
            stale.extend(self.mark_subtree_dirty(idx));
        }
        self.fire(&stale)?;
        Ok(stale)
    }

    fn has_ancestor_in(&self, idx: FrameIdx, set: &std::collections::HashSet<FrameIdx>) -> bool {
        let mut current = self.frame(idx).parent;
        while let Some(c) = current {
            if set.contains(&c) {
                return true;
            }
            current = self.frame(c).parent;
        }
        false
    }

    /// Marks `idx` and every descendant dirty, evicting their cache entries, and returns the
    /// dirtied ids in pre-order (parent before its children).
    fn mark_subtree_dirty(&mut self, idx: FrameIdx) -> Vec<String> {
        let mut stale = Vec::new();
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            self.dirty[cur.as_usize()] = true;
            self.world_cache[cur.as_usize()] = None;
            stale.push(self.frame(cur).id.clone());
            stack.extend(self.children[cur.as_usize()].iter().copied());
        }
        stale
    }

    /// The composed root-to-`id` transform, recomputing and memoizing as needed (§4.C).
    pub fn world_of(&mut self, id: &str) -> Result<Transform, GraphError> {
        let idx = self.idx_of(id)?;
        let mut visiting = vec![false; self.frames.len()];
        self.world_of_idx(idx, &mut visiting)
    }

    fn world_of_idx(&mut self, idx: FrameIdx, visiting: &mut [bool]) -> Result<Transform, GraphError> {
        if !self.dirty[idx.as_usize()] {
            if let Some(t) = self.world_cache[idx.as_usize()] {
                return Ok(t);
            }
        }
        if visiting[idx.as_usize()] {
            return Err(GraphError::CycleDetected(self.frame(idx).id.clone()));
        }
        visiting[idx.as_usize()] = true;
        let local = self.frame(idx).local_transform;
        let parent = self.frame(idx).parent;
        let world = match parent {
            Some(p) => {
                let parent_world = self.world_of_idx(p, visiting)?;
                parent_world.compose(&local)
            }
            None => local,
        };
        visiting[idx.as_usize()] = false;
        self.world_cache[idx.as_usize()] = Some(world);
        self.dirty[idx.as_usize()] = false;
        Ok(world)
    }

    /// The transform mapping points expressed in `from` into `to`'s coordinates (§4.D).
    pub fn get_transform(&mut self, from: &str, to: &str) -> Result<Transform, GraphError> {
        let from_idx = self.idx_of(from)?;
        let to_idx = self.idx_of(to)?;
        if from_idx == to_idx {
            return Ok(Transform::identity());
        }

        let from_path = self.path_to_root(from_idx)?;
        let to_path = self.path_to_root(to_idx)?;
        let to_set: std::collections::HashSet<FrameIdx> = to_path.iter().copied().collect();
        if !from_path.iter().any(|f| to_set.contains(f)) {
            return Err(GraphError::NotConnected(from.to_string(), to.to_string()));
        }

        let frame_count = self.frames.len();
        let mut visiting = vec![false; frame_count];
        let world_from = self.world_of_idx(from_idx, &mut visiting)?;
        visiting.iter_mut().for_each(|v| *v = false);
        let world_to = self.world_of_idx(to_idx, &mut visiting)?;
        Ok(world_from.invert().compose(&world_to))
    }

    /// Walks `idx` to its root, detecting cycles via a per-call visited set. Used by the query
    /// engine to find the lowest common ancestor independently of the world-transform cache, so
    /// connectivity errors are correct even for an uncached frame.
    fn path_to_root(&self, idx: FrameIdx) -> Result<Vec<FrameIdx>, GraphError> {
        let mut path = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut current = Some(idx);
        while let Some(c) = current {
            if !visited.insert(c) {
                return Err(GraphError::CycleDetected(self.frame(c).id.clone()));
            }
            path.push(c);
            current = self.frame(c).parent;
        }
        Ok(path)
    }

    /// Subscribes `callback` to be invoked with `id`'s id string whenever `id` is part of a
    /// mutation's stale-set (§4.E). Returns a handle for [`FrameTree::unsubscribe`].
    pub fn on_change(
        &mut self,
        id: &str,
        callback: impl FnMut(&str) + 'static,
    ) -> Result<Unsubscribe, GraphError> {
        let idx = self.idx_of(id)?;
        let listener_id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners[idx.as_usize()].push((listener_id, Box::new(callback)));
        Ok(Unsubscribe(idx, listener_id))
    }

    /// Removes one callback previously returned by [`FrameTree::on_change`]. Idempotent: removing
    /// twice, or after the frame was removed, returns `false` without error.
    pub fn unsubscribe(&mut self, handle: Unsubscribe) -> bool {
        let Unsubscribe(idx, listener_id) = handle;
        let Some(list) = self.listeners.get_mut(idx.as_usize()) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != listener_id);
        list.len() != before
    }

    /// Fires every listener registered to each id in `stale`, in stale-set order, and in
    /// registration order within one id (§5 ordering guarantees). A listener panic is caught so
    /// it cannot corrupt graph state or stop the remaining listeners from running; panics are
    /// aggregated and surfaced once dispatch completes.
    fn fire(&mut self, stale: &[String]) -> Result<(), GraphError> {
        let mut panicked = 0usize;
        for id in stale {
            let Ok(idx) = self.idx_of(id) else { continue };
            // Listeners are taken out for the duration of the call so a listener that (contrary
            // to §5) tries to subscribe/unsubscribe on the same frame mid-dispatch cannot alias
            // the vector it is being driven from.
            let mut callbacks = std::mem::take(&mut self.listeners[idx.as_usize()]);
            let id_str = id.as_str();
            for (_, cb) in callbacks.iter_mut() {
                let wrapped = std::panic::AssertUnwindSafe(&mut **cb);
                if std::panic::catch_unwind(move || (wrapped.0)(id_str)).is_err() {
                    panicked += 1;
                }
            }
            let existing = &mut self.listeners[idx.as_usize()];
            callbacks.append(existing);
            *existing = callbacks;
        }
        if panicked > 0 {
            return Err(GraphError::ListenerPanicked(panicked));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Rotation, Vec3};

    #[test]
    fn remove_recycles_slot_instead_of_growing_storage() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        tree.add("a", Some("world"), Transform::identity()).unwrap();
        tree.remove("a").unwrap();
        tree.add("b", Some("world"), Transform::identity()).unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.frames.len(), 2, "b's add must reuse a's freed slot, not grow the arena");
        assert_eq!(tree.ids().collect::<Vec<_>>(), vec!["world", "b"]);
    }

    #[test]
    fn ids_and_len_exclude_removed_frames() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        tree.add("a", Some("world"), Transform::identity()).unwrap();
        tree.add("b", Some("world"), Transform::identity()).unwrap();
        tree.remove("a").unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.ids().collect::<Vec<_>>(), vec!["world", "b"]);
        assert!(!tree.has("a"));
    }

    #[test]
    fn repeated_add_remove_churn_does_not_grow_arena_unbounded() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        for _ in 0..50 {
            tree.add("churn", Some("world"), Transform::identity()).unwrap();
            tree.remove("churn").unwrap();
        }
        assert_eq!(tree.frames.len(), 2, "churn's slot must be recycled every iteration");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn grandparent_chain_translations() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        tree.add(
            "robot",
            Some("world"),
            Transform::new(Vec3::new(1.0, 0.0, 0.0), Rotation::identity()),
        )
        .unwrap();
        tree.add(
            "camera",
            Some("robot"),
            Transform::new(Vec3::new(0.0, 0.0, 1.0), Rotation::identity()),
        )
        .unwrap();

        let t = tree.get_transform("world", "camera").unwrap();
        let p = t.apply(Vec3::zeros());
        assert!((p - Vec3::new(1.0, 0.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn add_rejects_duplicate_and_missing_parent() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        assert_eq!(
            tree.add("world", None, Transform::identity()).unwrap_err(),
            GraphError::DuplicateFrame("world".to_string())
        );
        assert_eq!(
            tree.add("orphan", Some("ghost"), Transform::identity()).unwrap_err(),
            GraphError::ParentNotFound("ghost".to_string())
        );
    }

    #[test]
    fn remove_rejects_frame_with_children() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        tree.add("child", Some("world"), Transform::identity()).unwrap();
        assert_eq!(
            tree.remove("world").unwrap_err(),
            GraphError::HasChildren("world".to_string())
        );
    }

    #[test]
    fn batch_dedup_does_not_double_traverse_descendant_subtree() {
        let mut tree = FrameTree::new();
        tree.add("world", None, Transform::identity()).unwrap();
        tree.add("a", Some("world"), Transform::identity()).unwrap();
        tree.add("b", Some("a"), Transform::identity()).unwrap();

        let stale = tree
            .set_local_batch(&[("a", Transform::identity()), ("b", Transform::identity())])
            .unwrap();
        assert_eq!(stale.len(), 2);
        assert!(stale.contains(&"a".to_string()));
        assert!(stale.contains(&"b".to_string()));
    }

    #[test]
    fn not_connected_across_disjoint_roots() {
        let mut tree = FrameTree::new();
        tree.add("world_a", None, Transform::identity()).unwrap();
        tree.add("world_b", None, Transform::identity()).unwrap();
        assert_eq!(
            tree.get_transform("world_a", "world_b").unwrap_err(),
            GraphError::NotConnected("world_a".to_string(), "world_b".to_string())
        );
    }
}
