//! Buffered frame graph: time-aware queries layered over the static graph (§4.H).

use std::collections::HashMap;

use crate::error::GraphError;
use crate::frame::FrameIdx;
use crate::math::Transform;
use crate::temporal::TemporalBuffer;
use crate::tree::{FrameTree, Unsubscribe};

/// Construction options for [`BufferedFrameTree`].
#[derive(Clone, Copy, Debug)]
pub struct BufferedTreeOptions {
    /// Retention window for per-frame temporal buffers, in milliseconds.
    pub max_buffer_duration_ms: i64,
}

impl Default for BufferedTreeOptions {
    fn default() -> Self {
        Self {
            max_buffer_duration_ms: 10_000,
        }
    }
}

/// A [`FrameTree`] augmented with per-frame time-indexed sample buffers (§4.H).
///
/// `set_transform` performs the ordinary static update (cache invalidation, listener firing) and
/// then records the sample; `get_transform_at` walks the graph composing each frame's transform
/// *at that timestamp* rather than consulting the static world-transform cache.
pub struct BufferedFrameTree {
    tree: FrameTree,
    buffers: HashMap<FrameIdx, TemporalBuffer>,
    max_buffer_duration_ms: i64,
}

impl BufferedFrameTree {
    pub fn new(options: BufferedTreeOptions) -> Self {
        Self {
            tree: FrameTree::new(),
            buffers: HashMap::new(),
            max_buffer_duration_ms: options.max_buffer_duration_ms,
        }
    }

    /// The underlying static graph, for callers that only need non-temporal operations.
    pub fn tree(&self) -> &FrameTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut FrameTree {
        &mut self.tree
    }

    pub fn has(&self, id: &str) -> bool {
        self.tree.has(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tree.ids()
    }

    pub fn add(
        &mut self,
        id: &str,
        parent: Option<&str>,
        local: Transform,
    ) -> Result<Vec<String>, GraphError> {
        self.tree.add(id, parent, local)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), GraphError> {
        let idx = self.tree.idx_of(id)?;
        self.tree.remove(id)?;
        self.buffers.remove(&idx);
        Ok(())
    }

    pub fn get_transform(&mut self, from: &str, to: &str) -> Result<Transform, GraphError> {
        self.tree.get_transform(from, to)
    }

    pub fn on_change(
        &mut self,
        id: &str,
        callback: impl FnMut(&str) + 'static,
    ) -> Result<Unsubscribe, GraphError> {
        self.tree.on_change(id, callback)
    }

    pub fn unsubscribe(&mut self, handle: Unsubscribe) -> bool {
        self.tree.unsubscribe(handle)
    }

    /// Performs the non-temporal update (invalidating the cache and firing listeners) and then
    /// appends the sample to `id`'s buffer, creating it lazily on first write.
    pub fn set_transform(
        &mut self,
        id: &str,
        t: Transform,
        ts_ms: i64,
    ) -> Result<Vec<String>, GraphError> {
        let idx = self.tree.idx_of(id)?;
        let stale = self.tree.set_local(id, t)?;
        self.buffers
            .entry(idx)
            .or_insert_with(|| TemporalBuffer::new(self.max_buffer_duration_ms))
            .push(ts_ms, t);
        tracing::trace!(frame = id, ts = ts_ms, "temporal sample recorded");
        Ok(stale)
    }

    /// The transform mapping points expressed in `from` into `to`'s coordinates *at `ts_ms`*
    /// (§4.H), computed from interpolated local transforms rather than the static world cache.
    pub fn get_transform_at(&self, from: &str, to: &str, ts_ms: i64) -> Result<Transform, GraphError> {
        let from_idx = self.tree.idx_of(from)?;
        let to_idx = self.tree.idx_of(to)?;
        if from_idx == to_idx {
            return Ok(Transform::identity());
        }
        let mut visiting = vec![false; self.tree.frames.len()];
        let world_from = self.world_at(from_idx, ts_ms, &mut visiting)?;
        let mut visiting = vec![false; self.tree.frames.len()];
        let world_to = self.world_at(to_idx, ts_ms, &mut visiting)?;
        Ok(world_from.invert().compose(&world_to))
    }

    /// Recursively composes each ancestor's `world_at` with the local transform at `ts_ms`,
    /// taken from the frame's buffer if it has any samples, otherwise from the static local
    /// transform. Cycles are detected per-call via `visiting`, matching the static query engine.
    fn world_at(&self, idx: FrameIdx, ts_ms: i64, visiting: &mut [bool]) -> Result<Transform, GraphError> {
        if visiting[idx.as_usize()] {
            let id = &self.tree.frame(idx).id;
            return Err(GraphError::CycleDetected(id.clone()));
        }
        visiting[idx.as_usize()] = true;

        let frame = self.tree.frame(idx);
        let local = match self.buffers.get(&idx) {
            Some(buf) if !buf.is_empty() => buf.interpolate(&frame.id, ts_ms)?,
            _ => frame.local_transform,
        };
        let parent = frame.parent;
        let world = match parent {
            Some(p) => {
                let parent_world = self.world_at(p, ts_ms, visiting)?;
                parent_world.compose(&local)
            }
            None => local,
        };
        visiting[idx.as_usize()] = false;
        Ok(world)
    }
}
