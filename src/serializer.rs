//! Topological snapshot and replay (§4.F, §6.2).
//!
//! The snapshot shape is a plain `serde`-derived struct; the JSON in §6.2 falls directly out of
//! `serde_json::to_string`/`from_str` rather than hand-written formatting.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::math::TransformRecord;
use crate::tree::FrameTree;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    pub transform: TransformRecord,
}

/// A fully-owned, parents-before-children snapshot of a [`FrameTree`] (§6.2).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub frames: Vec<FrameRecord>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl FrameTree {
    /// Emits every *live* frame in insertion order (parents before children, by the
    /// insertion-order invariant of §3). Frames removed via `remove` have their slot recycled and
    /// are not live, so they are correctly absent from the snapshot.
    pub fn to_snapshot(&self) -> Snapshot {
        let frames = self
            .ids()
            .map(|id| {
                let idx = self.idx_of(id).expect("id came from ids()");
                let f = self.frame(idx);
                FrameRecord {
                    id: f.id.clone(),
                    parent_id: f.parent.map(|p| self.frame(p).id.clone()),
                    transform: TransformRecord::from(&f.local_transform),
                }
            })
            .collect();
        Snapshot { frames }
    }

    /// Replays a snapshot into a fresh, empty tree by calling [`FrameTree::add`] in order.
    /// Propagates `DuplicateFrame`, `ParentNotFound`, `CycleDetected` exactly as `add` would.
    pub fn from_snapshot(snap: &Snapshot) -> Result<Self, GraphError> {
        let mut tree = FrameTree::new();
        for record in &snap.frames {
            tree.add(
                &record.id,
                record.parent_id.as_deref(),
                (&record.transform).into(),
            )?;
        }
        Ok(tree)
    }
}
