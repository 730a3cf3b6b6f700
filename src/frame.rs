//! Interned frame storage (§9 "Arena & index representation").
//!
//! Frames are addressed by `&str` id on the public surface but stored densely by `FrameIdx` so
//! traversal, cache lookup and dirty tracking are plain vector indexing rather than hash lookups.

use crate::math::Transform;
use smallvec::SmallVec;

/// A dense index into the tree's frame arena. Slots are recycled on `remove`, so an index no
/// longer uniquely identifies one logical frame over the tree's lifetime -- only `FrameTree`'s
/// separate insertion-order list does that.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIdx(pub(crate) u32);

impl FrameIdx {
    pub(crate) fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Most frames have a handful of children at most; inline storage avoids a heap allocation per
/// interior node for the common case.
pub(crate) type Children = SmallVec<[FrameIdx; 4]>;

#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub id: String,
    pub parent: Option<FrameIdx>,
    pub local_transform: Transform,
}
