//! frame_graph - a graph of named spatial reference frames with a lazily-invalidated
//! world-transform cache and a time-indexed transform buffer.
//!
//! This crate answers two questions in O(depth) time: given two frames, what transform maps
//! points from one into the other (`FrameTree::get_transform`); and given two frames plus a
//! timestamp, what was that transform at that moment (`BufferedFrameTree::get_transform_at`). It
//! is the embeddable-library analogue of the ROS `tf2` stack.
//!
//! # Example
//!
//! ```
//! use frame_graph::{FrameTree, Transform, Vec3, Rotation};
//!
//! let mut tree = FrameTree::new();
//! tree.add("world", None, Transform::identity()).unwrap();
//! tree.add("robot", Some("world"), Transform::new(Vec3::new(1.0, 0.0, 0.0), Rotation::identity())).unwrap();
//! tree.add("camera", Some("robot"), Transform::new(Vec3::new(0.0, 0.0, 1.0), Rotation::identity())).unwrap();
//!
//! let world_to_camera = tree.get_transform("world", "camera").unwrap();
//! assert_eq!(world_to_camera.apply(Vec3::zeros()), Vec3::new(1.0, 0.0, 1.0));
//! ```

pub mod buffered;
pub mod error;
mod frame;
pub mod math;
pub mod serializer;
pub mod temporal;
pub mod tree;

pub use buffered::{BufferedFrameTree, BufferedTreeOptions};
pub use error::GraphError;
pub use math::{Rotation, Transform, TransformRecord, Vec3};
pub use serializer::{FrameRecord, Snapshot};
pub use temporal::TemporalBuffer;
pub use tree::{FrameTree, Unsubscribe};
