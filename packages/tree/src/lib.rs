//! # Arbor Tree
//!
//! The tree model and the transaction engine: persistent forest, views,
//! cursors, anchors, the change set and its application.
//!
//! Nothing here knows about replicas or sequencing. Given the same view and
//! the same changes, every function in this crate returns the same result.

pub mod anchors;
pub mod change;
pub mod cursor;
pub mod error;
pub mod forest;
pub mod node;
pub mod payload;
pub mod persistent_map;
pub mod revert;
pub mod transaction;
pub mod view;

pub use anchors::*;
pub use change::*;
pub use cursor::*;
pub use error::*;
pub use forest::*;
pub use node::*;
pub use payload::*;
pub use persistent_map::PersistentMap;
pub use revert::revert;
pub use transaction::*;
pub use view::*;
