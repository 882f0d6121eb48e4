//! # Arbor Editor
//!
//! Collaborative editing on top of the tree engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ common: ids, id compressor, string interner │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ tree: forest, views, changes, transactions  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: one replica of a shared document    │
//! │  - Optimistic local edits (Checkout)        │
//! │  - Sequenced history (EditLog)              │
//! │  - Summaries in two formats                 │
//! │  - Undo/redo, events, transport seam        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Total order decides**: every replica applies the same sequenced edits
//!    in the same order and reaches the same tree
//! 2. **Optimistic clients**: local edits show immediately and are rebased
//!    or dropped when remote edits arrive first
//! 3. **Edits never partially apply**: a change that fails leaves the view
//!    exactly as it was before the edit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arbor_editor::{LocalSequencingService, SharedTree, SharedTreeOptions};
//!
//! let mut service = LocalSequencingService::new();
//! let mut tree = SharedTree::new(SharedTreeOptions::default(), Box::new(service.connect()));
//!
//! let node = tree.generate_node_id();
//! tree.submit_edit(Change::insert_tree(
//!     vec![BuildTreeNode::new(node, "Item").into()],
//!     StablePlace::at_end_of(TraitLocation::new(tree.current_view().root(), "children")),
//! ))?;
//!
//! for (edit, seq) in service.sequence_pending() {
//!     tree.deliver_sequenced_edit(edit, seq)?;
//! }
//! ```

mod checkout;
mod config;
mod edit_log;
mod errors;
mod events;
mod merge_health;
mod revision_cache;
mod shared_tree;
pub mod summary;
mod transport;
mod undo_stack;

pub use checkout::{Checkout, CheckoutTransaction, DroppedEdit, PendingLocalEdit, RebaseOutcome, SequencedOutcome};
pub use config::{FlushMode, SharedTreeOptions, DEFAULT_OPTIONS_NAME};
pub use edit_log::{EditLocation, EditLog};
pub use errors::{ConfigError, EditorError, SummaryError};
pub use events::{Listener, SharedTreeEvent, Subscribers, SubscriptionId};
pub use merge_health::MergeHealthStats;
pub use revision_cache::RevisionCache;
pub use shared_tree::{SharedTree, TreeEdit};
pub use summary::{Summary, WriteFormat};
pub use transport::{ChannelSequencer, EditSequencer, LocalSequencingService, NullSequencer, SerializedEdit};
pub use undo_stack::{EditBatch, UndoStack};

// Re-export the types most callers need alongside a shared tree
pub use arbor_common::{EditId, IdCompressor, NodeId, SessionId, StableId};
pub use arbor_tree::{
    BuildTreeNode, Change, ChangeNode, Delta, Edit, EditStatus, FailureKind, RevisionView, StablePlace,
    StableRange, TraitLocation, TransactionFailure, TreeView,
};
