//! # Dialog Paths
//!
//! Path algebra for settings dialogs driven by a JSON schema.
//!
//! ## Architecture
//!
//! ```text
//! Scope (#/properties/rows/items/properties/v)
//!     │
//!     ├──> scope_to_data_paths ──> ["rows", "v"]
//!     │      └─ combine_data_paths_with_indices([1]) ──> "rows.1.v"
//!     │
//!     ├──> get_indices_from_data_paths("rows.1.v") ──> indices [1]
//!     │
//!     ├──> ArrayIdentityRegistry
//!     │      └─ [1] <──> [index id], surviving inserts/removals/moves
//!     │
//!     └──> Dependency extraction
//!            ├─ get_dependency_values: read, fan out over arrays
//!            └─ write_targets: concrete leaf paths to write
//! ```

mod dependencies;
mod error;
mod identity;
mod scope;
pub mod tree;

pub use dependencies::{collect_dependencies, get_dependency_values, write_targets, WriteTarget};
pub use error::{PathError, Result};
pub use identity::{ArrayIdentityRegistry, ArrayRecord, IndexId, RecordCursor};
pub use scope::{
    combine_data_paths_with_indices, combine_scope_with_indices, get_indices_from_data_paths,
    join_path, scope_to_data_paths, IndexedMatch,
};
