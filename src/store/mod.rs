//! The persisted, deduplicated item collection.
//!
//! # Submodules
//!
//! - [`merge`]: Stable ids and the per-field merge reducer
//! - [`retention`]: Timestamp parsing, retention pruning, and ordering
//! - [`persist`]: Permissive reads and atomic writes of the store file

pub mod merge;
pub mod persist;
pub mod retention;
