//! Public facade crate for `repodocs`.
//!
//! This crate intentionally contains no IO or extraction logic.
//! It re-exports the backend-agnostic types/traits from `repodocs-core`.

pub use repodocs_core::*;
