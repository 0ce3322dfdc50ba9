//! Token record lifecycle and multi-standard normalization engine
//!
//! This crate re-exports all the components of the tokenforge workspace.

pub use tokenforge_core::*;
pub use tokenforge_mapping::*;
pub use tokenforge_runtime::*;
pub use tokenforge_storage_impl::*;
