//! Domain layer
//!
//! - `mindmap`: data model, structure builder, evolution and merge
//! - `embedding`: provider trait and the shared embedding cache
//! - `network`: per-context network models
//! - `expansion`: knowledge expansion jobs
//! - `store`: the authoritative map table with per-key locks

pub mod embedding;
pub mod expansion;
pub mod mindmap;
pub mod network;
pub mod store;
