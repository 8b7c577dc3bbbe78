//! Extractor registry, shared scorer, and location resolver.
//!
//! Extractors are pure: raw payload + query in, scored candidate records
//! out. The registry carries one descriptor per source; the orchestrator
//! routes fetching by the descriptor's access model and hands payloads to
//! [`registry::extract_with_fallback`].

pub mod extractors;
pub mod gazetteer;
pub mod registry;
pub mod score;

pub use gazetteer::{Gazetteer, GazetteerEntry, LocationKind};
pub use registry::{
    active_keys, extract_with_fallback, fill_template, registry, AccessModel, RecordExtractor,
    Source, TestParams,
};
