//! Import-time transformation: staging, merging and consolidation.
//!
//! Source readers write typed rows into the [`staging::StagingStore`];
//! the [`merge`] functions decide how a new sighting combines with what
//! is already staged; the [`consolidate::Consolidator`] joins the staged
//! facets into one document per branch and streams batches to the
//! loader. Nothing here touches the relational store.

pub mod consolidate;
pub mod merge;
pub mod staging;

pub use consolidate::{ConsolidationStats, Consolidator};
pub use staging::{Namespace, StagingStore};
