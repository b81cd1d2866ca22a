//! Graphlink Cache - Normalized entity cache with field-level policies.
//!
//! This crate provides:
//! - A normalized entity store keyed by configurable key fields.
//! - Per-field read/merge policies, including offset/limit pagination.
//! - Stable identifier bucketing for deterministic derived booleans.
//! - Geographic distance helpers for location-derived fields.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod bucket;
mod error;
mod geo;
mod policy;
mod store;

pub use bucket::{FLAG_BUCKETS, in_lower_half, in_upper_half, stable_bucket};
pub use error::CacheError;
pub use geo::{DistanceModel, GeoPoint};
pub use policy::{FieldPolicy, MergeContext, MergeFn, PolicyError, ReadContext, ReadFn};
pub use store::{CacheEngine, EntityKey, FieldReading};
