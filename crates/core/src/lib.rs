//! Rundown core: the pure domain logic of the playout engine.
//!
//! Everything in this crate is synchronous and free of I/O so that it can be
//! used by the job worker, by tooling, and directly from tests:
//!
//! - [`ids`]: type-tagged identifiers for every entity kind.
//! - [`overrides`]: the "defaults + override operations" settings model.
//! - [`models`]: rundowns, playlists, instances, studios, show styles, timeline.
//! - [`ingest`]: reconciliation of NRCS data against Sofie's working copy.
//! - [`playout`]: piece lifespans, next-part selection and lookahead.
//! - [`timeline`]: timeline building, route sets and AB-pool assignment.
//! - [`notes`]: user-facing notes and their aggregation.
//! - [`blueprint`]: the capability contracts blueprints are called through.

pub mod blueprint;
pub mod diff;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod ingest;
pub mod models;
pub mod notes;
pub mod overrides;
pub mod playout;
pub mod timeline;
pub mod types;
