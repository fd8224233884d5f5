//! NRCS ingest: input trees, MOS grouping, deltas and reconciliation.

pub mod delta;
pub mod model;
pub mod mos;
pub mod reconcile;

pub use delta::{apply_ingest_deltas, IngestDelta};
pub use model::{
    IngestPart, IngestRundown, IngestSegment, SofieIngestPart, SofieIngestRundown,
    SofieIngestSegment,
};
pub use mos::{group_mos_parts_into_ingest_segments, MosGroupingConfig};
pub use reconcile::{reconcile_rundown, IngestChangeSet, IngestMergeResult, IngestNotification};
