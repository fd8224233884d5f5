//! The rundown job worker.
//!
//! Callers submit [`PlayoutJob`]s and [`IngestJob`]s through a [`Worker`].
//! Jobs on the same playlist (or rundown) run one at a time in submission
//! order, each holding the resource lock for its whole duration. Results
//! are persisted through the [`Store`], and changes are announced on the
//! event bus once the lock has been released.

pub mod auto_next;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod lock;
pub mod model;
pub mod playout;
pub mod queue;
pub mod store;
pub mod trace;
pub mod worker;

pub use clock::{Clock, TokioClock};
pub use config::WorkerConfig;
pub use error::{JobError, JobResult};
pub use ingest::{IngestJob, IngestJobOutput};
pub use jobs::{PlayoutJob, PlayoutJobOutput};
pub use playout::TimelineUpdate;
pub use store::Store;
pub use worker::{Worker, WorkerBuilder};
