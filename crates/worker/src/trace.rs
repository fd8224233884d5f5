//! Timing spans around expensive operations.
//!
//! A [`Trace`] measures one operation. When the [`Tracer`] has a sink the
//! measurement goes there; otherwise it is only logged.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceMeasurement {
    pub name: &'static str,
    /// Free-form context such as the playlist id.
    pub context: String,
    pub duration_ms: f64,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, measurement: &TraceMeasurement);
}

pub struct Trace {
    name: &'static str,
    context: String,
    started: Instant,
}

impl Trace {
    pub fn start(name: &'static str, context: impl Into<String>) -> Self {
        Self {
            name,
            context: context.into(),
            started: Instant::now(),
        }
    }

    pub fn end(self) -> TraceMeasurement {
        TraceMeasurement {
            name: self.name,
            context: self.context,
            duration_ms: self.started.elapsed().as_secs_f64() * 1_000.0,
        }
    }
}

#[derive(Clone, Default)]
pub struct Tracer {
    sink: Option<Arc<dyn TraceSink>>,
}

impl Tracer {
    pub fn new(sink: Option<Arc<dyn TraceSink>>) -> Self {
        Self { sink }
    }

    pub fn start(&self, name: &'static str, context: impl Into<String>) -> Trace {
        Trace::start(name, context)
    }

    pub fn end(&self, trace: Trace) {
        let measurement = trace.end();
        tracing::debug!(
            trace = measurement.name,
            context = %measurement.context,
            duration_ms = measurement.duration_ms,
            "Trace"
        );
        if let Some(sink) = &self.sink {
            sink.record(&measurement);
        }
    }
}
