//! monitor-metrics — the metrics sink for endpoint probes.
//!
//! Holds per-endpoint probe counters, a response-time histogram, and an
//! in-flight gauge, and renders them in the Prometheus text exposition
//! format for the `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ProbeMetrics (Arc-shared, owns its Registry)
//!   ├── active_guard()          ← before each probe, decrements on drop
//!   ├── observe_response_time() ← once per probe
//!   ├── inc_requests()          ← once per probe
//!   └── render()                → text/plain for /metrics
//! ```
//!
//! Every update is a single atomic operation, so a scrape running
//! concurrently with a probe sees either the old or the new value.

pub mod error;
pub mod sink;

pub use error::{MetricsError, MetricsResult};
pub use sink::{ActiveProbeGuard, LABEL_CODE, LABEL_ENDPOINT, ProbeMetrics};
