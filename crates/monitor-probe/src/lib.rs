//! monitor-probe — periodic HTTP probing of a single target.
//!
//! A `Scheduler` consumes ticks from a `TickSource` and runs one probe per
//! tick, strictly one at a time. Each probe (`ProbeService::check_status`)
//! issues a bounded GET, classifies the outcome, and records it in the
//! shared `ProbeMetrics` sink.
//!
//! # Architecture
//!
//! ```text
//! run_probe_loop
//!   └── Scheduler<TickSource>
//!       ├── wait: tick OR shutdown (shutdown wins)
//!       └── ProbeService::check_status(url)
//!           ├── active gauge +1 (guard)
//!           ├── GET under min(parent deadline, now + timeout)
//!           ├── classify → "<code>" | "499" | "no status code"
//!           ├── response_time + num_requests
//!           ├── active gauge -1
//!           └── optional failure annotation (fire-and-forget)
//! ```
//!
//! # Classification
//!
//! A probe whose deadline expires is recorded as `499`. A probe that got a
//! response is recorded under the literal status code, whatever it is. A
//! probe that failed without a response (DNS, refused, TLS) is recorded as
//! `no status code`. Both synthetic labels are kept verbatim for existing
//! dashboards.

pub mod checker;
pub mod monitor;
pub mod scheduler;

pub use checker::{
    CLIENT_CLOSED_REQUEST, NO_STATUS_CODE, ProbeOutcome, ProbeService, TimeProvider,
    system_time_provider,
};
pub use monitor::run_probe_loop;
pub use scheduler::{IntervalTicks, Scheduler, TickSource};
