//! # Sitewatch Core
//!
//! The concurrent probing engine.
//!
//! * **[`sampler`]**: point-in-time host CPU and memory readings.
//! * **[`prober`]**: a single bounded, certificate-tolerant reachability attempt.
//! * **[`classifier`]**: turns a resource delta into a [`Verdict`](sitewatch_common::model::Verdict).
//! * **[`governor`]**: background host-load watch that throttles or aborts the pool.
//! * **[`orchestrator`]**: the bounded worker pool tying everything together.
//! * **[`store`]**: the persisted target list and its marks.

pub mod classifier;
pub mod governor;
pub mod orchestrator;
pub mod prober;
pub mod sampler;
pub mod store;

pub use orchestrator::Orchestrator;
