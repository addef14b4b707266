//! Metrics for query, stream and pool observability
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! application installs a recorder.

pub mod counters;
pub mod histograms;
pub mod labels;
