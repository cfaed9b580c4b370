//! Workload driver for the `segheap` binary
pub mod options;
pub mod statistics;
pub mod workload;
