//! Segmented, generational object heap
pub mod barrier;
pub mod block;
pub mod chunkset;
pub mod collect;
pub mod config;
pub mod cptr;
pub mod error;
pub mod heap;
pub mod kind;
pub mod lob;
pub mod metrics;
pub mod segment;
pub mod store;

pub use collect::Tracer;
pub use config::{CollectionPolicy, HeapConfig};
pub use cptr::{ObjRef, SegmentIndex};
pub use error::{ConfigError, HeapError};
pub use heap::{Heap, HeapView};
pub use kind::{AuxLength, Chunks, KindId, KindSpec, ObjectLayout, TypeTag};
pub use metrics::{CollectionReport, GcMetrics, HeapStats};
pub use segment::Generation;
