//! Domain types for the clustering pipeline

pub mod cluster;
pub mod run;
pub mod segment;
pub mod task;

pub use cluster::{Cluster, ClusterMetrics, ClusteringResult};
pub use run::{RunMetrics, RunSession, RunState};
pub use segment::Segment;
pub use task::{ClusteringWatermark, Task, TaskSegmentLink};
