//! Pipeline services: collaborator clients and per-step workers

pub mod centroid_cache;
pub mod dedup;
pub mod labeling;
pub mod noise;
pub mod persistence;
pub mod segments;
pub mod tenants;

pub use centroid_cache::CentroidCache;
pub use dedup::{match_clusters, ClusterMatch, MatchOutcome};
pub use labeling::{ClusterLabel, HttpLabeler, LabelRequest, LabelResponse, Labeler};
pub use persistence::{PersistOutcome, PersistenceWriter, TASK_ORIGIN};
pub use segments::{HttpSegmentSource, SegmentSource};
pub use tenants::{HttpTenantDirectory, TenantDirectory};
