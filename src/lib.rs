pub mod cli;
pub mod clustering;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod metric;
pub mod report;

pub use clustering::{
    Clusterer, ConvergenceRule, GridPosition, PartitionClusterer, TopologicalClusterer,
    TrainSummary,
};
pub use config::Settings;
pub use dataset::Dataset;
pub use error::{ClusterError, ClusterResult};
pub use evaluation::{Evaluation, PartitionAssignment, PrefetchEvaluator, PrefetchTally};
pub use metric::distance;
pub use report::RunReport;
