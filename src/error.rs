use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Row {row}, component {column}: {value} is not a request indicator in [0, 1]")]
    InvalidComponent { row: usize, column: usize, value: f32 },

    #[error("Clusterer has not been trained. Call train() first")]
    NotTrained,

    #[error("Clusterer is already trained; construct a new one for another run")]
    AlreadyTrained,

    #[error("Point {index} is not a member of any cluster")]
    UnassignedPoint { index: usize },

    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
