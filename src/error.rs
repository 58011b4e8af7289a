use thiserror::Error;

pub type Result<T> = std::result::Result<T, CapabilityError>;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(
        "station {station} is at zero slant distance from ({lat}, {lon}); \
         move the grid or give the source a depth"
    )]
    ZeroDistance {
        station: String,
        lat: f64,
        lon: f64,
    },
    #[error("cell ({row}, {col}) at ({lat}, {lon}) failed: {source}")]
    CellFailed {
        row: usize,
        col: usize,
        lat: f64,
        lon: f64,
        #[source]
        source: Box<CapabilityError>,
    },
    #[error("computation cancelled after {completed} of {total} cells")]
    Cancelled { completed: usize, total: usize },
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CapabilityError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
