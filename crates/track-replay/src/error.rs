use std::path::PathBuf;
use track_engine::TrackError;

/// Errors of a replay run
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse GPX {}: {source}", path.display())]
    Gpx {
        path: PathBuf,
        #[source]
        source: gpx::errors::GpxError,
    },

    #[error("Failed to parse JSON {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported input {} (expected .gpx or .json)", .0.display())]
    UnsupportedInput(PathBuf),

    #[error("Failed to build track: {0}")]
    Track(#[from] TrackError),

    #[error("No animatable tracks were loaded")]
    NothingToReplay,

    #[error("Timeline step must be a positive number, got {0}")]
    InvalidStep(f64),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
