use thiserror::Error;

/// Invalid session parameters. Raised before any trial runs; a caller that
/// receives one must not start the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid choice count: {0} (must be 1-6)")]
    InvalidChoiceCount(usize),

    #[error("Invalid segment count: {0} (must be 1-6)")]
    InvalidSegmentCount(usize),

    #[error(
        "Invalid shared quadrants: {shared} (must be at least 1 and below the segment count {segment_count})"
    )]
    InvalidSharedQuadrants { shared: usize, segment_count: usize },

    #[error("No delay conditions configured")]
    NoConditions,
}
