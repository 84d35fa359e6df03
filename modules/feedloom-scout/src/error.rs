use feedloom_archive::ArchiveError;

/// Result type alias for fetch-cycle operations.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("A fetch cycle is already running")]
    CycleInProgress,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
