use p86l_core::PipelineError;
use p86l_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),

    #[error("failed to create application directories: {0}")]
    Dirs(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("reset deletes the installed game; pass --yes to confirm")]
    ResetNotConfirmed,
}

impl CliError {
    /// Exit code distinguishing integrity failures from ordinary ones.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Pipeline(error) if error.is_integrity_failure() => 3,
            Self::ResetNotConfirmed => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use p86l_core::{ExtractError, PipelineError};

    use super::CliError;

    #[test]
    fn integrity_failures_get_their_own_exit_code() {
        let unsafe_entry = CliError::from(PipelineError::from(ExtractError::UnsafeArchiveEntry {
            entry: "../evil".to_string(),
        }));
        assert_eq!(unsafe_entry.exit_code(), 3);

        assert_eq!(CliError::from(PipelineError::Offline).exit_code(), 1);
        assert_eq!(CliError::ResetNotConfirmed.exit_code(), 2);
    }
}
