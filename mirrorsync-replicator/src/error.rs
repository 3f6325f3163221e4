use std::error::Error;
use std::io;

use mirrorsync::error::SyncError;
use thiserror::Error;

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Errors ending the replicator process.
#[derive(Debug, Error)]
pub enum ReplicatorError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("configuration error: {0}")]
    Config(Box<dyn Error + Send + Sync>),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReplicatorError {
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err))
    }

    /// Short category label used in reports.
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Sync(_) => "replicator error",
            ReplicatorError::Config(_) => "configuration error",
            ReplicatorError::Io(_) => "i/o error",
            ReplicatorError::Other(_) => "replicator error",
        }
    }

    /// Multi-line report with the error chain, for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("replicator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use mirrorsync::error::ErrorKind;

    use super::*;

    #[test]
    fn report_lists_the_category_and_error() {
        let err = ReplicatorError::from(SyncError::from((
            ErrorKind::ConfigError,
            "Scheduler offset is invalid",
        )));

        let report = err.render_report();
        assert!(report.starts_with("replicator failed\n"));
        assert!(report.contains("category: replicator error"));
        assert!(report.contains("Scheduler offset is invalid"));
    }

    #[test]
    fn io_errors_are_reported_with_their_cause() {
        let err = ReplicatorError::from(io::Error::other("disk full"));

        assert_eq!(err.category(), "i/o error");
        assert!(err.render_report().contains("cause 1: disk full"));
    }

    #[test]
    fn context_is_reported_before_its_cause() {
        let err = ReplicatorError::from(
            anyhow::Error::new(io::Error::other("connection refused"))
                .context("failed to load the metadata catalog"),
        );

        let report = err.render_report();
        assert!(report.contains("error: failed to load the metadata catalog"));
        assert!(report.contains("cause 1: connection refused"));
    }
}
