//! Job execution error types
//!
//! A job handler returns [`JobError`] to tell the broker whether retrying can
//! help. Permanent errors (malformed payload, undecodable input, a processor
//! rejecting its options) must never be retried; transient errors (storage,
//! database, cancellation) are left to the broker's retry policy.

use std::fmt;

/// Job execution error that is either permanent or transient
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    permanent: bool,
}

impl JobError {
    /// Create a permanent error.
    ///
    /// The broker must not retry the job. Use for:
    /// - payloads that fail to deserialize
    /// - files that are missing, deleted or of the wrong type
    /// - processor failures caused by the input or the options
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            permanent: true,
        }
    }

    /// Create a transient error.
    ///
    /// The broker retries according to its own policy. Use for:
    /// - storage download/upload failures
    /// - database round-trip failures
    /// - cancellation and timeouts
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            permanent: false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }

    /// Add context while keeping the classification.
    pub fn context<C>(self, context: C) -> Self
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        Self {
            inner: self.inner.context(context),
            permanent: self.permanent,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Alternate form prints the whole context chain
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Plain errors are transient
    fn from(err: anyhow::Error) -> Self {
        Self::transient(err)
    }
}

/// Extension trait for classifying a `Result` error as permanent or transient
pub trait JobResultExt<T> {
    fn permanent(self) -> Result<T, JobError>;
    fn transient(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn permanent(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::permanent(e.into()))
    }

    fn transient(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::transient(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_error() {
        let err = JobError::permanent(anyhow::anyhow!("payload malformed"));
        assert!(err.is_permanent());
        assert!(err.to_string().contains("payload malformed"));
    }

    #[test]
    fn test_transient_error() {
        let err = JobError::transient(anyhow::anyhow!("connection reset"));
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_from_anyhow_is_transient() {
        let err: JobError = anyhow::anyhow!("Some error").into();
        assert!(!err.is_permanent(), "plain errors must stay retryable");
    }

    #[test]
    fn test_context_keeps_classification() {
        let err = JobError::permanent(anyhow::anyhow!("bad width")).context("thumbnail job");
        assert!(err.is_permanent());
        let text = err.to_string();
        assert!(text.contains("thumbnail job"));
        assert!(text.contains("bad width"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("Config error"));
        assert!(result.permanent().unwrap_err().is_permanent());

        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk"));
        assert!(!result.transient().unwrap_err().is_permanent());
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = JobError::permanent(anyhow::anyhow!("decline")).into();
        let permanent = err
            .downcast_ref::<JobError>()
            .map(JobError::is_permanent)
            .unwrap_or(false);
        assert!(permanent);
    }
}
