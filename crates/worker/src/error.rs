//! Job outcome classification.
//!
//! Everything a job can fail with is either a [`UserError`] the operator
//! sees verbatim, or a fatal system failure. The queue retries only the
//! latter.

use rundown_core::error::{CoreError, UserError, UserErrorMessage};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    User(UserError),

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    pub fn fatal(message: impl std::fmt::Display) -> Self {
        Self::Fatal(anyhow::anyhow!("{message}"))
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// The user error, if this is one.
    pub fn user_error(&self) -> Option<&UserError> {
        match self {
            Self::User(e) => Some(e),
            Self::Fatal(_) => None,
        }
    }

    pub fn is_user_message(&self, message: UserErrorMessage) -> bool {
        self.user_error().is_some_and(|e| e.message == message)
    }
}

impl From<UserError> for JobError {
    fn from(e: UserError) -> Self {
        Self::User(e)
    }
}

impl From<UserErrorMessage> for JobError {
    fn from(message: UserErrorMessage) -> Self {
        Self::User(UserError::new(message))
    }
}

/// Validation failures are shown to the operator; everything else that is
/// not already a user error is a system failure.
impl From<CoreError> for JobError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::User(user) => Self::User(user),
            CoreError::Validation(reason) => Self::User(
                UserError::new(UserErrorMessage::ValidationFailed).with_arg("reason", reason),
            ),
            other => Self::Fatal(anyhow::Error::new(other)),
        }
    }
}

impl From<crate::store::StoreError> for JobError {
    fn from(e: crate::store::StoreError) -> Self {
        Self::Fatal(anyhow::Error::new(e))
    }
}

/// For blueprint capability calls, which report in core terms.
impl From<JobError> for CoreError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::User(user) => CoreError::User(user),
            JobError::Fatal(e) => CoreError::Internal(format!("{e:#}")),
        }
    }
}
