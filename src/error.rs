use super::approval::{Action, ApprovalStatus, Role};
use super::request::RequestId;
use super::validation::ValidationErrors;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{role} may not {action} a request that is {from}")]
    IllegalTransition {
        from: ApprovalStatus,
        role: Role,
        action: Action,
    },
    #[error("A rejection needs a reason")]
    MissingReason,
}

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("Request store is unavailable: {0}")]
    Unavailable(String),
    #[error("Request {0} was not found")]
    NotFound(RequestId),
    #[error("Request {id} can no longer be edited, it is {status}")]
    NotEditable { id: RequestId, status: ApprovalStatus },
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Stored request is unreadable: {0}")]
    Codec(String),
}

impl From<sled::Error> for RepositoryError {
    fn from(value: sled::Error) -> Self {
        RepositoryError::Unavailable(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<RepositoryError>> for RepositoryError {
    fn from(value: sled::transaction::TransactionError<RepositoryError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::decode::Error> for RepositoryError {
    fn from(value: minicbor::decode::Error) -> Self {
        RepositoryError::Codec(value.to_string())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for RepositoryError {
    fn from(value: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        RepositoryError::Codec(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error("Request failed validation: {0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Transition(TransitionError),
    #[error("Request {id} can no longer be edited, it is {status}")]
    NotEditable { id: RequestId, status: ApprovalStatus },
    #[error("{role} may not delete a request that is {status}")]
    Forbidden { role: Role, status: ApprovalStatus },
    #[error("Request {0} was not found")]
    NotFound(RequestId),
    #[error("Request store is unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected failure: {0}")]
    Internal(String),
}

impl From<RepositoryError> for OrchestratorError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Unavailable(message) => OrchestratorError::Unavailable(message),
            RepositoryError::NotFound(id) => OrchestratorError::NotFound(id),
            RepositoryError::NotEditable { id, status } => {
                OrchestratorError::NotEditable { id, status }
            }
            RepositoryError::Rejected(err) => OrchestratorError::Transition(err),
            RepositoryError::Codec(message) => OrchestratorError::Internal(message),
        }
    }
}

/// A failed orchestrator call. `persisted` says whether the store already
/// holds the attempted mutation, so the caller knows not to resubmit.
#[derive(Debug)]
pub struct ActionFailure {
    pub error: OrchestratorError,
    pub persisted: bool,
}

impl ActionFailure {
    pub fn not_persisted(error: impl Into<OrchestratorError>) -> Self {
        Self {
            error: error.into(),
            persisted: false,
        }
    }

    /// Only a store outage is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self.error, OrchestratorError::Unavailable(_))
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match &self.error {
            OrchestratorError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn transition_error(&self) -> Option<&TransitionError> {
        match &self.error {
            OrchestratorError::Transition(err) => Some(err),
            _ => None,
        }
    }

    /// Text shown to the person who attempted the action.
    pub fn user_message(&self) -> String {
        let what = match &self.error {
            OrchestratorError::Validation(_) => "Please fix validation errors before submitting.",
            OrchestratorError::Transition(TransitionError::MissingReason) => {
                "Please provide a reason for rejection."
            }
            OrchestratorError::Transition(_) => "This action is not available for the request.",
            OrchestratorError::NotEditable { .. } => "The request is already being processed.",
            OrchestratorError::Forbidden { .. } => "You are not allowed to delete this request.",
            OrchestratorError::NotFound(_) => "The request no longer exists.",
            OrchestratorError::Unavailable(_) => {
                "The request service is temporarily unavailable. Please try again."
            }
            OrchestratorError::Internal(_) => "An unexpected error occurred.",
        };
        let saved = if self.persisted {
            "Your change was saved."
        } else {
            "Your change was not saved."
        };
        format!("{what} {saved}")
    }
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let saved = if self.persisted {
            "the change was saved"
        } else {
            "nothing was saved"
        };
        write!(f, "{} ({saved})", self.error)
    }
}

impl std::error::Error for ActionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<TransitionError> for OrchestratorError {
    fn from(value: TransitionError) -> Self {
        OrchestratorError::Transition(value)
    }
}

impl From<ValidationErrors> for OrchestratorError {
    fn from(value: ValidationErrors) -> Self {
        OrchestratorError::Validation(value)
    }
}
