//! Error types for calls against the task service.

use std::fmt;

use thiserror::Error;

/// The five logical operations the task service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Search,
    Upsert,
    Delete,
    Execute,
}

impl Operation {
    /// Text shown when a call fails without a server-provided message.
    pub fn generic_failure(&self) -> &'static str {
        match self {
            Operation::List | Operation::Search => {
                "Failed to fetch tasks from the API. Check backend status."
            }
            Operation::Upsert => "Failed to save task. Check API status.",
            Operation::Delete => "Failed to delete task.",
            Operation::Execute => "Failed to run task command.",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Operation::List | Operation::Search => "fetch tasks",
            Operation::Upsert => "save task",
            Operation::Delete => "delete task",
            Operation::Execute => "run task",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Search => "search",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// A classified failure of a single gateway call.
///
/// A search answered with "not found" is not an error and never reaches this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The service answered, but not with success.
    #[error("{operation} failed with status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    OperationFailed {
        operation: Operation,
        status: u16,
        message: Option<String>,
    },

    /// No response was obtained at all.
    #[error("task service unreachable during {operation}: {reason}")]
    Unreachable { operation: Operation, reason: String },
}

impl GatewayError {
    pub fn operation(&self) -> Operation {
        match self {
            GatewayError::OperationFailed { operation, .. } => *operation,
            GatewayError::Unreachable { operation, .. } => *operation,
        }
    }

    /// Message extracted from the response body, if the service sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::OperationFailed { message, .. } => message.as_deref(),
            GatewayError::Unreachable { .. } => None,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, GatewayError::Unreachable { .. })
    }

    /// The text an operator sees for this failure.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Unreachable { .. } => {
                "Cannot reach the task service. Check that the backend is running.".to_string()
            }
            GatewayError::OperationFailed {
                operation,
                message: Some(message),
                ..
            } => format!("Failed to {}: {}", operation.verb(), message),
            GatewayError::OperationFailed { operation, .. } => {
                operation.generic_failure().to_string()
            }
        }
    }
}
