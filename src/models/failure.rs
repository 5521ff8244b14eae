//! Failures raised by test code
//!
//! Test bodies and fixture hooks report their outcome through `TestFailure`
//! instead of unwinding. Each variant maps to the result state it produces.

use std::any::Any;
use thiserror::Error;

use super::result_state::ResultState;

/// Outcome raised from a test body, setup or teardown hook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestFailure {
    #[error("{message}")]
    Assertion {
        message: String,
        stack_trace: Option<String>,
    },

    #[error("{0}")]
    Ignore(String),

    #[error("{0}")]
    Inconclusive(String),

    /// Early successful exit from a test
    #[error("{0}")]
    Success(String),

    #[error("{kind} : {message}")]
    Error {
        kind: String,
        message: String,
        stack_trace: Option<String>,
    },

    #[error("panicked : {0}")]
    Panic(String),

    /// Wrapper added by the invocation layer; never recorded as-is
    #[error("Exception has been thrown by the target of an invocation")]
    Invocation(#[source] Box<TestFailure>),
}

impl TestFailure {
    pub fn assertion(message: impl Into<String>) -> Self {
        TestFailure::Assertion {
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TestFailure::Error {
            kind: kind.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(self, trace: impl Into<String>) -> Self {
        match self {
            TestFailure::Assertion { message, .. } => TestFailure::Assertion {
                message,
                stack_trace: Some(trace.into()),
            },
            TestFailure::Error { kind, message, .. } => TestFailure::Error {
                kind,
                message,
                stack_trace: Some(trace.into()),
            },
            other => other,
        }
    }

    /// Wraps a failure the way the invocation layer does
    pub fn wrapped(self) -> Self {
        TestFailure::Invocation(Box::new(self))
    }

    /// Strips invocation wrappers down to the real cause
    pub fn unwrap_invocation(self) -> Self {
        let mut failure = self;
        while let TestFailure::Invocation(inner) = failure {
            failure = *inner;
        }
        failure
    }

    /// Converts a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TestFailure::Panic(message)
    }

    /// Result state this failure produces when recorded
    pub fn result_state(&self) -> ResultState {
        match self {
            TestFailure::Assertion { .. } => ResultState::FAILURE,
            TestFailure::Ignore(_) => ResultState::IGNORED,
            TestFailure::Inconclusive(_) => ResultState::INCONCLUSIVE,
            TestFailure::Success(_) => ResultState::SUCCESS,
            TestFailure::Error { .. } | TestFailure::Panic(_) => ResultState::ERROR,
            TestFailure::Invocation(inner) => inner.result_state(),
        }
    }

    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            TestFailure::Assertion { stack_trace, .. } | TestFailure::Error { stack_trace, .. } => {
                stack_trace.as_deref()
            }
            TestFailure::Invocation(inner) => inner.stack_trace(),
            _ => None,
        }
    }
}
