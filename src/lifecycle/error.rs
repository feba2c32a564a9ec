//! Lifecycle-specific error types

use super::{Operation, State};
use crate::error::ArmatureError;
use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `start()`/`stop()` was called while the other operation is in flight
    #[error("Cannot {operation} the application while {state}")]
    InvalidState {
        /// The operation that was attempted
        operation: Operation,
        /// The state the application was in
        state: State,
    },

    /// Observer initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Observer shutdown failed
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    /// Hook execution failed
    #[error("Hook execution failed for {observer}: {message}")]
    HookFailed {
        /// Name of the observer that failed
        observer: String,
        /// Error message
        message: String,
    },

    /// The in-flight transition a caller was waiting on failed
    #[error("Application {operation} failed: {message}")]
    TransitionFailed {
        /// The operation that failed
        operation: Operation,
        /// Message of the original failure
        message: String,
    },

    /// Installing an OS signal handler failed
    #[error("Signal handler setup failed: {0}")]
    SignalSetup(String),

    /// The lifecycle registry could not be resolved
    #[error(transparent)]
    Dependency(#[from] ArmatureError),
}

impl LifecycleError {
    /// Create an invalid state error
    pub fn invalid_state(operation: Operation, state: State) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create an initialization failure error
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a shutdown failure error
    pub fn shutdown_failed(msg: impl Into<String>) -> Self {
        Self::ShutdownFailed(msg.into())
    }

    /// Create a hook failure error
    pub fn hook_failed(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            observer: observer.into(),
            message: message.into(),
        }
    }

    /// Create a signal setup error
    pub fn signal_setup(msg: impl Into<String>) -> Self {
        Self::SignalSetup(msg.into())
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
