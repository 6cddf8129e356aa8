// src/error.rs
//! Errors raised while talking to the target application.

use crate::remote::ObjectId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote channel is unreachable or rejected a specific call.
    #[error("remote call `{call}` failed: {message}")]
    Communication { call: &'static str, message: String },

    /// The handle belongs to a target application that is no longer running.
    #[error("remote object {0} is no longer available")]
    Stale(ObjectId),

    /// No target application is attached.
    #[error("the target application is not running")]
    NotRunning,
}

impl RemoteError {
    pub fn communication(call: &'static str, message: impl Into<String>) -> Self {
        RemoteError::Communication {
            call,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
