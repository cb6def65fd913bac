//! Error types for the server core

use rfcserver_types::{ReturnMessage, RfcErrorInfo};
use std::sync::Arc;
use thiserror::Error;

/// Failure surfaced by server lifecycle and registration operations
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// The server handle has already been destroyed
    #[error("server handle already destroyed")]
    InvalidHandle,

    /// The verification client connection could not be opened
    #[error("client connection failed: {0}")]
    ConnectionFailure(RfcErrorInfo),

    /// A backend runtime primitive reported failure
    #[error("backend call failed: {0}")]
    BackendFailure(RfcErrorInfo),

    /// The remote function executed but returned an error or abort message
    #[error("application error: {0}")]
    ApplicationFailure(ReturnMessage),

    /// Unexpected failure caught at the actor boundary
    #[error("internal error: {0}")]
    InternalError(String),

    /// The server moved to its destroyed state; reply to a Dispose message
    #[error("server destroyed: {0}")]
    ServerDestroyed(String),

    /// The caller stopped waiting; the queued operation still runs
    #[error("wait cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// Backend error record carried by this failure, if any
    pub fn error_info(&self) -> Option<&RfcErrorInfo> {
        match self {
            ServerError::ConnectionFailure(info) | ServerError::BackendFailure(info) => Some(info),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required parameter SYSID")]
    MissingSystemId,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse YAML: {0}")]
    Parse(#[source] Arc<serde_yaml::Error>),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(Arc::new(err))
    }
}

/// Result type using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

/// Turn business return messages into a result
///
/// The first error or abort message becomes an `ApplicationFailure`; success,
/// info and warning messages pass.
pub fn check_return<'a, I>(messages: I) -> Result<()>
where
    I: IntoIterator<Item = &'a ReturnMessage>,
{
    match messages.into_iter().find(|m| m.is_failure()) {
        Some(failure) => Err(ServerError::ApplicationFailure(failure.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfcserver_types::{ReturnMessageType, RfcRc};

    #[test]
    fn test_check_return_picks_first_failure() {
        let messages = vec![
            ReturnMessage::new(ReturnMessageType::Warning, "stock low"),
            ReturnMessage::new(ReturnMessageType::Abort, "posting locked"),
            ReturnMessage::new(ReturnMessageType::Error, "never reached"),
        ];

        match check_return(&messages) {
            Err(ServerError::ApplicationFailure(msg)) => assert_eq!(msg.message, "posting locked"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_return_accepts_success() {
        let messages = [ReturnMessage::new(ReturnMessageType::Success, "posted")];
        assert!(check_return(&messages).is_ok());

        let none: Vec<ReturnMessage> = Vec::new();
        assert!(check_return(&none).is_ok());
    }

    #[test]
    fn test_error_info_accessor() {
        let info = RfcErrorInfo::new(RfcRc::CommunicationFailure, "partner not reached");
        let err = ServerError::ConnectionFailure(info.clone());
        assert_eq!(err.error_info(), Some(&info));
        assert!(ServerError::InvalidHandle.error_info().is_none());
    }
}
