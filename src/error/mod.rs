use thiserror::Error;

use crate::routing::ReloadError;
use crate::store::StoreError;

/// Errors surfaced by the notification backend to its callers
#[derive(Error, Debug)]
pub enum BackendError {
    /// The destination channel is not in the current routing config.
    /// The notification was persisted before this was detected.
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Routing config error: {0}")]
    Reload(#[from] ReloadError),

    #[error("invalid open string '{0}': expected '<store-location>,<routing-config-path>'")]
    InvalidOpenString(String),

    #[error("backend already started")]
    AlreadyStarted,

    /// A force signal was sent while the background tasks were not running
    #[error("background tasks are not running")]
    NotRunning,
}

impl BackendError {
    pub fn is_channel_not_found(&self) -> bool {
        matches!(self, BackendError::ChannelNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BackendError::ChannelNotFound("ops".to_string());
        assert!(err.is_channel_not_found());
        assert_eq!(err.to_string(), "channel 'ops' not found");

        let err = BackendError::InvalidOpenString("only-one-part".to_string());
        assert!(!err.is_channel_not_found());
        assert!(err.to_string().contains("only-one-part"));
    }
}
