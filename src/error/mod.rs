use thiserror::Error;

use crate::channel::ChannelError;
use crate::endpoint::EndpointError;
use crate::event::DecodeError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl SyncError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Channel(ChannelError::Connect { .. } | ChannelError::Timeout { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
