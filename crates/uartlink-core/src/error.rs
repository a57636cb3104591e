use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start read loop for {address}: {source}")]
    Spawn {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("channel {address} is not open")]
    ChannelClosed { address: String },
    #[error("no send channel is connected")]
    NotConnected,
    #[error("write to {address} failed: {source}")]
    Write {
        address: String,
        #[source]
        source: io::Error,
    },
}
