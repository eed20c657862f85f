use crate::codec::DecodeError;
use crate::transport::TransportError;

/// Why a transport-level retrieval failed
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error("server responded with HTTP {0}")]
    Status(u16),

    #[error(transparent)]
    Network(#[from] TransportError),
}

/// Errors returned by a fetch. None of them are published to subscribers.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not a valid source URL: {input:?} ({reason})")]
    MalformedLocation { input: String, reason: String },

    #[error("failed to retrieve {url}: {failure}")]
    Transport {
        url: String,
        #[source]
        failure: TransportFailure,
    },

    #[error("source returned an empty payload")]
    EmptyPayload,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FetchError {
    /// HTTP status carried by a transport error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport {
                failure: TransportFailure::Status(status),
                ..
            } => Some(*status),
            _ => None,
        }
    }

    /// Whether calling the fetch again could succeed without the source changing
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport {
                failure: TransportFailure::Status(status),
                ..
            } => *status >= 500 || *status == 408 || *status == 429,
            FetchError::Transport { .. } => true,
            _ => false,
        }
    }
}
