use thiserror::Error;

/// Errors that can occur while talking to the remote document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never completed (DNS, socket, timeout)
    #[error("network failure: {message}")]
    Network { message: String },

    /// The server answered with a non-2xx status
    #[error("server responded with status {status}")]
    Status { status: u16 },

    /// The response body could not be decoded as JSON
    #[error("malformed response body: {message}")]
    Decode { message: String },
}
