//! Outbound channel the ledger is relayed to

mod http;

pub use http::{HttpChannelClient, DEFAULT_API_BASE_URL};

use thiserror::Error;

/// Opaque transport failure.
///
/// The text carries whatever the transport reported (status code, response
/// body, socket error) so it can be classified by
/// [`classify`](crate::sync::classify).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ChannelError(pub String);

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Delivers rendered messages to a remote destination.
#[allow(async_fn_in_trait)]
pub trait ChannelClient {
    /// Send `text` to `destination`, returning the remote message id.
    async fn send_message(&self, destination: &str, text: &str) -> Result<String, ChannelError>;
}
