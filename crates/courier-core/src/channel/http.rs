//! Bot-style HTTP channel client

use serde::Deserialize;

use super::{ChannelClient, ChannelError};
use crate::error::{Error, Result};
use crate::util::{is_http_url, truncate_chars};

/// Default API endpoint for bot-style chat channels.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Error bodies are kept up to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Posts messages to `{base}/bot{token}/sendMessage`.
#[derive(Clone)]
pub struct HttpChannelClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpChannelClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpChannelClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HttpChannelClient {
    pub fn new(base_url: impl AsRef<str>, token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://: {base_url}"
            )));
        }

        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(Error::Config("Bot token must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Config(format!("Failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

impl ChannelClient for HttpChannelClient {
    async fn send_message(
        &self,
        destination: &str,
        text: &str,
    ) -> std::result::Result<String, ChannelError> {
        let payload = serde_json::json!({
            "chat_id": destination,
            "text": text,
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(ChannelError(format!(
                "{}: {}",
                status.as_u16(),
                truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS)
            )));
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|error| ChannelError(format!("invalid response payload: {error}")))?;
        match parsed {
            SendResponse {
                ok: true,
                result: Some(sent),
                ..
            } => Ok(sent.message_id.to_string()),
            SendResponse { description, .. } => Err(ChannelError(format!(
                "channel rejected message: {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

fn transport_error(error: reqwest::Error) -> ChannelError {
    // The token is part of the URL
    let error = error.without_url();
    if error.is_timeout() {
        ChannelError(format!("timeout: {error}"))
    } else {
        ChannelError(format!("network error: {error}"))
    }
}
