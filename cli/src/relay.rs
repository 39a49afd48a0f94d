//! HTTP client for the fusion relay.

use protocol::wire::{
    ErrorBody, ExecuteSponsoredRequest, ExecuteSponsoredResponse, SponsorTransactionRequest,
    SponsorTransactionResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayClientError {
    #[error("relay request failed: {0}")]
    Request(String),
    #[error("relay returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected relay response: {0}")]
    Parse(String),
}

/// The two sponsorship endpoints. Enables mocking in tests.
#[async_trait::async_trait]
pub trait RelayApi: Send + Sync {
    async fn sponsor(&self, request: &SponsorTransactionRequest) -> Result<SponsorTransactionResponse, RelayClientError>;

    async fn execute(&self, request: &ExecuteSponsoredRequest) -> Result<ExecuteSponsoredResponse, RelayClientError>;
}

pub struct HttpRelay {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    /// # Errors
    ///
    /// [`RelayClientError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RelayClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayClientError::Request(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// `GET {base}{path}` decoded as `T`.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RelayClientError> {
        self.send(self.http.get(format!("{}{path}", self.base_url))).await
    }

    /// `POST {base}{path}` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies.
    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, RelayClientError> {
        self.send(self.http.post(format!("{}{path}", self.base_url)).json(body)).await
    }

    /// `GET {base}/healthz`.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx statuses.
    pub async fn health(&self) -> Result<(), RelayClientError> {
        let response = self
            .http
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map_err(|e| RelayClientError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(RelayClientError::Status { status, message: "health check failed".to_owned() })
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, RelayClientError> {
        let response = request.send().await.map_err(|e| RelayClientError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| RelayClientError::Request(e.to_string()))?;
        decode_response(status, &text)
    }
}

#[async_trait::async_trait]
impl RelayApi for HttpRelay {
    async fn sponsor(&self, request: &SponsorTransactionRequest) -> Result<SponsorTransactionResponse, RelayClientError> {
        self.post("/api/sponsor-transaction", request).await
    }

    async fn execute(&self, request: &ExecuteSponsoredRequest) -> Result<ExecuteSponsoredResponse, RelayClientError> {
        self.post("/api/execute-sponsored-transaction", request).await
    }
}

/// Decode a relay response, turning error statuses into the relay's message.
///
/// # Errors
///
/// [`RelayClientError::Status`] for non-2xx, [`RelayClientError::Parse`] for
/// bodies that do not match `T`.
pub fn decode_response<T: DeserializeOwned>(status: u16, text: &str) -> Result<T, RelayClientError> {
    if !(200..300).contains(&status) {
        return Err(RelayClientError::Status { status, message: error_message(text) });
    }
    serde_json::from_str(text).map_err(|e| RelayClientError::Parse(e.to_string()))
}

fn error_message(text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(text) {
        return match body.details {
            Some(details) => format!("{}: {details}", body.error),
            None => body.error,
        };
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.to_string(),
        Err(_) => text.trim().to_owned(),
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
