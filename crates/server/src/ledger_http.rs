//! `AwardLedgerClient` backed by the ledger gateway's HTTP API.
//!
//! Routes:
//! - `POST {base}/awards` with an [`AwardRecordRequest`] body, answers a [`LedgerReceipt`]
//! - `GET {base}/awards/{tender_id}` answers an [`OnLedgerAward`] or 404
//! - `GET {base}/commits/{commit_ref}` answers an [`OnLedgerAward`] or 404

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tenderbridge_core::ledger::{
    AwardLedgerClient, AwardRecordRequest, LedgerError, LedgerReceipt, OnLedgerAward,
};
use tenderbridge_core::TenderId;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-tenderbridge-api-key";

pub struct HttpAwardLedgerClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpAwardLedgerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|error| LedgerError::Unavailable(format!("http client setup: {error}")))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LedgerError> {
        request
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(transport_error)
    }

    async fn lookup(&self, path: &str) -> Result<Option<OnLedgerAward>, LedgerError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(event_name = "ledger.http.lookup_miss", path, "no award recorded on ledger");
            return Ok(None);
        }
        decode(response).await.map(Some)
    }
}

#[async_trait]
impl AwardLedgerClient for HttpAwardLedgerClient {
    async fn record_award(
        &self,
        request: &AwardRecordRequest,
    ) -> Result<LedgerReceipt, LedgerError> {
        let response = self.send(self.client.post(self.url("/awards")).json(request)).await?;
        let receipt: LedgerReceipt = decode(response).await?;
        if receipt.content_hash != request.content_hash {
            return Err(LedgerError::Rejected(format!(
                "gateway acknowledged hash {} for submitted hash {}",
                receipt.content_hash, request.content_hash
            )));
        }
        Ok(receipt)
    }

    async fn get_award(&self, tender_id: &TenderId) -> Result<Option<OnLedgerAward>, LedgerError> {
        self.lookup(&format!("/awards/{}", tender_id.0)).await
    }

    async fn get_award_by_commit_ref(
        &self,
        commit_ref: &str,
    ) -> Result<Option<OnLedgerAward>, LedgerError> {
        self.lookup(&format!("/commits/{commit_ref}")).await
    }
}

fn transport_error(error: reqwest::Error) -> LedgerError {
    warn!(event_name = "ledger.http.transport_error", error = %error, "ledger gateway unreachable");
    LedgerError::Unavailable(error.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    response.json::<T>().await.map_err(|error| LedgerError::Decode(error.to_string()))
}

/// Throttling, timeouts and server faults are worth retrying; other refusals are final.
pub fn classify_status(status: StatusCode, body: &str) -> LedgerError {
    let detail = if body.trim().is_empty() {
        format!("gateway returned {status}")
    } else {
        format!("gateway returned {status}: {}", body.trim())
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        LedgerError::Unavailable(detail)
    } else {
        LedgerError::Rejected(detail)
    }
}
