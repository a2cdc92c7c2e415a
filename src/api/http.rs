//! HTTP implementation of the [`WalletApi`] trait against jmwalletd
//!
//! All requests carry the session token as `x-jm-authorization: Bearer ..`
//! so a reverse proxy in front of the backend can apply its own
//! authentication before forwarding the header as `Authorization`.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use async_trait::async_trait;

use crate::api::types::{
    AddressResponse, DirectSendRequest, DirectSendResponse, FreezeRequest, TxInfo, UtxosResponse,
    WalletDisplayResponse, WalletInfo,
};
use crate::api::{WalletApi, FIDELITY_BOND_JAR};
use crate::data_structures::{Lockdate, Utxo, UtxoId};
use crate::errors::ApiError;

const AUTHORIZATION_HEADER: &str = "x-jm-authorization";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a single unlocked wallet on a jmwalletd instance
pub struct HttpWalletApi {
    client: Client,
    base_url: String,
    wallet_name: String,
    token: String,
}

impl HttpWalletApi {
    /// Create a client for the given backend, wallet and session token
    pub fn new(
        base_url: impl Into<String>,
        wallet_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, wallet_name, token, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        wallet_name: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wallet_name: wallet_name.into(),
            token: token.into(),
        })
    }

    fn wallet_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/wallet/{}/{}",
            self.base_url, self.wallet_name, path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION_HEADER, format!("Bearer {}", self.token))
    }

    /// Turn a response into a typed body, mapping non-success statuses to
    /// [`ApiError::Http`] with the backend's JSON `message` when present.
    async fn into_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ApiError::decode(e.to_string()))
        } else {
            Err(Self::error_from_response(status, response).await)
        }
    }

    async fn error_from_response(status: StatusCode, response: Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        Self::error_from_body(status, &body)
    }

    /// Prefer the backend's JSON `message` field, fall back to the raw
    /// body, then to the canonical status reason.
    fn error_from_body(status: StatusCode, body: &str) -> ApiError {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(|it| it.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.to_string());
        let message = if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown reason")
                .to_string()
        } else {
            message
        };
        ApiError::http(status.as_u16(), message)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        Self::into_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: String,
        body: &impl serde::Serialize,
    ) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "POST");
        let response = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        Self::into_json(response).await
    }
}

#[async_trait]
impl WalletApi for HttpWalletApi {
    async fn freeze_utxo(&self, id: &UtxoId, freeze: bool) -> Result<(), ApiError> {
        let request = FreezeRequest {
            utxo: id.clone(),
            freeze,
        };
        let url = self.wallet_url("freeze");
        tracing::debug!(url = %url, utxo = %id, freeze, "POST");
        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        // the freeze endpoint body carries no information on success
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(status, response).await)
        }
    }

    async fn new_address(&self, jar: u32) -> Result<String, ApiError> {
        let response: AddressResponse = self
            .get_json(self.wallet_url(&format!("address/new/{}", jar)))
            .await?;
        Ok(response.address)
    }

    async fn new_timelocked_address(
        &self,
        jar: u32,
        lockdate: &Lockdate,
    ) -> Result<String, ApiError> {
        // jmwalletd only derives time-locked addresses in the fidelity
        // bond account; the path encodes the lockdate alone
        if jar != FIDELITY_BOND_JAR {
            return Err(ApiError::http(
                400,
                format!(
                    "time-locked addresses can only be derived in jar {}",
                    FIDELITY_BOND_JAR
                ),
            ));
        }
        let response: AddressResponse = self
            .get_json(self.wallet_url(&format!("address/timelock/new/{}", lockdate)))
            .await?;
        Ok(response.address)
    }

    async fn direct_send(
        &self,
        jar: u32,
        destination: &str,
        amount_sats: u64,
    ) -> Result<TxInfo, ApiError> {
        let request = DirectSendRequest {
            mixdepth: jar,
            destination: destination.to_string(),
            amount_sats,
        };
        let response: DirectSendResponse = self
            .post_json(self.wallet_url("taker/direct-send"), &request)
            .await?;
        Ok(response.txinfo)
    }

    async fn reload_utxos(&self) -> Result<Vec<Utxo>, ApiError> {
        let response: UtxosResponse = self.get_json(self.wallet_url("utxos")).await?;
        Ok(response.utxos)
    }

    async fn reload_wallet_info(&self) -> Result<WalletInfo, ApiError> {
        let utxos = self.reload_utxos().await?;
        let display: WalletDisplayResponse = self.get_json(self.wallet_url("display")).await?;
        Ok(WalletInfo::new(
            utxos,
            Some(&display),
            Utc::now().timestamp_millis(),
        ))
    }
}
