//! Ledger client for a JSON transaction gateway.
//!
//! The gateway signs and relays contract calls for the server account and
//! exposes the contract's read methods. Errors come back as
//! `{"error": {"code": "...", "message": "..."}}`.

use super::{Ledger, LedgerCall, LedgerError, LedgerErrorKind, Receipt, TeamCounts, TxHandle};
use crate::board::{Team, Word};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: u64,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    from: &'a str,
    nonce: u64,
    call: &'a LedgerCall,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: TxStatus,
    #[serde(default)]
    error: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct BoardResponse {
    chunks: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct TeamResponse {
    team: u8,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: GatewayError,
}

#[derive(Debug, Clone, Deserialize)]
struct GatewayError {
    code: String,
    #[serde(default)]
    message: String,
}

impl GatewayError {
    #[track_caller]
    fn into_ledger_error(self) -> LedgerError {
        let kind = match self.code.as_str() {
            "nonce_too_low" | "nonce_too_high" | "replacement_underpriced" => {
                LedgerErrorKind::StaleNonce
            }
            "game_concluded" => LedgerErrorKind::GameConcluded,
            "unavailable" => LedgerErrorKind::Transport,
            _ => LedgerErrorKind::Reverted,
        };
        LedgerError::new(kind, format!("{}: {}", self.code, self.message))
    }
}

/// Ledger reached through the HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    base_url: String,
    account: String,
    client: reqwest::Client,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl HttpLedger {
    /// Creates a client for `account` against the gateway at `base_url`.
    #[instrument(skip(base_url, account), fields(base_url = %base_url, account = %account))]
    pub fn new(
        base_url: String,
        account: String,
        poll_interval: Duration,
        confirm_timeout: Duration,
    ) -> Self {
        info!("Creating HTTP ledger client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            account,
            client: reqwest::Client::new(),
            poll_interval,
            confirm_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        read_json(response).await
    }
}

/// Decodes a success body or maps a gateway error body.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => Err(parsed.error.into_ledger_error()),
        Err(_) if status.is_server_error() => Err(LedgerError::new(
            LedgerErrorKind::Transport,
            format!("Gateway returned {}: {}", status, body),
        )),
        Err(_) => Err(LedgerError::new(
            LedgerErrorKind::Reverted,
            format!("Gateway returned {}: {}", status, body),
        )),
    }
}

#[async_trait::async_trait]
impl Ledger for HttpLedger {
    #[instrument(skip(self))]
    async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        let response: NonceResponse = self
            .get(&format!("accounts/{}/nonce?block=pending", self.account))
            .await?;
        debug!(nonce = response.nonce, "Fetched pending nonce");
        Ok(response.nonce)
    }

    #[instrument(skip(self, call), fields(method = call.method()))]
    async fn send(&self, call: &LedgerCall, nonce: u64) -> Result<TxHandle, LedgerError> {
        let request = SubmitRequest {
            from: &self.account,
            nonce,
            call,
        };
        let response = self
            .client
            .post(self.url("transactions"))
            .json(&request)
            .send()
            .await?;
        let submitted: SubmitResponse = read_json(response).await?;
        info!(hash = %submitted.hash, nonce, "Transaction sent");
        Ok(TxHandle::new(submitted.hash, nonce))
    }

    #[instrument(skip(self), fields(hash = %tx.hash))]
    async fn confirm(&self, tx: &TxHandle) -> Result<Receipt, LedgerError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let status: StatusResponse = self.get(&format!("transactions/{}", tx.hash)).await?;
            match status.status {
                TxStatus::Confirmed => {
                    debug!("Transaction confirmed");
                    return Ok(Receipt::new(tx.hash.clone(), tx.nonce));
                }
                TxStatus::Failed => {
                    let err = status.error.map(GatewayError::into_ledger_error).unwrap_or_else(|| {
                        LedgerError::new(LedgerErrorKind::Reverted, "Transaction failed")
                    });
                    warn!(error = %err, "Transaction failed");
                    return Err(err);
                }
                TxStatus::Pending => {
                    if Instant::now() >= deadline {
                        return Err(LedgerError::new(
                            LedgerErrorKind::Timeout,
                            format!("Transaction {} not confirmed in time", tx.hash),
                        ));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn board(&self) -> Result<Vec<Word>, LedgerError> {
        let response: BoardResponse = self.get("board").await?;
        Ok(response.chunks)
    }

    #[instrument(skip(self))]
    async fn team_counts(&self) -> Result<TeamCounts, LedgerError> {
        self.get("teams/counts").await
    }

    #[instrument(skip(self))]
    async fn team_of(&self, account: &str) -> Result<Team, LedgerError> {
        let response: TeamResponse = self.get(&format!("teams/{}", account)).await?;
        Ok(Team::from_id(response.team))
    }
}
