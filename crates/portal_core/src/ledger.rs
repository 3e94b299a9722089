//! Remote-record operations against the ledger program.
//!
//! The ledger client is stateless: it depends only on the constant network
//! endpoint and program identifier, so callers may hold one for the process
//! lifetime or build one per operation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::{Entry, ProgramId, WalletAddress},
    protocol::{LedgerInstruction, RecordResponse, TransactionDescriptor},
};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{SignerError, SignerExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    Initialized,
    /// The record already exists. Not safely retryable blind, so callers
    /// must treat this as record-already-usable rather than a hard error.
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    RecordUninitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Record(Vec<Entry>),
    /// Expected before initialization; not an error condition.
    NotFound,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid ledger url: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("ledger rpc failed: {0}")]
    Rpc(String),
}

/// Three round trips to the remote program. `link` must be non-empty for
/// `append_entry`; the program does not validate URL shape and neither do we.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn initialize_record(
        &self,
        signer: &WalletAddress,
    ) -> Result<InitializeOutcome, LedgerError>;
    async fn append_entry(
        &self,
        link: &str,
        signer: &WalletAddress,
    ) -> Result<AppendOutcome, LedgerError>;
    async fn fetch_record(&self) -> Result<FetchOutcome, LedgerError>;
}

pub struct MissingLedgerClient;

#[async_trait]
impl LedgerClient for MissingLedgerClient {
    async fn initialize_record(
        &self,
        _signer: &WalletAddress,
    ) -> Result<InitializeOutcome, LedgerError> {
        Err(LedgerError::Rpc("ledger endpoint is unavailable".into()))
    }

    async fn append_entry(
        &self,
        _link: &str,
        _signer: &WalletAddress,
    ) -> Result<AppendOutcome, LedgerError> {
        Err(LedgerError::Rpc("ledger endpoint is unavailable".into()))
    }

    async fn fetch_record(&self) -> Result<FetchOutcome, LedgerError> {
        Err(LedgerError::Rpc("ledger endpoint is unavailable".into()))
    }
}

/// HTTP-backed ledger client. Mutating operations are signed and submitted
/// by the signer extension; the program's structured failures come back as
/// transaction error text and are classified here.
pub struct HttpLedgerClient {
    http: Client,
    endpoint: Url,
    program_id: ProgramId,
    signer: Arc<dyn SignerExtension>,
}

impl HttpLedgerClient {
    pub fn new(endpoint: Url, program_id: ProgramId, signer: Arc<dyn SignerExtension>) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            program_id,
            signer,
        }
    }

    fn record_url(&self) -> Result<Url, LedgerError> {
        Ok(self
            .endpoint
            .join(&format!("programs/{}/record", self.program_id))?)
    }

    async fn sign_and_send(
        &self,
        signer: &WalletAddress,
        instruction: LedgerInstruction,
    ) -> Result<(), SignerError> {
        let descriptor =
            TransactionDescriptor::new(self.program_id.clone(), signer.clone(), instruction);
        self.signer.sign_and_send(descriptor).await.map(|_| ())
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn initialize_record(
        &self,
        signer: &WalletAddress,
    ) -> Result<InitializeOutcome, LedgerError> {
        match self
            .sign_and_send(signer, LedgerInstruction::InitializeRecord)
            .await
        {
            Ok(()) => Ok(InitializeOutcome::Initialized),
            Err(SignerError::Transaction(message)) if is_already_initialized_error(&message) => {
                info!("ledger: initialize reported an existing record: {message}");
                Ok(InitializeOutcome::AlreadyInitialized)
            }
            Err(err) => Err(LedgerError::Rpc(err.to_string())),
        }
    }

    async fn append_entry(
        &self,
        link: &str,
        signer: &WalletAddress,
    ) -> Result<AppendOutcome, LedgerError> {
        let instruction = LedgerInstruction::AppendEntry {
            link: link.to_string(),
        };
        match self.sign_and_send(signer, instruction).await {
            Ok(()) => Ok(AppendOutcome::Appended),
            Err(SignerError::Transaction(message)) if is_record_uninitialized_error(&message) => {
                info!("ledger: append hit an uninitialized record: {message}");
                Ok(AppendOutcome::RecordUninitialized)
            }
            Err(err) => Err(LedgerError::Rpc(err.to_string())),
        }
    }

    async fn fetch_record(&self) -> Result<FetchOutcome, LedgerError> {
        let response = self
            .http
            .get(self.record_url()?)
            .send()
            .await
            .map_err(|err| LedgerError::Rpc(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }

        let record: RecordResponse = response
            .error_for_status()
            .map_err(|err| LedgerError::Rpc(err.to_string()))?
            .json()
            .await
            .map_err(|err| LedgerError::Rpc(err.to_string()))?;

        Ok(FetchOutcome::Record(record.entries))
    }
}

fn is_already_initialized_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already initialized")
        || message.contains("already in use")
        || message.contains("already exists")
}

fn is_record_uninitialized_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("uninitialized")
        || message.contains("does not exist")
        || message.contains("not found")
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
