//! Development signer: authenticates as a fixed address and "signs" by
//! wrapping the descriptor in a dev envelope. Stands in for the browser
//! extension when driving the portal from a terminal.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use portal_core::{SignerError, SignerExtension};
use reqwest::Client;
use shared::{
    domain::{TransactionSignature, WalletAddress},
    error::{ApiError, ErrorCode},
    protocol::{SignedTransaction, SubmitTransactionResponse, TransactionDescriptor},
};
use url::Url;

pub struct DevSigner {
    http: Client,
    endpoint: Url,
    address: WalletAddress,
}

impl DevSigner {
    pub fn new(endpoint: Url, address: WalletAddress) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            address,
        }
    }

    fn transactions_url(&self) -> Result<Url, SignerError> {
        self.endpoint
            .join("transactions")
            .map_err(|err| SignerError::Transport(err.to_string()))
    }
}

#[async_trait]
impl SignerExtension for DevSigner {
    fn is_present(&self) -> bool {
        true
    }

    fn is_expected_kind(&self) -> bool {
        true
    }

    async fn authenticate_silently(&self) -> Result<WalletAddress, SignerError> {
        Ok(self.address.clone())
    }

    async fn authenticate_interactive(&self) -> Result<WalletAddress, SignerError> {
        Ok(self.address.clone())
    }

    async fn sign_and_send(
        &self,
        descriptor: TransactionDescriptor,
    ) -> Result<TransactionSignature, SignerError> {
        let payload =
            serde_json::to_vec(&descriptor).map_err(|err| SignerError::Transport(err.to_string()))?;
        let signed = SignedTransaction {
            descriptor,
            payload_b64: STANDARD.encode(payload),
            signature: TransactionSignature::new(format!("dev-{}", self.address)),
        };

        let response = self
            .http
            .post(self.transactions_url()?)
            .json(&signed)
            .send()
            .await
            .map_err(|err| SignerError::Transport(err.to_string()))?;

        if response.status().is_success() {
            let submitted: SubmitTransactionResponse = response
                .json()
                .await
                .map_err(|err| SignerError::Transport(err.to_string()))?;
            return Ok(submitted.signature);
        }

        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(api_error) => Err(SignerError::Transaction(transaction_message(api_error))),
            Err(_) => Err(SignerError::Transport(format!(
                "transaction endpoint returned {status}"
            ))),
        }
    }
}

// The core classifies transaction failures by message text, so the dev
// signer normalizes structured codes into the phrases the ledger programs
// actually emit.
fn transaction_message(api_error: ApiError) -> String {
    match api_error.code {
        ErrorCode::AlreadyExists => {
            format!("record account already initialized: {}", api_error.message)
        }
        ErrorCode::NotFound => {
            format!("record account does not exist: {}", api_error.message)
        }
        _ => api_error.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_code_becomes_classifiable_text() {
        let message = transaction_message(ApiError::new(ErrorCode::AlreadyExists, "record"));
        assert!(message.contains("already initialized"));
    }

    #[test]
    fn not_found_code_becomes_classifiable_text() {
        let message = transaction_message(ApiError::new(ErrorCode::NotFound, "record"));
        assert!(message.contains("does not exist"));
    }

    #[test]
    fn other_codes_pass_the_message_through() {
        let message = transaction_message(ApiError::new(ErrorCode::Internal, "node overloaded"));
        assert_eq!(message, "node overloaded");
    }
}
