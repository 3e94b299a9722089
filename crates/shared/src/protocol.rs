use serde::{Deserialize, Serialize};

use crate::domain::{Entry, ProgramId, TransactionSignature, WalletAddress};

/// Instruction carried by a transaction against the record program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LedgerInstruction {
    InitializeRecord,
    AppendEntry { link: String },
}

/// What the core asks the signer extension to sign and send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub program_id: ProgramId,
    pub signer: WalletAddress,
    pub instruction: LedgerInstruction,
}

impl TransactionDescriptor {
    pub fn new(
        program_id: ProgramId,
        signer: WalletAddress,
        instruction: LedgerInstruction,
    ) -> Self {
        Self {
            program_id,
            signer,
            instruction,
        }
    }
}

/// Signed envelope a signer submits to the ledger endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub descriptor: TransactionDescriptor,
    pub payload_b64: String,
    pub signature: TransactionSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
    pub signature: TransactionSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub program_id: ProgramId,
    pub entries: Vec<Entry>,
}
