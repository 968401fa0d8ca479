use super::address::Pubkey;
use super::attempt::AttemptReceipt;
use super::payment_link::PaymentRequest;
use super::settlement::{SettlementRecord, VerificationRequest};
use super::transaction::{BlockReference, Commitment, SignedTransaction, UnsignedTransaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Final answer from confirmation polling.
///
/// A timeout is not an outcome: it surfaces as
/// [`PaymentError::ConfirmationTimeout`](crate::error::PaymentError::ConfirmationTimeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Failed(String),
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn latest_block_reference(&self) -> Result<BlockReference>;
    /// Errors here mean the transaction may or may not have reached the network.
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String>;
    async fn confirm(
        &self,
        signature: &str,
        reference: &BlockReference,
        commitment: Commitment,
    ) -> Result<Confirmation>;
}

/// Result of handing a transaction to the payer's wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    Signed(SignedTransaction),
    Rejected(String),
}

/// The payer's wallet, controlled by the host rather than this crate.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    fn public_key(&self) -> Pubkey;
    async fn sign(&self, transaction: &UnsignedTransaction) -> SigningOutcome;
}

/// The merchant backend acting as ledger-of-record.
#[async_trait]
pub trait VerificationClient: Send + Sync {
    async fn fetch_link(&self, link_id: &str) -> Result<PaymentRequest>;
    async fn verify(&self, request: &VerificationRequest) -> Result<SettlementRecord>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn record(&self, receipt: AttemptReceipt) -> Result<()>;
    async fn get(&self, link_id: &str) -> Result<Vec<AttemptReceipt>>;
    async fn all_receipts(&self) -> Result<Vec<AttemptReceipt>>;
}

pub type LedgerClientRef = Arc<dyn LedgerClient>;
pub type VerificationClientRef = Arc<dyn VerificationClient>;
pub type ReceiptStoreRef = Arc<dyn ReceiptStore>;
