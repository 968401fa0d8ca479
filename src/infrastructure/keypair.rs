use crate::domain::address::Pubkey;
use crate::domain::ports::{SigningAgent, SigningOutcome};
use crate::domain::transaction::{SIGNATURE_LENGTH, SignedTransaction, TransferSummary, UnsignedTransaction};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use ed25519_dalek::{SECRET_KEY_LENGTH, Signer, SigningKey};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Asks the payer to approve a transfer. Runs on a blocking thread, so it may
/// prompt on a terminal.
pub type ApprovalHook = Arc<dyn Fn(&TransferSummary) -> bool + Send + Sync>;

/// Signing agent backed by a local Ed25519 keypair.
pub struct KeypairSigner {
    key: SigningKey,
    approve: ApprovalHook,
}

impl KeypairSigner {
    /// A signer that approves every transfer it is shown.
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            approve: Arc::new(|_| true),
        }
    }

    pub fn with_approval(mut self, approve: ApprovalHook) -> Self {
        self.approve = approve;
        self
    }

    /// Accepts a 64-byte keypair (secret followed by public half) or a bare
    /// 32-byte secret.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = match bytes.len() {
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(bytes);
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|e| PaymentError::Config(format!("inconsistent keypair: {}", e)))?
            }
            SECRET_KEY_LENGTH => {
                let mut secret = [0u8; SECRET_KEY_LENGTH];
                secret.copy_from_slice(bytes);
                SigningKey::from_bytes(&secret)
            }
            n => {
                return Err(PaymentError::Config(format!(
                    "keypair must be 32 or 64 bytes, got {}",
                    n
                )));
            }
        };
        Ok(Self::new(key))
    }

    /// Loads a keypair file in the JSON byte-array format used by ledger CLIs.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PaymentError::Config(format!("cannot read keypair {}: {}", path.display(), e))
        })?;
        let bytes: Vec<u8> = serde_json::from_str(&content).map_err(|e| {
            PaymentError::Config(format!("keypair {} is not a JSON byte array: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }
}

#[async_trait]
impl SigningAgent for KeypairSigner {
    fn public_key(&self) -> Pubkey {
        Pubkey::new_from_array(self.key.verifying_key().to_bytes())
    }

    async fn sign(&self, transaction: &UnsignedTransaction) -> SigningOutcome {
        let me = self.public_key();
        if transaction.message.signer_keys() != [me] {
            return SigningOutcome::Rejected(format!(
                "transaction must be signed by {} alone",
                me
            ));
        }

        let approve = Arc::clone(&self.approve);
        let summary = transaction.summary.clone();
        match tokio::task::spawn_blocking(move || approve(&summary)).await {
            Ok(true) => {}
            Ok(false) => return SigningOutcome::Rejected("payer declined the transfer".to_string()),
            Err(e) => return SigningOutcome::Rejected(format!("approval prompt failed: {}", e)),
        }

        let signature: [u8; SIGNATURE_LENGTH] =
            self.key.sign(&transaction.message_bytes()).to_bytes();
        info!(payer = %me, "transaction signed");
        match SignedTransaction::new(transaction.message.clone(), vec![signature]) {
            Ok(signed) => SigningOutcome::Signed(signed),
            Err(e) => SigningOutcome::Rejected(e.to_string()),
        }
    }
}
