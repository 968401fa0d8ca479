use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Every way a checkout attempt (or the plumbing around it) can fail.
///
/// Variants raised after a transaction reached the ledger carry its signature
/// so the payer or support staff can look it up later.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Signing rejected: {0}")]
    SigningRejected(String),
    #[error("Submission outcome unknown, funds may have moved: {message}")]
    Submission {
        message: String,
        signature: Option<String>,
    },
    #[error("Transaction {signature} was rejected by the ledger: {reason}")]
    ConfirmationFailed { signature: String, reason: String },
    #[error("Transaction {signature} was not confirmed before block height {expiry_height}")]
    ConfirmationTimeout {
        signature: String,
        expiry_height: u64,
    },
    #[error(
        "Transaction {signature} was sent, but the merchant could not verify it ({message}). Please contact support."
    )]
    Verification { signature: String, message: String },
    #[error("Payment link not found: {0}")]
    LinkNotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaymentError {
    /// Signature of a transaction that may exist on the ledger, if any.
    pub fn retained_signature(&self) -> Option<&str> {
        match self {
            PaymentError::Submission { signature, .. } => signature.as_deref(),
            PaymentError::ConfirmationFailed { signature, .. }
            | PaymentError::ConfirmationTimeout { signature, .. }
            | PaymentError::Verification { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Stable label used in receipts and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "validation",
            PaymentError::UnsupportedAsset(_) => "unsupported_asset",
            PaymentError::InvalidAddress(_) => "invalid_address",
            PaymentError::InvalidAmount(_) => "invalid_amount",
            PaymentError::SigningRejected(_) => "signing_rejected",
            PaymentError::Submission { .. } => "submission",
            PaymentError::ConfirmationFailed { .. } => "confirmation_failed",
            PaymentError::ConfirmationTimeout { .. } => "confirmation_timeout",
            PaymentError::Verification { .. } => "verification",
            PaymentError::LinkNotFound(_) => "link_not_found",
            PaymentError::Transport(_) => "transport",
            PaymentError::Config(_) => "config",
            PaymentError::Storage(_) => "storage",
            PaymentError::Io(_) => "io",
            PaymentError::Csv(_) => "csv",
            PaymentError::Serialization(_) => "serialization",
        }
    }

    /// Whether the payer can fix the problem and start a fresh attempt.
    pub fn is_payer_recoverable(&self) -> bool {
        matches!(
            self,
            PaymentError::Validation(_) | PaymentError::SigningRejected(_)
        )
    }
}
