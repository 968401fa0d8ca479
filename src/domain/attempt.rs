use crate::domain::settlement::SettlementRecord;
use crate::domain::transaction::{BlockReference, UnsignedTransaction};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal failure as recorded on an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: &'static str,
    pub message: String,
    pub signature: Option<String>,
}

impl From<&PaymentError> for AttemptFailure {
    fn from(err: &PaymentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            signature: err.retained_signature().map(str::to_string),
        }
    }
}

/// Protocol state of one payment attempt.
///
/// `idle → validating → building → awaiting-signature → submitted →
/// confirming → verifying → {succeeded | failed}`; any non-terminal state may
/// also fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Idle,
    Validating,
    Building,
    AwaitingSignature,
    Submitted { signature: String },
    Confirming { signature: String },
    Verifying { signature: String },
    Succeeded(Box<SettlementRecord>),
    Failed(AttemptFailure),
}

impl AttemptState {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptState::Idle => "idle",
            AttemptState::Validating => "validating",
            AttemptState::Building => "building",
            AttemptState::AwaitingSignature => "awaiting-signature",
            AttemptState::Submitted { .. } => "submitted",
            AttemptState::Confirming { .. } => "confirming",
            AttemptState::Verifying { .. } => "verifying",
            AttemptState::Succeeded(_) => "succeeded",
            AttemptState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded(_) | AttemptState::Failed(_))
    }

    pub fn can_advance_to(&self, next: &AttemptState) -> bool {
        use AttemptState::*;
        match (self, next) {
            (_, Failed(_)) => !self.is_terminal() && !matches!(self, Idle),
            (Idle, Validating)
            | (Validating, Building)
            | (Building, AwaitingSignature)
            | (AwaitingSignature, Submitted { .. })
            | (Submitted { .. }, Confirming { .. })
            | (Confirming { .. }, Verifying { .. })
            | (Verifying { .. }, Succeeded(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The live state of one payer-initiated attempt.
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub link_id: String,
    pub amount_units: Option<u64>,
    pub transaction: Option<UnsignedTransaction>,
    pub block_reference: Option<BlockReference>,
    pub signature: Option<String>,
    state: AttemptState,
}

impl TransactionAttempt {
    pub fn new(link_id: &str) -> Self {
        Self {
            link_id: link_id.to_string(),
            amount_units: None,
            transaction: None,
            block_reference: None,
            signature: None,
            state: AttemptState::Idle,
        }
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Moves to `next`, returning `false` (and staying put) on an illegal transition.
    pub fn advance(&mut self, next: AttemptState) -> bool {
        if !self.state.can_advance_to(&next) {
            return false;
        }
        self.state = next;
        true
    }

    pub fn attach(&mut self, transaction: UnsignedTransaction) {
        self.amount_units = Some(transaction.summary.amount_units);
        self.block_reference = Some(transaction.block_reference);
        self.transaction = Some(transaction);
    }
}

/// Durable record of a finished attempt, kept for support follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReceipt {
    pub link_id: String,
    pub outcome: String,
    pub error_kind: Option<String>,
    pub signature: Option<String>,
    pub amount_units: Option<u64>,
    pub recorded_at: DateTime<Utc>,
    pub message: String,
}

impl AttemptReceipt {
    pub fn from_attempt(attempt: &TransactionAttempt) -> Self {
        let (error_kind, signature, message) = match attempt.state() {
            AttemptState::Failed(failure) => (
                Some(failure.kind.to_string()),
                failure.signature.clone().or_else(|| attempt.signature.clone()),
                failure.message.clone(),
            ),
            AttemptState::Succeeded(record) => (
                None,
                attempt.signature.clone(),
                format!("settlement {} confirmed", record.id),
            ),
            other => (None, attempt.signature.clone(), format!("abandoned in {}", other)),
        };
        Self {
            link_id: attempt.link_id.clone(),
            outcome: attempt.state().label().to_string(),
            error_kind,
            signature,
            amount_units: attempt.amount_units,
            recorded_at: Utc::now(),
            message,
        }
    }
}
