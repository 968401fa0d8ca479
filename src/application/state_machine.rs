use crate::domain::attempt::{AttemptFailure, AttemptReceipt, AttemptState, TransactionAttempt};
use crate::domain::builder::TransactionBuilder;
use crate::domain::payment_link::{BuyerSubmission, PaymentRequest};
use crate::domain::ports::{
    Confirmation, LedgerClientRef, ReceiptStore, ReceiptStoreRef, SigningAgent, SigningOutcome,
    VerificationClientRef,
};
use crate::domain::settlement::{SettlementRecord, SettlementStatus, VerificationRequest};
use crate::domain::transaction::{BlockReference, Commitment, SignedTransaction};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct CheckoutSettings {
    /// Commitment level awaited before reporting to the backend.
    pub commitment: Commitment,
    /// Upper bound on the backend verification call.
    pub verification_timeout: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            verification_timeout: Duration::from_secs(15),
        }
    }
}

/// How a call to [`PaymentStateMachine::pay`] ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Another attempt for the same link was still in flight; nothing happened.
    Ignored,
    Succeeded(SettlementRecord),
    Failed(PaymentError),
}

type Registry = Arc<Mutex<HashMap<String, AttemptState>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, AttemptState>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ownership of the single live attempt for one link.
///
/// Dropping the slot releases the link, so abandoning an attempt before
/// submission simply discards it.
struct InFlightSlot {
    registry: Registry,
    attempt: TransactionAttempt,
}

impl InFlightSlot {
    fn claim(registry: &Registry, link_id: &str) -> Option<Self> {
        let mut live = lock(registry);
        if live.contains_key(link_id) {
            return None;
        }
        live.insert(link_id.to_string(), AttemptState::Idle);
        Some(Self {
            registry: Arc::clone(registry),
            attempt: TransactionAttempt::new(link_id),
        })
    }

    fn advance(&mut self, next: AttemptState) {
        let from = self.attempt.state().label();
        let to = next.label();
        if !self.attempt.advance(next) {
            error!(link_id = %self.attempt.link_id, from, to, "illegal attempt transition");
            return;
        }
        info!(
            link_id = %self.attempt.link_id,
            signature = self.attempt.signature.as_deref().unwrap_or("-"),
            from,
            to,
            "attempt transition"
        );
        lock(&self.registry).insert(self.attempt.link_id.clone(), self.attempt.state().clone());
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.attempt.link_id);
    }
}

/// Drives one payment attempt per link from payer action to a terminal state.
pub struct PaymentStateMachine {
    builder: TransactionBuilder,
    ledger: LedgerClientRef,
    backend: VerificationClientRef,
    receipts: ReceiptStoreRef,
    settings: CheckoutSettings,
    in_flight: Registry,
}

impl PaymentStateMachine {
    pub fn new(
        builder: TransactionBuilder,
        ledger: LedgerClientRef,
        backend: VerificationClientRef,
        receipts: ReceiptStoreRef,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            builder,
            ledger,
            backend,
            receipts,
            settings,
            in_flight: Arc::default(),
        }
    }

    /// State of the live attempt for `link_id`, if one is in flight.
    pub fn state(&self, link_id: &str) -> Option<AttemptState> {
        lock(&self.in_flight).get(link_id).cloned()
    }

    /// Runs one attempt to completion.
    ///
    /// A second call for a link whose attempt is still running returns
    /// [`AttemptOutcome::Ignored`]. Nothing is retried. Once the wallet has
    /// signed, submission, confirmation and verification run on a separate
    /// task, so dropping the returned future no longer cancels them.
    pub async fn pay(
        &self,
        request: &PaymentRequest,
        submission: &BuyerSubmission,
        agent: &dyn SigningAgent,
    ) -> AttemptOutcome {
        let Some(mut slot) = InFlightSlot::claim(&self.in_flight, &request.link_id) else {
            info!(link_id = %request.link_id, "attempt already in flight, ignoring payer action");
            return AttemptOutcome::Ignored;
        };

        let (signed, reference) = match self.prepare(&mut slot, request, submission, agent).await
        {
            Ok(prepared) => prepared,
            Err(err) => return conclude(self.receipts.as_ref(), slot, Err(err)).await,
        };

        let signature = signed.signature();
        slot.attempt.signature = Some(signature.clone());

        let settlement = Settlement {
            ledger: Arc::clone(&self.ledger),
            backend: Arc::clone(&self.backend),
            receipts: Arc::clone(&self.receipts),
            settings: self.settings,
        };
        let verification = VerificationRequest::new(&request.link_id, &signature, submission);
        let handle = tokio::spawn(settlement.run(slot, signed, reference, verification));

        match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => AttemptOutcome::Failed(PaymentError::Submission {
                message: format!("settlement task ended abnormally: {}", join_error),
                signature: Some(signature),
            }),
        }
    }

    /// `idle → validating → building → awaiting-signature`, ending with a
    /// signature the wallet produced over exactly the built message and the
    /// block reference that anchors it.
    async fn prepare(
        &self,
        slot: &mut InFlightSlot,
        request: &PaymentRequest,
        submission: &BuyerSubmission,
        agent: &dyn SigningAgent,
    ) -> Result<(SignedTransaction, BlockReference)> {
        slot.advance(AttemptState::Validating);
        request.ensure_payable()?;
        submission.ensure_complete(request)?;

        slot.advance(AttemptState::Building);
        let payer = agent.public_key();
        let plan = self.builder.plan(request, &payer)?;
        let reference = self.ledger.latest_block_reference().await.map_err(|err| {
            PaymentError::Transport(format!("could not fetch a recent block reference: {}", err))
        })?;
        let unsigned = plan.into_transaction(reference)?;
        slot.attempt.attach(unsigned.clone());

        slot.advance(AttemptState::AwaitingSignature);
        match agent.sign(&unsigned).await {
            SigningOutcome::Rejected(reason) => Err(PaymentError::SigningRejected(reason)),
            SigningOutcome::Signed(signed) => {
                if signed.message != unsigned.message {
                    return Err(PaymentError::SigningRejected(
                        "wallet returned a different transaction than the one built".to_string(),
                    ));
                }
                signed.verify()?;
                Ok((signed, reference))
            }
        }
    }
}

/// The post-signature half of an attempt, owned by its own task.
struct Settlement {
    ledger: LedgerClientRef,
    backend: VerificationClientRef,
    receipts: ReceiptStoreRef,
    settings: CheckoutSettings,
}

impl Settlement {
    async fn run(
        self,
        mut slot: InFlightSlot,
        signed: SignedTransaction,
        reference: BlockReference,
        verification: VerificationRequest,
    ) -> AttemptOutcome {
        let result = self
            .settle(&mut slot, &signed, &reference, &verification)
            .await;
        conclude(self.receipts.as_ref(), slot, result).await
    }

    async fn settle(
        &self,
        slot: &mut InFlightSlot,
        signed: &SignedTransaction,
        reference: &BlockReference,
        verification: &VerificationRequest,
    ) -> Result<SettlementRecord> {
        let signature = verification.transaction_signature.clone();

        match self.ledger.submit(signed).await {
            Ok(returned) if returned != signature => {
                warn!(expected = %signature, %returned, "ledger echoed an unexpected signature");
            }
            Ok(_) => {}
            Err(err) => {
                return Err(PaymentError::Submission {
                    message: err.to_string(),
                    signature: Some(signature),
                });
            }
        }
        slot.advance(AttemptState::Submitted {
            signature: signature.clone(),
        });

        slot.advance(AttemptState::Confirming {
            signature: signature.clone(),
        });
        match self
            .ledger
            .confirm(&signature, reference, self.settings.commitment)
            .await
        {
            Ok(Confirmation::Confirmed) => {}
            Ok(Confirmation::Failed(reason)) => {
                return Err(PaymentError::ConfirmationFailed { signature, reason });
            }
            Err(err @ PaymentError::ConfirmationTimeout { .. }) => return Err(err),
            Err(err) => {
                warn!(%signature, error = %err, "confirmation polling broke off, final state unknown");
                return Err(PaymentError::ConfirmationTimeout {
                    signature,
                    expiry_height: reference.last_valid_block_height,
                });
            }
        }

        slot.advance(AttemptState::Verifying {
            signature: signature.clone(),
        });
        let record = match tokio::time::timeout(
            self.settings.verification_timeout,
            self.backend.verify(verification),
        )
        .await
        {
            Err(_) => {
                return Err(PaymentError::Verification {
                    signature,
                    message: format!(
                        "backend did not answer within {} ms",
                        self.settings.verification_timeout.as_millis()
                    ),
                });
            }
            Ok(Err(err)) => {
                return Err(PaymentError::Verification {
                    signature,
                    message: err.to_string(),
                });
            }
            Ok(Ok(record)) => record,
        };

        if record.status != SettlementStatus::Confirmed {
            return Err(PaymentError::Verification {
                signature,
                message: format!("backend reported settlement status {:?}", record.status),
            });
        }
        Ok(record)
    }
}

/// Moves the attempt to its terminal state and journals a receipt.
async fn conclude(
    receipts: &dyn ReceiptStore,
    mut slot: InFlightSlot,
    result: Result<SettlementRecord>,
) -> AttemptOutcome {
    let outcome = match result {
        Ok(record) => {
            slot.advance(AttemptState::Succeeded(Box::new(record.clone())));
            AttemptOutcome::Succeeded(record)
        }
        Err(err) => {
            warn!(
                link_id = %slot.attempt.link_id,
                kind = err.kind(),
                signature = err.retained_signature().unwrap_or("-"),
                error = %err,
                "attempt failed"
            );
            slot.advance(AttemptState::Failed(AttemptFailure::from(&err)));
            AttemptOutcome::Failed(err)
        }
    };

    if let Err(err) = receipts
        .record(AttemptReceipt::from_attempt(&slot.attempt))
        .await
    {
        error!(link_id = %slot.attempt.link_id, error = %err, "could not journal attempt receipt");
    }
    outcome
}
