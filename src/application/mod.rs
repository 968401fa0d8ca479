//! Application layer: the checkout state machine.
//!
//! [`state_machine::PaymentStateMachine`] owns the single live attempt per
//! payment link and drives it through validation, building, signing,
//! submission, confirmation and backend verification using the ports in
//! [`crate::domain::ports`].

pub mod state_machine;
