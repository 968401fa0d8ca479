//! Client-side checkout for payment links settled on a public ledger.
//!
//! A payer opens a merchant's payment link, supplies the requested contact
//! details, signs one transfer with their wallet, and the merchant backend is
//! asked to verify the resulting transaction. See
//! [`application::state_machine::PaymentStateMachine`] for the entry point.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
