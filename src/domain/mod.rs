//! Payment data model, pure protocol pieces and the ports to external systems.

pub mod address;
pub mod asset;
pub mod attempt;
pub mod builder;
pub mod payment_link;
pub mod ports;
pub mod settlement;
pub mod transaction;
