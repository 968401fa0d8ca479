use crate::domain::payment_link::BuyerSubmission;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
    Refunded,
}

/// The backend's authoritative record of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub id: String,
    #[serde(default)]
    pub payment_link_id: Option<String>,
    /// Ledger signature of the settling transaction.
    #[serde(default)]
    pub blockchain_transaction_id: Option<String>,
    pub amount_paid: Decimal,
    pub currency: String,
    pub status: SettlementStatus,
    #[serde(default)]
    pub payer_address: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /payments/verify`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub link_id: String,
    pub transaction_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_shipping_address: Option<String>,
}

impl VerificationRequest {
    pub fn new(link_id: &str, signature: &str, submission: &BuyerSubmission) -> Self {
        use crate::domain::payment_link::RequiredField;

        let value = |field| submission.get(field).map(str::to_string);
        Self {
            link_id: link_id.to_string(),
            transaction_signature: signature.to_string(),
            customer_name: value(RequiredField::Name),
            customer_email: value(RequiredField::Email),
            customer_phone: value(RequiredField::Phone),
            customer_shipping_address: value(RequiredField::ShippingAddress),
        }
    }
}
