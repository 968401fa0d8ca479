use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Paid,
    Expired,
    Inactive,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Active => "active",
            LinkStatus::Paid => "paid",
            LinkStatus::Expired => "expired",
            LinkStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Buyer information a merchant may require before payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Name,
    Email,
    Phone,
    ShippingAddress,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::Name => "name",
            RequiredField::Email => "email",
            RequiredField::Phone => "phone",
            RequiredField::ShippingAddress => "shipping_address",
        }
    }

    /// Key used for this field in the verification payload.
    pub fn verification_key(&self) -> &'static str {
        match self {
            RequiredField::Name => "customerName",
            RequiredField::Email => "customerEmail",
            RequiredField::Phone => "customerPhone",
            RequiredField::ShippingAddress => "customerShippingAddress",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequiredField {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(RequiredField::Name),
            "email" => Ok(RequiredField::Email),
            "phone" => Ok(RequiredField::Phone),
            "shipping_address" | "shipping-address" => Ok(RequiredField::ShippingAddress),
            other => Err(PaymentError::Validation(format!(
                "unknown customer field {:?}",
                other
            ))),
        }
    }
}

/// Merchant fields embedded in a link response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// A merchant's published payment request, as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub link_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_description: Option<String>,
    /// Requested amount in the settlement asset.
    pub amount: Decimal,
    /// Settlement asset code, resolved through the asset registry.
    pub currency: String,
    pub amount_fiat: Decimal,
    pub fiat_currency_code: String,
    #[serde(default)]
    pub required_customer_info: Vec<RequiredField>,
    pub status: LinkStatus,
    #[serde(default, rename = "user")]
    pub merchant: Merchant,
}

impl PaymentRequest {
    /// Only active links accept payments.
    pub fn ensure_payable(&self) -> Result<()> {
        if self.status != LinkStatus::Active {
            return Err(PaymentError::Validation(format!(
                "This payment link is no longer active (Status: {}).",
                self.status
            )));
        }
        Ok(())
    }

    pub fn recipient_address(&self) -> Result<&str> {
        self.merchant
            .wallet_address
            .as_deref()
            .filter(|address| !address.is_empty())
            .ok_or_else(|| {
                PaymentError::InvalidAddress(format!(
                    "payment link {} has no merchant wallet address",
                    self.link_id
                ))
            })
    }
}

/// Buyer-supplied values for one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuyerSubmission {
    fields: HashMap<RequiredField, String>,
    terms_accepted: bool,
}

impl BuyerSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: RequiredField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn with_terms_accepted(mut self) -> Self {
        self.terms_accepted = true;
        self
    }

    pub fn set(&mut self, field: RequiredField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn accept_terms(&mut self, accepted: bool) {
        self.terms_accepted = accepted;
    }

    /// Trimmed value; blank values count as absent.
    pub fn get(&self, field: RequiredField) -> Option<&str> {
        self.fields
            .get(&field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn missing_fields(&self, required: &[RequiredField]) -> Vec<RequiredField> {
        let mut missing: Vec<RequiredField> = required
            .iter()
            .copied()
            .filter(|field| self.get(*field).is_none())
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Guards the start of an attempt against `request`.
    pub fn ensure_complete(&self, request: &PaymentRequest) -> Result<()> {
        let missing = self.missing_fields(&request.required_customer_info);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(RequiredField::as_str).collect();
            return Err(PaymentError::Validation(format!(
                "Please fill in all required customer information (missing: {}).",
                names.join(", ")
            )));
        }
        if !self.terms_accepted {
            return Err(PaymentError::Validation(
                "Please accept the terms of service.".to_string(),
            ));
        }
        Ok(())
    }

    /// Supplied non-blank values in stable field order.
    pub fn supplied(&self) -> Vec<(RequiredField, &str)> {
        let mut supplied: Vec<(RequiredField, &str)> = self
            .fields
            .keys()
            .filter_map(|field| self.get(*field).map(|value| (*field, value)))
            .collect();
        supplied.sort_by_key(|(field, _)| *field);
        supplied
    }
}
