use crate::domain::address::Pubkey;
use crate::error::{PaymentError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest precision whose scale factor still leaves room in a `u64` amount.
pub const MAX_DECIMALS: u32 = 18;

/// How an asset moves on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind<'a> {
    /// The ledger's base currency, moved by a system transfer.
    Native,
    /// A token tracked in associated token accounts under `mint`.
    Token { mint: &'a Pubkey },
}

/// Settlement asset as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Currency code used by the backend, e.g. `SOL` or `USDC`.
    pub symbol: String,
    pub decimals: u32,
    /// Token mint. `None` marks the native asset.
    #[serde(default)]
    pub mint: Option<Pubkey>,
}

impl AssetSpec {
    pub fn native(symbol: &str, decimals: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            mint: None,
        }
    }

    pub fn token(symbol: &str, decimals: u32, mint: Pubkey) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            mint: Some(mint),
        }
    }

    pub fn kind(&self) -> AssetKind<'_> {
        match &self.mint {
            None => AssetKind::Native,
            Some(mint) => AssetKind::Token { mint },
        }
    }
}

/// Lookup table of the assets this client knows how to pay with.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: HashMap<String, AssetSpec>,
}

impl AssetRegistry {
    /// Builds a registry, rejecting duplicate symbols, a second native asset
    /// and precisions that cannot be represented.
    pub fn new(specs: impl IntoIterator<Item = AssetSpec>) -> Result<Self> {
        let mut assets = HashMap::new();
        let mut native_seen = false;
        for spec in specs {
            if spec.decimals > MAX_DECIMALS {
                return Err(PaymentError::Config(format!(
                    "asset {} has {} decimals, maximum is {}",
                    spec.symbol, spec.decimals, MAX_DECIMALS
                )));
            }
            if spec.mint.is_none() {
                if native_seen {
                    return Err(PaymentError::Config(
                        "only one native asset may be configured".to_string(),
                    ));
                }
                native_seen = true;
            }
            let key = spec.symbol.to_uppercase();
            if assets.insert(key, spec.clone()).is_some() {
                return Err(PaymentError::Config(format!(
                    "asset {} configured twice",
                    spec.symbol
                )));
            }
        }
        Ok(Self { assets })
    }

    /// Resolves a currency code (case-insensitive).
    pub fn resolve(&self, symbol: &str) -> Result<&AssetSpec> {
        self.assets
            .get(&symbol.to_uppercase())
            .ok_or_else(|| PaymentError::UnsupportedAsset(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Exact conversion between display amounts and smallest indivisible units.
///
/// All arithmetic is done in `Decimal`; binary floating point never touches
/// an amount.
pub struct AssetConverter;

impl AssetConverter {
    /// `round_half_up(amount * 10^decimals)` as an integer unit count.
    pub fn to_smallest_unit(amount: Decimal, asset: &AssetSpec) -> Result<u64> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        let factor = Self::scale_factor(asset.decimals)?;
        let scaled = amount.checked_mul(factor).ok_or_else(|| {
            PaymentError::InvalidAmount(format!(
                "{} {} overflows when scaled to smallest units",
                amount, asset.symbol
            ))
        })?;
        let units = scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .ok_or_else(|| {
                PaymentError::InvalidAmount(format!(
                    "{} {} exceeds the representable unit range",
                    amount, asset.symbol
                ))
            })?;
        if units == 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "{} {} rounds to zero smallest units",
                amount, asset.symbol
            )));
        }
        Ok(units)
    }

    /// Inverse of [`Self::to_smallest_unit`]; exact for every `u64`.
    pub fn to_display(units: u64, asset: &AssetSpec) -> Result<Decimal> {
        Self::check_precision(asset.decimals)?;
        Ok(Decimal::from_i128_with_scale(units as i128, asset.decimals))
    }

    /// Renders a unit count with the asset's full precision, e.g. `3.000000000 SOL`.
    pub fn format_display(units: u64, asset: &AssetSpec) -> Result<String> {
        let mut value = Self::to_display(units, asset)?;
        value.rescale(asset.decimals);
        Ok(format!("{} {}", value, asset.symbol))
    }

    fn check_precision(decimals: u32) -> Result<()> {
        if decimals > MAX_DECIMALS {
            return Err(PaymentError::InvalidAmount(format!(
                "{} decimals exceeds supported precision",
                decimals
            )));
        }
        Ok(())
    }

    fn scale_factor(decimals: u32) -> Result<Decimal> {
        Self::check_precision(decimals)?;
        Ok(Decimal::from(10u64.pow(decimals)))
    }
}
