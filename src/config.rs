use crate::application::state_machine::CheckoutSettings;
use crate::domain::address::Pubkey;
use crate::domain::asset::{AssetRegistry, AssetSpec};
use crate::domain::transaction::Commitment;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// `EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v`
pub const USDC_MAINNET_MINT: Pubkey = Pubkey::new_from_array([
    198, 250, 122, 243, 190, 219, 173, 58, 61, 101, 243, 106, 171, 201, 116, 49, 177, 187, 228,
    194, 210, 246, 224, 228, 124, 166, 2, 3, 69, 47, 93, 97,
]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub ledger: LedgerConfig,
    pub assets: Vec<AssetSpec>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Bound on each backend call, verification included.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub commitment: Commitment,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Consecutive failed status polls tolerated before giving up on confirmation.
    pub max_poll_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            ledger: LedgerConfig::default(),
            assets: vec![
                AssetSpec::native("SOL", 9),
                AssetSpec::token("USDC", 6, USDC_MAINNET_MINT),
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 15_000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            commitment: Commitment::Confirmed,
            poll_interval_ms: 500,
            request_timeout_ms: 10_000,
            max_poll_failures: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file. Missing sections take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PaymentError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| PaymentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend.timeout_ms == 0 {
            return Err(PaymentError::Config(
                "backend.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.ledger.poll_interval_ms == 0 {
            return Err(PaymentError::Config(
                "ledger.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.asset_registry().map(|_| ())
    }

    pub fn asset_registry(&self) -> Result<AssetRegistry> {
        AssetRegistry::new(self.assets.iter().cloned())
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            commitment: self.ledger.commitment,
            verification_timeout: Duration::from_millis(self.backend.timeout_ms),
        }
    }
}
