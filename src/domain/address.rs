use crate::error::{PaymentError, Result};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const PUBKEY_LENGTH: usize = 32;

/// Marker appended to every program-derived address preimage.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey([0; PUBKEY_LENGTH]);

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// A 32-byte ledger account key, written in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey([u8; PUBKEY_LENGTH]);

impl Pubkey {
    pub const fn new_from_array(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; PUBKEY_LENGTH] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    /// True when the bytes decompress to a point on the Ed25519 curve, i.e. the
    /// key could belong to a wallet holding a private key.
    pub fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }

    /// Hashes `seeds` and `bump` under `program_id`; only off-curve results are
    /// valid program addresses.
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());
        (!candidate.is_on_curve()).then_some(candidate)
    }

    /// Searches bump seeds from 255 downward for the first valid program address.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
        (0..=u8::MAX).rev().find_map(|bump| {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            Self::create_program_address(&with_bump, program_id).map(|key| (key, bump))
        })
    }
}

/// Address of `owner`'s associated token account for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    Pubkey::find_program_address(
        &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
    .ok_or_else(|| {
        PaymentError::InvalidAddress(format!(
            "no associated token account for owner {} and mint {}",
            owner, mint
        ))
    })
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl FromStr for Pubkey {
    type Err = PaymentError;

    /// Structural parse only; see [`AddressValidator`] for the curve check.
    fn from_str(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| PaymentError::InvalidAddress(format!("{:?} is not base58: {}", s, e)))?;
        let bytes: [u8; PUBKEY_LENGTH] = decoded.try_into().map_err(|v: Vec<u8>| {
            PaymentError::InvalidAddress(format!(
                "{:?} decodes to {} bytes, expected {}",
                s,
                v.len(),
                PUBKEY_LENGTH
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A recipient that passed [`AddressValidator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRecipient(Pubkey);

impl ValidRecipient {
    pub fn pubkey(&self) -> &Pubkey {
        &self.0
    }
}

pub struct AddressValidator;

impl AddressValidator {
    /// Checks encoding, length and that the key lies on the curve.
    pub fn validate(address: &str) -> Result<ValidRecipient> {
        let key: Pubkey = address.parse()?;
        if !key.is_on_curve() {
            return Err(PaymentError::InvalidAddress(format!(
                "{} is not a valid wallet public key",
                address
            )));
        }
        Ok(ValidRecipient(key))
    }
}
