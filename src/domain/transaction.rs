//! Ledger transactions in the legacy message format.
//!
//! A message lists every account it touches once, ordered signer-writable,
//! signer-readonly, writable, readonly, and refers to them by index. The fee
//! payer is always account 0. Signatures are Ed25519 over the serialized
//! message bytes.

use crate::domain::address::Pubkey;
use crate::error::{PaymentError, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const SIGNATURE_LENGTH: usize = 64;

/// Durability requested when fetching block references and confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recent block hash anchoring a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", self)
    }
}

impl FromStr for Blockhash {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| PaymentError::Transport(format!("malformed blockhash {:?}: {}", s, e)))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| PaymentError::Transport(format!("blockhash {:?} is not 32 bytes", s)))?;
        Ok(Self(bytes))
    }
}

/// A block reference and the last block height at which it is still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Blockhash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, Copy, Default)]
struct KeyFlags {
    is_signer: bool,
    is_writable: bool,
}

impl Message {
    /// Compiles `instructions` with `fee_payer` as the first signer.
    pub fn compile(
        fee_payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: Blockhash,
    ) -> Result<Self> {
        let mut flags: BTreeMap<Pubkey, KeyFlags> = BTreeMap::new();
        for ix in instructions {
            flags.entry(ix.program_id).or_default();
            for meta in &ix.accounts {
                let entry = flags.entry(meta.pubkey).or_default();
                entry.is_signer |= meta.is_signer;
                entry.is_writable |= meta.is_writable;
            }
        }
        flags.remove(fee_payer);

        let group = |signer: bool, writable: bool| -> Vec<Pubkey> {
            flags
                .iter()
                .filter(|(_, f)| f.is_signer == signer && f.is_writable == writable)
                .map(|(key, _)| *key)
                .collect()
        };
        let writable_signers = group(true, true);
        let readonly_signers = group(true, false);
        let writable_unsigned = group(false, true);
        let readonly_unsigned = group(false, false);

        let mut account_keys = Vec::with_capacity(flags.len() + 1);
        account_keys.push(*fee_payer);
        account_keys.extend(writable_signers.iter());
        account_keys.extend(readonly_signers.iter());
        account_keys.extend(writable_unsigned.iter());
        account_keys.extend(readonly_unsigned.iter());

        if account_keys.len() > u8::MAX as usize {
            return Err(PaymentError::Validation(format!(
                "transaction references {} accounts",
                account_keys.len()
            )));
        }

        let header = MessageHeader {
            num_required_signatures: (1 + writable_signers.len() + readonly_signers.len()) as u8,
            num_readonly_signed_accounts: readonly_signers.len() as u8,
            num_readonly_unsigned_accounts: readonly_unsigned.len() as u8,
        };

        let index_of = |key: &Pubkey| -> u8 {
            account_keys
                .iter()
                .position(|candidate| candidate == key)
                .map(|i| i as u8)
                .unwrap_or_default()
        };
        let instructions = instructions
            .iter()
            .map(|ix| CompiledInstruction {
                program_id_index: index_of(&ix.program_id),
                accounts: ix.accounts.iter().map(|meta| index_of(&meta.pubkey)).collect(),
                data: ix.data.clone(),
            })
            .collect();

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn signer_keys(&self) -> &[Pubkey] {
        let signers = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..signers]
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);
        encode_length(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());
        encode_length(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_length(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_length(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }
}

/// Compact-u16 length prefix: 7 bits per byte, high bit set on all but the last.
fn encode_length(out: &mut Vec<u8>, len: usize) {
    let mut rem = len as u16;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// What the payer is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub recipient: Pubkey,
    pub asset_symbol: String,
    pub amount_units: u64,
    /// Amount with full asset precision, e.g. `3.000000000 SOL`.
    pub display_amount: String,
}

/// A compiled message awaiting the fee payer's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub message: Message,
    pub block_reference: BlockReference,
    pub summary: TransferSummary,
}

impl UnsignedTransaction {
    pub fn message_bytes(&self) -> Vec<u8> {
        self.message.serialize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub message: Message,
    pub signatures: Vec<[u8; SIGNATURE_LENGTH]>,
}

impl SignedTransaction {
    /// Pairs `signatures` with the message's signer keys, verifying each.
    pub fn new(message: Message, signatures: Vec<[u8; SIGNATURE_LENGTH]>) -> Result<Self> {
        let tx = Self {
            message,
            signatures,
        };
        tx.verify()?;
        Ok(tx)
    }

    pub fn verify(&self) -> Result<()> {
        let signers = self.message.signer_keys();
        if signers.len() != self.signatures.len() {
            return Err(PaymentError::SigningRejected(format!(
                "expected {} signatures, got {}",
                signers.len(),
                self.signatures.len()
            )));
        }
        let bytes = self.message.serialize();
        for (key, sig) in signers.iter().zip(&self.signatures) {
            let verifying = VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| {
                PaymentError::SigningRejected(format!("signer {} is not a wallet key", key))
            })?;
            verifying
                .verify(&bytes, &Signature::from_bytes(sig))
                .map_err(|_| {
                    PaymentError::SigningRejected(format!("signature for {} does not verify", key))
                })?;
        }
        Ok(())
    }

    /// The fee payer's signature, which identifies the transaction on the ledger.
    pub fn signature(&self) -> String {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
            .unwrap_or_default()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_length(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend(self.message.serialize());
        out
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::SYSTEM_PROGRAM_ID;
    use ed25519_dalek::{Signer, SigningKey};

    fn payer() -> SigningKey {
        SigningKey::from_bytes(&[11; 32])
    }

    fn pubkey_of(key: &SigningKey) -> Pubkey {
        Pubkey::new_from_array(key.verifying_key().to_bytes())
    }

    fn transfer(from: Pubkey, to: Pubkey) -> Instruction {
        Instruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![AccountMeta::new(from, true), AccountMeta::new(to, false)],
            data: vec![2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn test_compact_length_encoding() {
        let cases: [(usize, &[u8]); 5] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
        ];
        for (len, expected) in cases {
            let mut out = Vec::new();
            encode_length(&mut out, len);
            assert_eq!(out, expected, "length {}", len);
        }
    }

    #[test]
    fn test_compile_orders_accounts() {
        let from = pubkey_of(&payer());
        let to = Pubkey::new_from_array([9; 32]);
        let message =
            Message::compile(&from, &[transfer(from, to)], Blockhash::new_from_array([1; 32]))
                .unwrap();

        assert_eq!(message.account_keys, vec![from, to, SYSTEM_PROGRAM_ID]);
        assert_eq!(
            message.header,
            MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            }
        );
        assert_eq!(message.instructions[0].program_id_index, 2);
        assert_eq!(message.instructions[0].accounts, vec![0, 1]);
    }

    #[test]
    fn test_message_serialization_layout() {
        let from = pubkey_of(&payer());
        let to = Pubkey::new_from_array([9; 32]);
        let message =
            Message::compile(&from, &[transfer(from, to)], Blockhash::new_from_array([1; 32]))
                .unwrap();
        let bytes = message.serialize();

        // header(3) + len(1) + 3 keys + blockhash + len(1) + ix(1 + 1 + 2 + 1 + 12)
        assert_eq!(bytes.len(), 3 + 1 + 3 * 32 + 32 + 1 + 17);
        assert_eq!(&bytes[..4], &[1, 0, 1, 3]);
        assert_eq!(&bytes[4..36], from.as_bytes());
        assert_eq!(&bytes[100..132], &[1; 32]);
        assert_eq!(&bytes[132..138], &[1, 2, 2, 0, 1, 12]);
    }

    #[test]
    fn test_signed_transaction_verifies_and_identifies() {
        let key = payer();
        let from = pubkey_of(&key);
        let message = Message::compile(
            &from,
            &[transfer(from, Pubkey::new_from_array([9; 32]))],
            Blockhash::new_from_array([1; 32]),
        )
        .unwrap();
        let sig = key.sign(&message.serialize()).to_bytes();

        let signed = SignedTransaction::new(message.clone(), vec![sig]).unwrap();
        assert_eq!(signed.signature(), bs58::encode(sig).into_string());
        assert_eq!(signed.serialize()[0], 1);
        assert_eq!(&signed.serialize()[1..65], &sig);

        let forged = SignedTransaction::new(message, vec![[0; SIGNATURE_LENGTH]]);
        assert!(matches!(forged, Err(PaymentError::SigningRejected(_))));
    }

    #[test]
    fn test_blockhash_parse() {
        let hash: Blockhash = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(hash, Blockhash::default());
        assert!("not-a-hash".parse::<Blockhash>().is_err());
    }
}
