use crate::domain::address::{
    AddressValidator, Pubkey, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID, associated_token_address,
};
use crate::domain::asset::{AssetConverter, AssetKind, AssetRegistry};
use crate::domain::payment_link::PaymentRequest;
use crate::domain::transaction::{
    AccountMeta, BlockReference, Instruction, Message, TransferSummary, UnsignedTransaction,
};
use crate::error::Result;

/// System program instruction index for a native transfer.
const SYSTEM_TRANSFER_TAG: u32 = 2;
/// Token program instruction index for `Transfer`.
const TOKEN_TRANSFER_TAG: u8 = 3;

/// Instructions for one payment, before a block reference is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub fee_payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub summary: TransferSummary,
}

impl TransferPlan {
    pub fn into_transaction(self, block_reference: BlockReference) -> Result<UnsignedTransaction> {
        let message = Message::compile(
            &self.fee_payer,
            &self.instructions,
            block_reference.blockhash,
        )?;
        Ok(UnsignedTransaction {
            message,
            block_reference,
            summary: self.summary,
        })
    }
}

/// Assembles transfer instructions for a payment request.
///
/// Pure construction: block references come from the caller and nothing here
/// touches the network.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    assets: AssetRegistry,
}

impl TransactionBuilder {
    pub fn new(assets: AssetRegistry) -> Self {
        Self { assets }
    }

    /// Resolves the asset, converts the amount and validates the recipient.
    pub fn plan(&self, request: &PaymentRequest, payer: &Pubkey) -> Result<TransferPlan> {
        let asset = self.assets.resolve(&request.currency)?;
        let units = AssetConverter::to_smallest_unit(request.amount, asset)?;
        let recipient = *AddressValidator::validate(request.recipient_address()?)?.pubkey();

        let instruction = match asset.kind() {
            AssetKind::Native => native_transfer(payer, &recipient, units),
            AssetKind::Token { mint } => {
                let source = associated_token_address(payer, mint)?;
                let destination = associated_token_address(&recipient, mint)?;
                token_transfer(&source, &destination, payer, units)
            }
        };

        Ok(TransferPlan {
            fee_payer: *payer,
            instructions: vec![instruction],
            summary: TransferSummary {
                recipient,
                asset_symbol: asset.symbol.clone(),
                amount_units: units,
                display_amount: AssetConverter::format_display(units, asset)?,
            },
        })
    }

    pub fn build(
        &self,
        request: &PaymentRequest,
        payer: &Pubkey,
        block_reference: BlockReference,
    ) -> Result<UnsignedTransaction> {
        self.plan(request, payer)?.into_transaction(block_reference)
    }
}

pub fn native_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

pub fn token_transfer(source: &Pubkey, destination: &Pubkey, owner: &Pubkey, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data,
    }
}
