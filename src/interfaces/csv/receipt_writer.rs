use crate::domain::attempt::AttemptReceipt;
use crate::error::Result;
use std::io::Write;

const HEADER: [&str; 7] = [
    "link_id",
    "outcome",
    "error_kind",
    "signature",
    "amount_units",
    "recorded_at",
    "message",
];

/// Writes attempt receipts as CSV, one row per receipt.
///
/// The header row is always written, so an empty journal still yields a
/// well-formed file.
pub struct ReceiptWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReceiptWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_receipts(&mut self, receipts: impl IntoIterator<Item = AttemptReceipt>) -> Result<()> {
        self.writer.write_record(HEADER)?;
        for receipt in receipts {
            let amount = receipt.amount_units.map(|u| u.to_string()).unwrap_or_default();
            let recorded_at = receipt.recorded_at.to_rfc3339();
            self.writer.write_record([
                receipt.link_id.as_str(),
                receipt.outcome.as_str(),
                receipt.error_kind.as_deref().unwrap_or(""),
                receipt.signature.as_deref().unwrap_or(""),
                amount.as_str(),
                recorded_at.as_str(),
                receipt.message.as_str(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
