use clap::{Parser, Subcommand};
use dbirr_checkout::application::state_machine::{AttemptOutcome, PaymentStateMachine};
use dbirr_checkout::config::AppConfig;
use dbirr_checkout::domain::builder::TransactionBuilder;
use dbirr_checkout::domain::payment_link::{BuyerSubmission, PaymentRequest, RequiredField};
use dbirr_checkout::domain::ports::{ReceiptStoreRef, VerificationClient};
use dbirr_checkout::domain::transaction::TransferSummary;
use dbirr_checkout::infrastructure::backend::{HttpVerificationClient, SessionToken};
use dbirr_checkout::infrastructure::in_memory::InMemoryReceiptStore;
use dbirr_checkout::infrastructure::keypair::KeypairSigner;
#[cfg(feature = "storage-rocksdb")]
use dbirr_checkout::infrastructure::rocksdb::RocksDBReceiptStore;
use dbirr_checkout::infrastructure::rpc::JsonRpcLedgerClient;
use dbirr_checkout::interfaces::csv::receipt_writer::ReceiptWriter;
use dbirr_checkout::logging;
use miette::{IntoDiagnostic, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent receipt journal (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a payment link's details
    Show {
        link_id: String,
        /// Bearer token for the merchant backend
        #[arg(long)]
        token: Option<String>,
    },
    /// Pay a payment link with a local keypair
    Pay {
        link_id: String,
        /// Keypair file (JSON byte array)
        #[arg(long)]
        keypair: PathBuf,
        /// Customer detail requested by the merchant, e.g. `--field email=a@b.et`
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(RequiredField, String)>,
        /// Accept the merchant's terms of service
        #[arg(long)]
        accept_terms: bool,
        /// Sign without asking for confirmation
        #[arg(long)]
        yes: bool,
        /// Bearer token for the merchant backend
        #[arg(long)]
        token: Option<String>,
    },
    /// Write the receipt journal to stdout as CSV
    Receipts,
}

fn parse_field(raw: &str) -> std::result::Result<(RequiredField, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got {:?}", raw))?;
    let field = name.parse::<RequiredField>().map_err(|e| e.to_string())?;
    Ok((field, value.to_string()))
}

fn open_receipts(db_path: Option<&Path>) -> Result<ReceiptStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Arc::new(RocksDBReceiptStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryReceiptStore::new()))
        }
        None => Ok(Arc::new(InMemoryReceiptStore::new())),
    }
}

fn print_link(request: &PaymentRequest) {
    println!("{}", request.product_name);
    if let Some(description) = &request.product_description {
        println!("  {}", description);
    }
    println!(
        "Amount:    {} {} ({} {})",
        request.amount, request.currency, request.amount_fiat, request.fiat_currency_code
    );
    println!(
        "Recipient: {}",
        request.merchant.wallet_address.as_deref().unwrap_or("<not set>")
    );
    println!("Status:    {}", request.status);
    if !request.required_customer_info.is_empty() {
        let fields: Vec<&str> = request
            .required_customer_info
            .iter()
            .map(|f| f.as_str())
            .collect();
        println!("Requires:  {}", fields.join(", "));
    }
}

/// Terminal approval prompt; anything but an explicit yes declines.
fn prompt_approval(summary: &TransferSummary) -> bool {
    eprint!(
        "Send {} to {}? [y/N] ",
        summary.display_amount, summary.recipient
    );
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path).into_diagnostic()?,
        None => AppConfig::default(),
    };
    logging::init_logging(&config.logging);
    let receipts = open_receipts(cli.db_path.as_deref())?;

    match cli.command {
        Command::Show { link_id, token } => {
            let backend =
                HttpVerificationClient::new(&config.backend, token.map(SessionToken::new))
                    .into_diagnostic()?;
            let request = backend.fetch_link(&link_id).await.into_diagnostic()?;
            print_link(&request);
            if let Err(e) = request.ensure_payable() {
                eprintln!("{}", e);
            }
            Ok(())
        }
        Command::Pay {
            link_id,
            keypair,
            fields,
            accept_terms,
            yes,
            token,
        } => {
            let backend = Arc::new(
                HttpVerificationClient::new(&config.backend, token.map(SessionToken::new))
                    .into_diagnostic()?,
            );
            let request = backend.fetch_link(&link_id).await.into_diagnostic()?;
            print_link(&request);

            let mut submission = BuyerSubmission::new();
            for (field, value) in fields {
                submission.set(field, value);
            }
            submission.accept_terms(accept_terms);

            let mut signer = KeypairSigner::from_file(&keypair).into_diagnostic()?;
            if !yes {
                signer = signer.with_approval(Arc::new(prompt_approval));
            }

            let ledger = Arc::new(JsonRpcLedgerClient::new(&config.ledger).into_diagnostic()?);
            let builder = TransactionBuilder::new(config.asset_registry().into_diagnostic()?);
            let machine = PaymentStateMachine::new(
                builder,
                ledger,
                backend,
                receipts,
                config.checkout_settings(),
            );

            match machine.pay(&request, &submission, &signer).await {
                AttemptOutcome::Succeeded(record) => {
                    println!("Payment successful and verified!");
                    if let Some(signature) = &record.blockchain_transaction_id {
                        println!("Transaction: {}", signature);
                    }
                    println!("Settlement:  {}", record.id);
                    Ok(())
                }
                AttemptOutcome::Failed(err) => {
                    if let Some(signature) = err.retained_signature() {
                        eprintln!("Transaction signature: {}", signature);
                    }
                    Err(err).into_diagnostic()
                }
                AttemptOutcome::Ignored => {
                    eprintln!("A payment for this link is already in progress.");
                    Ok(())
                }
            }
        }
        Command::Receipts => {
            let all = receipts.all_receipts().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReceiptWriter::new(stdout.lock());
            writer.write_receipts(all).into_diagnostic()?;
            Ok(())
        }
    }
}
