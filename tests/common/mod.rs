#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use dbirr_checkout::application::state_machine::{CheckoutSettings, PaymentStateMachine};
use dbirr_checkout::config::AppConfig;
use dbirr_checkout::domain::address::Pubkey;
use dbirr_checkout::domain::attempt::AttemptReceipt;
use dbirr_checkout::domain::builder::TransactionBuilder;
use dbirr_checkout::domain::payment_link::PaymentRequest;
use dbirr_checkout::domain::ports::{
    Confirmation, LedgerClient, ReceiptStore, SigningAgent, SigningOutcome, VerificationClient,
};
use dbirr_checkout::domain::settlement::{SettlementRecord, SettlementStatus, VerificationRequest};
use dbirr_checkout::domain::transaction::{
    BlockReference, Blockhash, Commitment, SignedTransaction, UnsignedTransaction,
};
use dbirr_checkout::error::{PaymentError, Result};
use dbirr_checkout::infrastructure::in_memory::InMemoryReceiptStore;
use dbirr_checkout::infrastructure::keypair::KeypairSigner;
use ed25519_dalek::SigningKey;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const LINK_ID: &str = "lnk_7Hq2";
pub const MERCHANT_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const LAST_VALID_BLOCK_HEIGHT: u64 = 5_000;

// --- fixtures ---

pub fn payer_key() -> SigningKey {
    SigningKey::from_bytes(&[42; 32])
}

pub fn payer_pubkey() -> Pubkey {
    Pubkey::new_from_array(payer_key().verifying_key().to_bytes())
}

/// Writes the payer keypair in the JSON byte-array format and returns its path.
pub fn write_keypair(dir: &Path) -> PathBuf {
    let path = dir.join("payer.json");
    let bytes = payer_key().to_keypair_bytes().to_vec();
    std::fs::write(&path, serde_json::to_string(&bytes).unwrap()).unwrap();
    path
}

/// A link as served by `GET /payments/links/{id}`.
pub fn link_json(status: &str, currency: &str, amount: &str, required: &[&str]) -> Value {
    json!({
        "linkId": LINK_ID,
        "productName": "Yirgacheffe beans, 1kg",
        "productDescription": "Washed, light roast",
        "amount": amount,
        "currency": currency,
        "amountFiat": "1500.00",
        "fiatCurrencyCode": "ETB",
        "requiredCustomerInfo": required,
        "status": status,
        "user": { "walletAddress": MERCHANT_WALLET }
    })
}

pub fn sol_link(status: &str, required: &[&str]) -> PaymentRequest {
    serde_json::from_value(link_json(status, "SOL", "3.0", required)).unwrap()
}

pub fn settlement_json(request: &Value, status: &str) -> Value {
    json!({
        "id": "txn_01",
        "paymentLinkId": request["linkId"],
        "blockchainTransactionId": request["transactionSignature"],
        "amountPaid": "3.0",
        "currency": "SOL",
        "status": status,
        "payerAddress": null,
        "customerName": request.get("customerName"),
        "customerEmail": request.get("customerEmail"),
        "createdAt": "2025-03-01T12:00:00Z"
    })
}

pub fn builder() -> TransactionBuilder {
    TransactionBuilder::new(AppConfig::default().asset_registry().unwrap())
}

pub fn fast_settings() -> CheckoutSettings {
    CheckoutSettings {
        commitment: Commitment::Confirmed,
        verification_timeout: Duration::from_millis(200),
    }
}

// --- scripted ledger ---

#[derive(Clone)]
pub enum ConfirmScript {
    Confirmed,
    Failed(String),
    Timeout,
    /// Polling broke off with a transport error.
    Unreachable,
}

pub struct ScriptedLedger {
    pub block_reference_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub submitted: Mutex<Vec<SignedTransaction>>,
    /// Block references handed to `confirm`.
    pub confirmed_against: Mutex<Vec<BlockReference>>,
    submit_error: Option<String>,
    confirm: ConfirmScript,
    confirm_delay: Duration,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            block_reference_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            confirmed_against: Mutex::new(Vec::new()),
            submit_error: None,
            confirm: ConfirmScript::Confirmed,
            confirm_delay: Duration::ZERO,
        }
    }

    pub fn failing_submit(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }

    pub fn confirming(mut self, script: ConfirmScript) -> Self {
        self.confirm = script;
        self
    }

    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.block_reference_calls.load(Ordering::SeqCst),
            self.submit_calls.load(Ordering::SeqCst),
            self.confirm_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn latest_block_reference(&self) -> Result<BlockReference> {
        self.block_reference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BlockReference {
            blockhash: Blockhash::new_from_array([8; 32]),
            last_valid_block_height: LAST_VALID_BLOCK_HEIGHT,
        })
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(transaction.clone());
        match &self.submit_error {
            Some(message) => Err(PaymentError::Transport(message.clone())),
            None => Ok(transaction.signature()),
        }
    }

    async fn confirm(
        &self,
        signature: &str,
        reference: &BlockReference,
        _commitment: Commitment,
    ) -> Result<Confirmation> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.confirmed_against.lock().unwrap().push(*reference);
        tokio::time::sleep(self.confirm_delay).await;
        match &self.confirm {
            ConfirmScript::Confirmed => Ok(Confirmation::Confirmed),
            ConfirmScript::Failed(reason) => Ok(Confirmation::Failed(reason.clone())),
            ConfirmScript::Timeout => Err(PaymentError::ConfirmationTimeout {
                signature: signature.to_string(),
                expiry_height: reference.last_valid_block_height,
            }),
            ConfirmScript::Unreachable => {
                Err(PaymentError::Transport("connection refused".to_string()))
            }
        }
    }
}

// --- fake backend ---

#[derive(Clone)]
pub enum VerifyScript {
    Accept,
    Status(SettlementStatus),
    Reject(String),
    Hang,
}

pub struct FakeBackend {
    pub verify_calls: AtomicUsize,
    pub requests: Mutex<Vec<VerificationRequest>>,
    script: VerifyScript,
}

impl FakeBackend {
    pub fn new(script: VerifyScript) -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            script,
        }
    }

    fn record_for(request: &VerificationRequest, status: SettlementStatus) -> SettlementRecord {
        SettlementRecord {
            id: "txn_01".to_string(),
            payment_link_id: Some(request.link_id.clone()),
            blockchain_transaction_id: Some(request.transaction_signature.clone()),
            amount_paid: "3.0".parse().unwrap(),
            currency: "SOL".to_string(),
            status,
            payer_address: None,
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            customer_phone: request.customer_phone.clone(),
            customer_shipping_address: request.customer_shipping_address.clone(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl VerificationClient for FakeBackend {
    async fn fetch_link(&self, link_id: &str) -> Result<PaymentRequest> {
        Err(PaymentError::LinkNotFound(link_id.to_string()))
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<SettlementRecord> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match &self.script {
            VerifyScript::Accept => Ok(Self::record_for(request, SettlementStatus::Confirmed)),
            VerifyScript::Status(status) => Ok(Self::record_for(request, *status)),
            VerifyScript::Reject(message) => Err(PaymentError::Transport(message.clone())),
            VerifyScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(PaymentError::Transport("unreachable".to_string()))
            }
        }
    }
}

// --- signers ---

/// Wallet that holds every signature request until the gate opens.
pub struct GatedSigner {
    inner: KeypairSigner,
    pub gate: Arc<Notify>,
    pub sign_calls: AtomicUsize,
}

impl GatedSigner {
    pub fn new() -> Self {
        Self {
            inner: KeypairSigner::new(payer_key()),
            gate: Arc::new(Notify::new()),
            sign_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SigningAgent for GatedSigner {
    fn public_key(&self) -> Pubkey {
        self.inner.public_key()
    }

    async fn sign(&self, transaction: &UnsignedTransaction) -> SigningOutcome {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.sign(transaction).await
    }
}

pub fn approving_signer() -> KeypairSigner {
    KeypairSigner::new(payer_key())
}

pub fn declining_signer() -> KeypairSigner {
    KeypairSigner::new(payer_key()).with_approval(Arc::new(|_| false))
}

// --- wiring ---

pub struct Harness {
    pub ledger: Arc<ScriptedLedger>,
    pub backend: Arc<FakeBackend>,
    pub receipts: Arc<InMemoryReceiptStore>,
    pub machine: PaymentStateMachine,
}

impl Harness {
    pub fn new(ledger: ScriptedLedger, backend: FakeBackend) -> Self {
        Self::with_settings(ledger, backend, fast_settings())
    }

    pub fn with_settings(
        ledger: ScriptedLedger,
        backend: FakeBackend,
        settings: CheckoutSettings,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let backend = Arc::new(backend);
        let receipts = Arc::new(InMemoryReceiptStore::new());
        let machine = PaymentStateMachine::new(
            builder(),
            ledger.clone(),
            backend.clone(),
            receipts.clone(),
            settings,
        );
        Self {
            ledger,
            backend,
            receipts,
            machine,
        }
    }

    pub async fn receipts(&self) -> Vec<AttemptReceipt> {
        self.receipts.get(LINK_ID).await.unwrap()
    }
}

// --- stub HTTP server ---

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

#[derive(Clone)]
struct StubState {
    responder: Responder,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn record_and_respond(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body,
    };
    let (status, body) = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Local HTTP server that records every request and answers through `responder`.
pub struct StubServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            responder: Arc::new(responder),
            requests: requests.clone(),
        };
        let app = Router::new()
            .fallback(record_and_respond)
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { url, requests }
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RecordedRequest) -> bool) -> usize {
        self.recorded().iter().filter(|r| predicate(r)).count()
    }
}

/// JSON-RPC success envelope.
pub fn rpc_result(result: Value) -> (u16, String) {
    (
        200,
        json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string(),
    )
}

pub fn rpc_error(code: i64, message: &str) -> (u16, String) {
    (
        200,
        json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } })
            .to_string(),
    )
}

pub fn latest_blockhash_result() -> Value {
    json!({
        "context": { "slot": 2792 },
        "value": {
            "blockhash": Blockhash::new_from_array([8; 32]).to_string(),
            "lastValidBlockHeight": LAST_VALID_BLOCK_HEIGHT
        }
    })
}

pub fn signature_status_result(confirmation_status: Option<&str>, err: Value) -> Value {
    let status = match confirmation_status {
        Some(level) => json!({
            "slot": 100,
            "confirmations": 0,
            "err": err,
            "confirmationStatus": level
        }),
        None => Value::Null,
    };
    json!({ "context": { "slot": 100 }, "value": [status] })
}

/// Backend and ledger node behind one stub: REST routes under `/payments`,
/// JSON-RPC on `/`. Every submitted transaction confirms.
pub fn checkout_routes(request: &RecordedRequest) -> (u16, String) {
    use base64::Engine;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", path) if path == format!("/payments/links/{}", LINK_ID) => {
            (200, link_json("active", "SOL", "3.0", &["email"]).to_string())
        }
        ("GET", _) => (404, r#"{"message":"Not Found"}"#.to_string()),
        ("POST", "/payments/verify") => (201, settlement_json(&request.json(), "confirmed").to_string()),
        ("POST", "/") => {
            let call = request.json();
            match call["method"].as_str().unwrap_or_default() {
                "getLatestBlockhash" => rpc_result(latest_blockhash_result()),
                "sendTransaction" => {
                    let wire = base64::engine::general_purpose::STANDARD
                        .decode(call["params"][0].as_str().unwrap_or_default())
                        .unwrap_or_default();
                    // Byte 0 is the signature count; the fee payer's signature follows.
                    let signature = bs58::encode(&wire[1..65]).into_string();
                    rpc_result(json!(signature))
                }
                "getSignatureStatuses" => {
                    rpc_result(signature_status_result(Some("confirmed"), Value::Null))
                }
                "getBlockHeight" => rpc_result(json!(LAST_VALID_BLOCK_HEIGHT - 1)),
                other => rpc_error(-32601, &format!("Method not found: {}", other)),
            }
        }
        _ => (500, String::new()),
    }
}

/// Config file pointing both the backend and the ledger node at `url`.
pub fn write_config(dir: &Path, url: &str) -> PathBuf {
    let path = dir.join("dbirr.yaml");
    let yaml = format!(
        "backend:\n  base_url: \"{url}\"\n  timeout_ms: 2000\nledger:\n  rpc_url: \"{url}\"\n  poll_interval_ms: 10\nlogging:\n  level: warn\n"
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Runs the binary off the async runtime so a stub server can answer it.
pub async fn run_cli(args: Vec<std::ffi::OsString>) -> std::process::Output {
    tokio::task::spawn_blocking(move || {
        std::process::Command::new(assert_cmd::cargo_bin!("dbirr-checkout"))
            .args(args)
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}
