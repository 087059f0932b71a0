//! veilcred-server - commitment index, identity escrow, and disclosure
//!
//! run this next to your zk-lending deployment to index activity
//! commitments, guard sealed identities, and drive dispute windows.
//!
//! usage:
//!   veilcred-server --port 4700                       # dev/testing
//!   veilcred-server --port 4700 --data-dir /var/lib/veilcred
//!
//! data stored in ~/.veilcred-server/
//!
//! the bundled ledger and trustee set are in-process stand-ins for
//! development; production deployments point the library seams at a real
//! chain indexer and real trustee nodes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use ed25519_dalek::{Signature, Signer, SigningKey};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use veilcred::commitment::BindingRecord;
use veilcred::index::DEFAULT_NEGATIVE_TTL;
use veilcred::ledger::LoanTerms;
use veilcred::store::SledPayloadStore;
use veilcred::{
    ActivityCommitment, CommitmentIndex, DisputeScheduler, DisputeWindowTask, Error,
    IdentityCommitment, IdentityPayload, Ledger, LoanApplication, LocalTrustees, MemoryLedger,
    Orchestrator,
};

/// veilcred-server - commitment index, identity escrow, and disclosure
#[derive(Parser)]
#[command(name = "veilcred-server")]
#[command(about = "veilcred backend - commitment index, identity escrow, and disclosure")]
#[command(version)]
struct Args {
    /// port to listen on
    #[arg(short, long, default_value = "4700")]
    port: u16,

    /// data directory (default: ~/.veilcred-server)
    #[arg(short, long)]
    data_dir: Option<String>,

    /// trustee ids for the dev trustee set
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "trustee-1,trustee-2,trustee-3,trustee-4,trustee-5"
    )]
    trustees: Vec<String>,

    /// default share threshold for new escrows
    #[arg(short, long, default_value = "3")]
    threshold: u8,

    /// bind address (default: 0.0.0.0)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// metrics port (prometheus endpoint, default: api_port + 1000)
    #[arg(long)]
    metrics_port: Option<u16>,
}

/// app state shared across handlers
struct AppState {
    orchestrator: Orchestrator<MemoryLedger, LocalTrustees, SledPayloadStore>,
    index: CommitmentIndex,
    scheduler: Arc<DisputeScheduler>,
    ledger: Arc<MemoryLedger>,
    /// unix-seconds clock shared with the scheduler; tracks wall time
    /// until frozen through the dev clock endpoint
    clock: Arc<AtomicU64>,
    clock_frozen: AtomicBool,
    /// node signing key for receipts and disclosures
    signing_key: SigningKey,
    default_threshold: u8,
    /// trustee set used when a seal request names none
    dev_trustee_ids: Vec<String>,
}

// === request/response types ===

#[derive(Deserialize)]
struct RecordCommitmentRequest {
    /// activity commitment, hex
    commitment: String,
}

#[derive(Serialize)]
struct RecordCommitmentResponse {
    ok: bool,
    new: bool,
    indexed: usize,
}

#[derive(Deserialize)]
struct SealRequest {
    identity_commitment: String,
    document_hash: String,
    name_commitment: String,
    dob_commitment: String,
    address_commitment: String,
    binding_key: String,
    #[serde(default)]
    trustees: Vec<String>,
    #[serde(default)]
    threshold: Option<u8>,
}

#[derive(Serialize)]
struct SealResponse {
    ok: bool,
    escrow_id: String,
    payload_locator: String,
    acks: usize,
    threshold: u8,
    distribution_complete: bool,
    signature: String,
}

#[derive(Deserialize)]
struct RedistributeRequest {
    identity_commitment: String,
}

#[derive(Deserialize)]
struct BindingRequest {
    activity_commitment: String,
    identity_commitment: String,
    /// binding tag, hex
    tag: String,
}

#[derive(Deserialize)]
struct RevealRequest {
    loan_id: u64,
    commitment: String,
}

#[derive(Serialize)]
struct RevealResponse {
    ok: bool,
    disclosure: Option<DisclosureBody>,
}

#[derive(Serialize)]
struct DisclosureBody {
    loan_id: u64,
    borrower_wallet: String,
    identity_commitment: String,
    document_hash: String,
    name_commitment: String,
    dob_commitment: String,
    address_commitment: String,
    /// node signature over (loan_id, activity commitment, document hash)
    signature: String,
}

#[derive(Deserialize)]
struct ScheduleRequest {
    loan_id: u64,
    commitment: String,
    /// explicit expiry; when omitted the window is derived from the
    /// application deadline plus the loan's dispute window
    #[serde(default)]
    fires_at: Option<u64>,
}

#[derive(Serialize)]
struct ScheduleResponse {
    ok: bool,
    fires_at: u64,
}

#[derive(Deserialize)]
struct CancelRequest {
    loan_id: u64,
    commitment: String,
}

#[derive(Serialize)]
struct NodeInfoResponse {
    version: String,
    pubkey: String,
    indexed_commitments: usize,
    pending_disputes: usize,
    default_threshold: u8,
}

type HandlerError = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn internal(e: impl ToString) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn parse_hex32(s: &str, what: &str) -> Result<[u8; 32], HandlerError> {
    let bytes = hex::decode(s).map_err(|_| bad_request(format!("{} is not hex", what)))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| bad_request(format!("{} must be 32 bytes", what)))
}

fn parse_activity(s: &str) -> Result<ActivityCommitment, HandlerError> {
    ActivityCommitment::from_hex(s).map_err(|e| bad_request(e.to_string()))
}

fn parse_identity(s: &str) -> Result<IdentityCommitment, HandlerError> {
    IdentityCommitment::from_hex(s).map_err(|e| bad_request(e.to_string()))
}

/// map a reveal failure to a response without leaking which gate failed
///
/// `NotOverdue` is the one informative case: callers polling a deadline
/// need the remaining time. every other failure collapses to the same
/// refusal, so the response never exposes a borrower's escrow
/// configuration (threshold, ack counts, crypto state) to the caller.
fn reveal_error(e: Error) -> HandlerError {
    match e {
        Error::NotOverdue { remaining_secs } => (
            StatusCode::FORBIDDEN,
            format!("not overdue, {}s remaining", remaining_secs),
        ),
        other => {
            tracing::debug!("reveal refused: {}", other);
            (StatusCode::FORBIDDEN, "reveal conditions not met".into())
        }
    }
}

// === handlers ===

async fn record_commitment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordCommitmentRequest>,
) -> Result<Json<RecordCommitmentResponse>, HandlerError> {
    counter!("veilcred_requests_total", "endpoint" => "record_commitment").increment(1);

    let commitment = parse_activity(&req.commitment)?;
    let now = state.clock.load(Ordering::SeqCst);
    let new = state.index.record(&commitment, now).map_err(internal)?;

    gauge!("veilcred_indexed_commitments").set(state.index.len() as f64);

    Ok(Json(RecordCommitmentResponse {
        ok: true,
        new,
        indexed: state.index.len(),
    }))
}

async fn list_applications(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<u64>,
) -> Result<Json<Vec<LoanApplication>>, HandlerError> {
    let start = Instant::now();
    counter!("veilcred_requests_total", "endpoint" => "list_applications").increment(1);

    let apps = state
        .index
        .discover_applications(state.ledger.as_ref(), loan_id)
        .await
        .map_err(internal)?;

    histogram!("veilcred_discovery_duration_seconds").record(start.elapsed().as_secs_f64());
    Ok(Json(apps))
}

async fn seal_escrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SealRequest>,
) -> Result<Json<SealResponse>, HandlerError> {
    let start = Instant::now();
    counter!("veilcred_requests_total", "endpoint" => "seal").increment(1);

    let identity = parse_identity(&req.identity_commitment)?;
    let payload = IdentityPayload {
        document_hash: parse_hex32(&req.document_hash, "document_hash")?,
        name_commitment: parse_hex32(&req.name_commitment, "name_commitment")?,
        dob_commitment: parse_hex32(&req.dob_commitment, "dob_commitment")?,
        address_commitment: parse_hex32(&req.address_commitment, "address_commitment")?,
        binding_key: parse_hex32(&req.binding_key, "binding_key")?,
    };

    let trustees = if req.trustees.is_empty() {
        state.orchestrator_trustees()
    } else {
        req.trustees.clone()
    };
    let threshold = req.threshold.unwrap_or(state.default_threshold);

    let receipt = state
        .orchestrator
        .seal_identity(&payload, &identity, &trustees, threshold)
        .await
        .map_err(|e| match e {
            Error::EscrowExists => (StatusCode::CONFLICT, e.to_string()),
            Error::InsufficientTrustees { .. } => bad_request(e.to_string()),
            other => internal(other),
        })?;

    counter!("veilcred_escrows_sealed_total").increment(1);
    histogram!("veilcred_request_duration_seconds", "endpoint" => "seal")
        .record(start.elapsed().as_secs_f64());

    let sig_data = [receipt.escrow_id.as_slice(), identity.as_bytes()].concat();
    let signature: Signature = state.signing_key.sign(&sig_data);

    Ok(Json(SealResponse {
        ok: true,
        escrow_id: hex::encode(receipt.escrow_id),
        payload_locator: receipt.payload_locator,
        acks: receipt.acks,
        threshold: receipt.threshold,
        distribution_complete: receipt.distribution_complete,
        signature: hex::encode(signature.to_bytes()),
    }))
}

async fn redistribute_escrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedistributeRequest>,
) -> Result<Json<SealResponse>, HandlerError> {
    counter!("veilcred_requests_total", "endpoint" => "redistribute").increment(1);

    let identity = parse_identity(&req.identity_commitment)?;
    let receipt = state
        .orchestrator
        .redistribute(&identity)
        .await
        .map_err(|e| match e {
            Error::NotFound => (StatusCode::NOT_FOUND, "no escrow for this identity".into()),
            other => internal(other),
        })?;

    let sig_data = [receipt.escrow_id.as_slice(), identity.as_bytes()].concat();
    let signature: Signature = state.signing_key.sign(&sig_data);

    Ok(Json(SealResponse {
        ok: true,
        escrow_id: hex::encode(receipt.escrow_id),
        payload_locator: receipt.payload_locator,
        acks: receipt.acks,
        threshold: receipt.threshold,
        distribution_complete: receipt.distribution_complete,
        signature: hex::encode(signature.to_bytes()),
    }))
}

async fn register_binding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BindingRequest>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    counter!("veilcred_requests_total", "endpoint" => "binding").increment(1);

    let record = BindingRecord {
        activity_commitment: parse_activity(&req.activity_commitment)?,
        identity_commitment: parse_identity(&req.identity_commitment)?,
        tag: parse_hex32(&req.tag, "tag")?,
    };
    state.orchestrator.register_binding(&record).map_err(internal)?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn reveal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RevealRequest>,
) -> Result<Json<RevealResponse>, HandlerError> {
    let start = Instant::now();
    counter!("veilcred_requests_total", "endpoint" => "reveal").increment(1);

    let commitment = parse_activity(&req.commitment)?;
    let disclosure = state
        .orchestrator
        .attempt_reveal(req.loan_id, &commitment)
        .await
        .map_err(|e| {
            counter!("veilcred_reveals_refused_total").increment(1);
            reveal_error(e)
        })?;

    counter!("veilcred_disclosures_total").increment(1);
    histogram!("veilcred_request_duration_seconds", "endpoint" => "reveal")
        .record(start.elapsed().as_secs_f64());

    let sig_data = [
        req.loan_id.to_be_bytes().as_slice(),
        commitment.as_bytes(),
        &disclosure.payload.document_hash,
    ]
    .concat();
    let signature: Signature = state.signing_key.sign(&sig_data);

    Ok(Json(RevealResponse {
        ok: true,
        disclosure: Some(DisclosureBody {
            loan_id: req.loan_id,
            borrower_wallet: disclosure.borrower_wallet,
            identity_commitment: disclosure.identity_commitment.to_hex(),
            document_hash: hex::encode(disclosure.payload.document_hash),
            name_commitment: hex::encode(disclosure.payload.name_commitment),
            dob_commitment: hex::encode(disclosure.payload.dob_commitment),
            address_commitment: hex::encode(disclosure.payload.address_commitment),
            signature: hex::encode(signature.to_bytes()),
        }),
    }))
}

async fn schedule_dispute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, HandlerError> {
    counter!("veilcred_requests_total", "endpoint" => "schedule").increment(1);

    let commitment = parse_activity(&req.commitment)?;

    let fires_at = match req.fires_at {
        Some(t) => t,
        None => {
            let app = state
                .ledger
                .get(req.loan_id, &commitment)
                .await
                .map_err(internal)?
                .ok_or((StatusCode::NOT_FOUND, "no such application".into()))?;
            let deadline = app
                .repayment_deadline
                .ok_or_else(|| bad_request("application has no repayment deadline"))?;
            let window = state
                .ledger
                .get_loan(req.loan_id)
                .await
                .map_err(internal)?
                .map(|terms| terms.dispute_window_secs)
                .unwrap_or(0);
            deadline + window
        }
    };

    state
        .scheduler
        .schedule(&DisputeWindowTask {
            loan_id: req.loan_id,
            commitment,
            fires_at,
        })
        .map_err(internal)?;

    gauge!("veilcred_pending_disputes").set(state.scheduler.pending().len() as f64);
    info!("dispute window for loan {} set to fire at {}", req.loan_id, fires_at);

    Ok(Json(ScheduleResponse { ok: true, fires_at }))
}

async fn cancel_dispute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    counter!("veilcred_requests_total", "endpoint" => "cancel").increment(1);

    let commitment = parse_activity(&req.commitment)?;
    let existed = state
        .scheduler
        .cancel(req.loan_id, &commitment)
        .map_err(internal)?;

    gauge!("veilcred_pending_disputes").set(state.scheduler.pending().len() as f64);
    Ok(Json(serde_json::json!({ "ok": true, "cancelled": existed })))
}

async fn node_info(State(state): State<Arc<AppState>>) -> Json<NodeInfoResponse> {
    Json(NodeInfoResponse {
        version: env!("CARGO_PKG_VERSION").into(),
        pubkey: hex::encode(state.signing_key.verifying_key().to_bytes()),
        indexed_commitments: state.index.len(),
        pending_disputes: state.scheduler.pending().len(),
        default_threshold: state.default_threshold,
    })
}

async fn health() -> &'static str {
    "ok"
}

// === dev-only ledger controls ===
//
// the in-process ledger has no chain behind it; these endpoints stand in
// for on-chain events so the full seal -> approve -> overdue -> reveal
// path can be exercised locally.

async fn dev_post_loan(
    State(state): State<Arc<AppState>>,
    Json(terms): Json<LoanTerms>,
) -> Json<serde_json::Value> {
    state.ledger.post_loan(terms);
    Json(serde_json::json!({ "ok": true }))
}

async fn dev_submit_application(
    State(state): State<Arc<AppState>>,
    Json(app): Json<LoanApplication>,
) -> Json<serde_json::Value> {
    state.ledger.submit_application(app);
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Deserialize)]
struct DevApproveRequest {
    loan_id: u64,
    commitment: String,
    repayment_deadline: u64,
}

async fn dev_approve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DevApproveRequest>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let commitment = parse_activity(&req.commitment)?;
    state
        .ledger
        .approve(req.loan_id, &commitment, req.repayment_deadline);
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn dev_repay(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let commitment = parse_activity(&req.commitment)?;
    state.ledger.repay(req.loan_id, &commitment);
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
struct DevClockRequest {
    unix_secs: u64,
}

async fn dev_clock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DevClockRequest>,
) -> Json<serde_json::Value> {
    state.clock_frozen.store(true, Ordering::SeqCst);
    state.clock.store(req.unix_secs, Ordering::SeqCst);
    state.ledger.set_now(req.unix_secs);
    warn!("clock frozen at {}", req.unix_secs);
    Json(serde_json::json!({ "ok": true, "now": req.unix_secs }))
}

impl AppState {
    fn orchestrator_trustees(&self) -> Vec<String> {
        self.dev_trustee_ids.clone()
    }
}

fn wall_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_secs()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veilcred_server=info".parse().unwrap())
                .add_directive("veilcred=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    // setup prometheus metrics exporter
    let metrics_port = args.metrics_port.unwrap_or(args.port + 1000);
    let metrics_addr: std::net::SocketAddr = format!("{}:{}", args.bind, metrics_port)
        .parse()
        .expect("invalid metrics address");

    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("failed to install prometheus metrics exporter");

    let data_dir = args.data_dir.unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        format!("{}/.veilcred-server", home)
    });
    std::fs::create_dir_all(&data_dir).expect("failed to create data dir");

    let db_path = format!("{}/db", data_dir);
    let db = sled::open(&db_path).expect("failed to open database");

    let key_path = format!("{}/node.key", data_dir);
    let signing_key = if std::path::Path::new(&key_path).exists() {
        let key_bytes = std::fs::read(&key_path).expect("failed to read key");
        let key_arr: [u8; 32] = key_bytes.try_into().expect("invalid key length");
        SigningKey::from_bytes(&key_arr)
    } else {
        let key = SigningKey::generate(&mut rand::thread_rng());
        std::fs::write(&key_path, key.to_bytes()).expect("failed to write key");
        key
    };

    let ledger = Arc::new(MemoryLedger::new());
    let trustees = Arc::new(LocalTrustees::new(&args.trustees));
    warn!("in-process ledger and trustees - dev mode only, no chain behind this");

    let payloads = Arc::new(SledPayloadStore::open(&db).expect("failed to open payload store"));
    let registry =
        Arc::new(veilcred::EscrowRegistry::open(&db).expect("failed to open escrow registry"));
    let index =
        CommitmentIndex::open(&db, DEFAULT_NEGATIVE_TTL).expect("failed to open commitment index");
    let scheduler = Arc::new(DisputeScheduler::open(&db).expect("failed to open scheduler"));

    let orchestrator = Orchestrator::new(ledger.clone(), trustees, payloads, registry);

    let now = wall_clock();
    let clock = Arc::new(AtomicU64::new(now));
    ledger.set_now(now);

    let pubkey = hex::encode(signing_key.verifying_key().to_bytes());
    info!("veilcred-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  pubkey: {}", pubkey);
    info!("  trustees: {}", args.trustees.join(","));
    info!("  threshold: {}", args.threshold);
    info!("  data: {}", data_dir);
    info!("  bind: {}:{}", args.bind, args.port);
    info!("  metrics: {}:{}", args.bind, metrics_port);

    gauge!("veilcred_indexed_commitments").set(index.len() as f64);
    gauge!("veilcred_pending_disputes").set(scheduler.pending().len() as f64);

    let state = Arc::new(AppState {
        orchestrator,
        index,
        scheduler: scheduler.clone(),
        ledger: ledger.clone(),
        clock: clock.clone(),
        clock_frozen: AtomicBool::new(false),
        signing_key,
        default_threshold: args.threshold,
        dev_trustee_ids: args.trustees.clone(),
    });

    // keep the shared clock on wall time until a dev endpoint freezes it
    {
        let state = state.clone();
        tokio::spawn(async move {
            loop {
                if !state.clock_frozen.load(Ordering::SeqCst) {
                    let now = wall_clock();
                    state.clock.store(now, Ordering::SeqCst);
                    state.ledger.set_now(now);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        });
    }

    // dispute-window loop: fires re-check the ledger through the
    // orchestrator, so a stale task is a no-op
    {
        let state = state.clone();
        let clock = clock.clone();
        tokio::spawn(scheduler.run(
            move || clock.load(Ordering::SeqCst),
            move |task| {
                let state = state.clone();
                async move {
                    if let Some(disclosure) = state.orchestrator.handle_dispute_fire(&task).await {
                        counter!("veilcred_disclosures_total").increment(1);
                        info!(
                            "dispute fire disclosed identity {} for loan {}",
                            disclosure.identity_commitment.to_hex(),
                            task.loan_id
                        );
                    }
                }
            },
        ));
    }

    let app = Router::new()
        .route("/", get(node_info))
        .route("/health", get(health))
        .route("/commitments", post(record_commitment))
        .route("/loans/{loan_id}/applications", get(list_applications))
        .route("/escrow/seal", post(seal_escrow))
        .route("/escrow/redistribute", post(redistribute_escrow))
        .route("/bindings", post(register_binding))
        .route("/reveal", post(reveal))
        .route("/disputes/schedule", post(schedule_dispute))
        .route("/disputes/cancel", post(cancel_dispute))
        .route("/dev/loans", post(dev_post_loan))
        .route("/dev/applications", post(dev_submit_application))
        .route("/dev/approve", post(dev_approve))
        .route("/dev/repay", post(dev_repay))
        .route("/dev/clock", post(dev_clock))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("listening on {}", addr);

    axum::serve(listener, app).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_failures_stay_opaque() {
        // nothing in a refused reveal may hint at escrow configuration
        let refusals = [
            Error::NotFound,
            Error::NotApproved,
            Error::BindingUnverifiable,
            Error::DistributionPending { acks: 1, need: 3 },
            Error::InsufficientShares { have: 2, need: 3 },
            Error::ShareIntegrityFailed,
            Error::DecryptionFailed,
            Error::Storage("sled".into()),
        ];
        for e in refusals {
            let (code, body) = reveal_error(e);
            assert_eq!(code, StatusCode::FORBIDDEN);
            assert_eq!(body, "reveal conditions not met");
        }
    }

    #[test]
    fn test_not_overdue_reports_remaining() {
        let (code, body) = reveal_error(Error::NotOverdue { remaining_secs: 42 });
        assert_eq!(code, StatusCode::FORBIDDEN);
        assert!(body.contains("42"));
    }
}
