//! HTTP service reconciling the academy mirror store with the ledger.
//!
//! The ledger is the source of truth for XP balances and award receipts;
//! a local store mirrors those facts for fast reads and self-heals when a
//! scan discovers receipts it has never seen. Minting is two-phase: this
//! service prepares a partially signed transaction, the recipient's wallet
//! countersigns and broadcasts, and a confirmation call persists the
//! result.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use academy_common::{
    catalog, definition, evaluate, progress_percent, LeaderboardEntry, LearnerStats, Timeframe,
};
use academy_ledger::{
    HttpTransport, LedgerError, LedgerReader, MintRuntimeResolver, Pubkey, RpcClient, RpcTransport,
};

pub mod config;
pub mod leaderboard;
pub mod minting;
pub mod mirror;
pub mod progress;

pub use config::BackendConfig;
pub use leaderboard::{Clock, LeaderboardCache, LeaderboardService, LEADERBOARD_CACHE_TTL_MILLIS};
pub use minting::{classify_broadcast_error, MintOrchestrator, MintOutcome};
pub use mirror::{MirrorRecord, MirrorStore};
pub use progress::ProgressStore;

const CODE_INVALID_REQUEST: &str = "INVALID_REQUEST";
const CODE_NOT_DEPLOYED: &str = "NOT_DEPLOYED";
const CODE_LEDGER_UNAVAILABLE: &str = "LEDGER_UNAVAILABLE";
const CODE_MALFORMED_ACCOUNT: &str = "MALFORMED_ACCOUNT";
const CODE_MINT_NOT_RESOLVED: &str = "MINT_NOT_RESOLVED";
const CODE_INTERNAL: &str = "INTERNAL_SERVER_ERROR";

#[derive(Clone)]
pub struct AppState {
    config: Arc<BackendConfig>,
    reader: Arc<LedgerReader>,
    resolver: Arc<MintRuntimeResolver>,
    orchestrator: Arc<MintOrchestrator>,
    leaderboard: LeaderboardService,
    mirror: MirrorStore,
    progress: ProgressStore,
}

impl AppState {
    /// Production wiring: HTTP transport, persistent stores, system clock.
    pub fn new(config: BackendConfig) -> Self {
        let transport: Arc<dyn RpcTransport> =
            Arc::new(HttpTransport::new(config.rpc_url.clone()));
        let (mirror, progress) = match &config.mirror_db_path {
            Some(path) => {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).unwrap_or_else(|err| {
                            panic!("failed to create directory for {path}: {err}")
                        });
                    }
                }
                let db = sled::open(path)
                    .unwrap_or_else(|err| panic!("failed to open service db at {path}: {err}"));
                let mirror_tree = db
                    .open_tree("mirror")
                    .unwrap_or_else(|err| panic!("failed to open mirror tree: {err}"));
                let progress_tree = db
                    .open_tree("progress")
                    .unwrap_or_else(|err| panic!("failed to open progress tree: {err}"));
                (
                    MirrorStore::persistent(mirror_tree),
                    ProgressStore::persistent(progress_tree),
                )
            }
            None => (MirrorStore::in_memory(), ProgressStore::in_memory()),
        };
        Self::with_components(config, transport, mirror, progress, Clock::system())
    }

    /// Dependency-injected wiring; tests substitute a fake transport,
    /// in-memory stores, and a fixed clock.
    pub fn with_components(
        config: BackendConfig,
        transport: Arc<dyn RpcTransport>,
        mirror: MirrorStore,
        progress: ProgressStore,
        clock: Clock,
    ) -> Self {
        let rpc = RpcClient::new(transport);
        let reader = Arc::new(LedgerReader::new(rpc.clone(), config.program_id));
        let resolver = Arc::new(MintRuntimeResolver::new(rpc));
        let orchestrator = Arc::new(MintOrchestrator::new(
            reader.clone(),
            resolver.clone(),
            config.backend_signer.clone(),
            config.xp_mint,
        ));
        let leaderboard = LeaderboardService::new(
            reader.clone(),
            resolver.clone(),
            config.xp_mint,
            LeaderboardCache::new(),
            clock,
            config.aliases.clone(),
            config.static_holder_wallets.clone(),
        );
        Self {
            config: Arc::new(config),
            reader,
            resolver,
            orchestrator,
            leaderboard,
            mirror,
            progress,
        }
    }

}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, CODE_INVALID_REQUEST, message)
    }

    fn not_deployed(achievement_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            CODE_NOT_DEPLOYED,
            format!("achievement \"{achievement_id}\" is not configured on-ledger"),
        )
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, message)
    }

    fn from_ledger(err: LedgerError) -> Self {
        match &err {
            LedgerError::Unavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, CODE_LEDGER_UNAVAILABLE, err.to_string())
            }
            LedgerError::MalformedAccount(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_MALFORMED_ACCOUNT,
                err.to_string(),
            ),
            LedgerError::MintNotResolved(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_MINT_NOT_RESOLVED,
                err.to_string(),
            ),
            _ => Self::internal(err.to_string()),
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            error_code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

pub async fn serve(config: BackendConfig) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let bind_addr = config.bind_addr.clone();
    let app = app_router(AppState::new(config)).layer(cors);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {bind_addr}: {err}"));
    info!(addr = %bind_addr, "academy backend listening");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("server task failed");
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/academy/achievements", get(list_achievements))
        .route("/academy/achievements/mintable", get(list_mintable))
        .route("/academy/achievements/prepare", post(prepare_mint))
        .route("/academy/achievements/confirm", post(confirm_mint))
        .route("/academy/leaderboard", get(get_leaderboard))
        .route("/academy/xp/:wallet", get(get_xp))
        .route("/academy/learning/complete-lesson", post(complete_lesson))
        .with_state(state)
}

// ── Listings ────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct UserQuery {
    user_id: String,
    wallet: Option<String>,
}

#[derive(serde::Serialize)]
struct AchievementStatusEntry {
    id: &'static str,
    name: &'static str,
    icon_url: &'static str,
    xp_reward: u32,
    requirement: String,
    earned: bool,
    minted: bool,
    eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    progress: u8,
}

#[derive(serde::Serialize)]
struct AchievementsResponse {
    achievements: Vec<AchievementStatusEntry>,
}

/// Full catalog with per-user progress, for progress-bar rendering.
async fn list_achievements(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<AchievementsResponse>, ApiError> {
    let stats = state
        .progress
        .stats(&query.user_id)
        .map_err(ApiError::internal)?;
    let records = state
        .mirror
        .records_for_user(&query.user_id)
        .map_err(ApiError::internal)?;

    let achievements = catalog()
        .iter()
        .map(|def| {
            let eligibility = evaluate(&stats, def);
            let record = records.iter().find(|r| r.achievement_id == def.id);
            AchievementStatusEntry {
                id: def.id,
                name: def.name,
                icon_url: def.icon_url,
                xp_reward: def.xp_reward,
                requirement: def.requirement.describe(),
                earned: record.is_some(),
                minted: record.map(|r| r.has_plausible_asset()).unwrap_or(false),
                eligible: eligibility.eligible,
                reason: eligibility.reason,
                progress: progress_percent(&stats, def),
            }
        })
        .collect();

    Ok(Json(AchievementsResponse { achievements }))
}

#[derive(serde::Serialize)]
struct MintableEntry {
    id: &'static str,
    name: &'static str,
    icon_url: &'static str,
    xp_reward: u32,
    requirement: String,
}

#[derive(serde::Serialize)]
struct MintableResponse {
    mintable: Vec<MintableEntry>,
}

/// Achievements the user can mint right now: (eligible or already
/// mirrored) AND no on-ledger receipt AND deployed on-ledger.
async fn list_mintable(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<MintableResponse>, ApiError> {
    let wallet = query
        .wallet
        .as_deref()
        .map(|w| w.parse::<Pubkey>())
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let stats = state
        .progress
        .stats(&query.user_id)
        .map_err(ApiError::internal)?;
    let records = state
        .mirror
        .records_for_user(&query.user_id)
        .map_err(ApiError::internal)?;

    let earned: HashSet<&str> = records
        .iter()
        .map(|record| record.achievement_id.as_str())
        .collect();
    let mut minted: HashSet<String> = records
        .iter()
        .filter(|record| record.has_plausible_asset())
        .map(|record| record.achievement_id.clone())
        .collect();

    let eligibility: HashMap<&str, bool> = catalog()
        .iter()
        .map(|def| (def.id, evaluate(&stats, def).eligible))
        .collect();

    // Receipts are authoritative for "already minted": check candidates
    // on-ledger and heal the mirror for any receipt it has never seen.
    // On RPC failure the mirror alone decides (safety over availability).
    if let Some(wallet) = &wallet {
        let candidates: Vec<&str> = catalog()
            .iter()
            .map(|def| def.id)
            .filter(|id| (eligibility[id] || earned.contains(id)) && !minted.contains(*id))
            .collect();
        if !candidates.is_empty() {
            match state.reader.batch_receipts(&candidates, wallet).await {
                Ok(flags) => {
                    for (id, exists) in candidates.iter().zip(flags) {
                        if exists {
                            minted.insert(id.to_string());
                            if let Err(err) = state.mirror.sync_if_missing(&query.user_id, id) {
                                warn!(achievement = *id, %err, "mirror self-heal failed");
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "receipt batch check failed; relying on the mirror");
                }
            }
        }
    }

    // Deploy checks degrade the other way: prefer showing a mint option
    // over hiding it when the ledger cannot be asked.
    let all_ids: Vec<&str> = catalog().iter().map(|def| def.id).collect();
    let deployed: HashSet<&str> = match state.reader.batch_achievement_types(&all_ids).await {
        Ok(types) => all_ids
            .iter()
            .zip(&types)
            .filter(|(_, entry)| entry.is_some())
            .map(|(id, _)| *id)
            .collect(),
        Err(err) => {
            warn!(%err, "achievement-type batch check failed; assuming all deployed");
            all_ids.iter().copied().collect()
        }
    };

    let mintable = catalog()
        .iter()
        .filter(|def| {
            (eligibility[def.id] || earned.contains(def.id))
                && !minted.contains(def.id)
                && deployed.contains(def.id)
        })
        .map(|def| MintableEntry {
            id: def.id,
            name: def.name,
            icon_url: def.icon_url,
            xp_reward: def.xp_reward,
            requirement: def.requirement.describe(),
        })
        .collect();

    Ok(Json(MintableResponse { mintable }))
}

// ── Two-phase minting ───────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct PrepareRequest {
    achievement_id: String,
    user_id: String,
    wallet: String,
}

#[derive(Default, serde::Serialize)]
struct PrepareResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_eligible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_minted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sold_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Build the partially signed award transaction, or report a typed
/// business outcome. The distinct outcomes are never collapsed: "you
/// already have this", "you don't qualify yet", and "sold out" render
/// differently.
async fn prepare_mint(
    State(state): State<AppState>,
    Json(request): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError> {
    let def = definition(&request.achievement_id)
        .ok_or_else(|| ApiError::bad_request("unknown achievement"))?;
    let wallet: Pubkey = request
        .wallet
        .parse()
        .map_err(|err: LedgerError| ApiError::bad_request(err.to_string()))?;
    let stats = state
        .progress
        .stats(&request.user_id)
        .map_err(ApiError::internal)?;

    let outcome = state
        .orchestrator
        .prepare(&request.user_id, &wallet, def, &stats, &state.mirror)
        .await
        .map_err(ApiError::from_ledger)?;

    match outcome {
        MintOutcome::Prepared {
            transaction,
            asset_address,
        } => Ok(Json(PrepareResponse {
            transaction: Some(transaction),
            asset_address: Some(asset_address),
            ..PrepareResponse::default()
        })),
        MintOutcome::NotEligible { reason } => Ok(Json(PrepareResponse {
            not_eligible: Some(true),
            error: Some(reason),
            ..PrepareResponse::default()
        })),
        MintOutcome::AlreadyMinted => Ok(Json(PrepareResponse {
            already_minted: Some(true),
            error: Some("Already minted".to_string()),
            ..PrepareResponse::default()
        })),
        MintOutcome::SoldOut => Ok(Json(PrepareResponse {
            sold_out: Some(true),
            error: Some("Max supply reached".to_string()),
            ..PrepareResponse::default()
        })),
        MintOutcome::NotDeployed => Err(ApiError::not_deployed(def.id)),
    }
}

#[derive(serde::Deserialize)]
struct ConfirmRequest {
    achievement_id: String,
    user_id: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    asset_address: Option<String>,
    /// Broadcast failure reported by the signing boundary, if any.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, serde::Serialize)]
struct ConfirmResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_minted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sold_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Persist a confirmed mint, or classify a reported broadcast failure.
/// A confirmation without a prior prepare for the pair is accepted; the
/// mirror is eventually consistent, not authoritative.
async fn confirm_mint(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let def = definition(&request.achievement_id)
        .ok_or_else(|| ApiError::bad_request("unknown achievement"))?;

    if let Some(message) = &request.error {
        return Ok(Json(match classify_broadcast_error(message) {
            Some(MintOutcome::AlreadyMinted) => {
                // The expected loser's end of a benign race: the receipt
                // exists, so make sure the mirror knows about the award.
                if let Err(err) = state.mirror.sync_if_missing(&request.user_id, def.id) {
                    warn!(achievement = def.id, %err, "mirror self-heal failed");
                }
                ConfirmResponse {
                    already_minted: Some(true),
                    error: Some("Already minted".to_string()),
                    ..ConfirmResponse::default()
                }
            }
            Some(MintOutcome::SoldOut) => ConfirmResponse {
                sold_out: Some(true),
                error: Some("Max supply reached".to_string()),
                ..ConfirmResponse::default()
            },
            _ => ConfirmResponse {
                error: Some(message.clone()),
                ..ConfirmResponse::default()
            },
        }));
    }

    let signature = request
        .signature
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing signature"))?;
    let asset_address = request
        .asset_address
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing asset_address"))?;
    asset_address
        .parse::<Pubkey>()
        .map_err(|err| ApiError::bad_request(format!("asset_address: {err}")))?;

    state
        .orchestrator
        .confirm(
            &request.user_id,
            def.id,
            asset_address,
            &state.mirror,
            &state.progress,
            ProgressStore::today(),
        )
        .map_err(ApiError::internal)?;

    info!(
        achievement = def.id,
        user = %request.user_id,
        signature,
        "mint confirmation persisted"
    );
    Ok(Json(ConfirmResponse {
        success: true,
        ..ConfirmResponse::default()
    }))
}

// ── Leaderboard and balances ────────────────────────────────────────

#[derive(serde::Deserialize)]
struct LeaderboardQuery {
    timeframe: Option<String>,
}

#[derive(serde::Serialize)]
struct LeaderboardResponse {
    timeframe: &'static str,
    entries: Vec<LeaderboardEntry>,
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let timeframe = match query.timeframe.as_deref() {
        None => Timeframe::Alltime,
        Some(raw) => Timeframe::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown timeframe '{raw}'")))?,
    };

    let entries = state
        .leaderboard
        .leaderboard(timeframe)
        .await
        .map_err(ApiError::from_ledger)?;

    Ok(Json(LeaderboardResponse {
        timeframe: timeframe.as_str(),
        entries,
    }))
}

#[derive(serde::Serialize)]
struct XpResponse {
    wallet: String,
    xp: u64,
}

/// A wallet's on-ledger XP balance.
async fn get_xp(
    State(state): State<AppState>,
    AxumPath(wallet): AxumPath<String>,
) -> Result<Json<XpResponse>, ApiError> {
    let owner: Pubkey = wallet
        .parse()
        .map_err(|err: LedgerError| ApiError::bad_request(err.to_string()))?;
    let runtime = state
        .resolver
        .resolve(&state.config.xp_mint)
        .await
        .map_err(ApiError::from_ledger)?;
    let xp = state
        .reader
        .xp_balance_of(&owner, &state.config.xp_mint, runtime.decimals)
        .await
        .map_err(ApiError::from_ledger)?;
    Ok(Json(XpResponse { wallet, xp }))
}

// ── Progress ingest ─────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct CompleteLessonRequest {
    user_id: String,
    #[serde(default)]
    xp: u64,
    #[serde(default)]
    course_completed: bool,
    #[serde(default)]
    challenge: bool,
}

#[derive(serde::Serialize)]
struct CompleteLessonResponse {
    ok: bool,
    stats: LearnerStats,
}

async fn complete_lesson(
    State(state): State<AppState>,
    Json(request): Json<CompleteLessonRequest>,
) -> Result<Json<CompleteLessonResponse>, ApiError> {
    let stats = state
        .progress
        .record_lesson(
            &request.user_id,
            request.xp,
            request.course_completed,
            request.challenge,
            ProgressStore::today(),
        )
        .map_err(ApiError::internal)?;
    Ok(Json(CompleteLessonResponse { ok: true, stats }))
}
