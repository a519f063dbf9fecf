use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use academy_backend::{
    app_router, AppState, BackendConfig, Clock, MirrorStore, ProgressStore,
};
use academy_ledger::{program, Keypair, Pubkey, RpcTransport};
use academy_test_fixtures::{
    achievement_type_data, mint_account_data, token_account_data, FakeLedger,
};

const BODY_LIMIT: usize = usize::MAX;
const XP_DECIMALS: u8 = 2;

struct TestHarness {
    app: Router,
    ledger: Arc<FakeLedger>,
    clock: Clock,
    program_id: Pubkey,
    xp_mint: Pubkey,
}

fn harness() -> TestHarness {
    harness_with_static_wallets(Vec::new())
}

fn harness_with_static_wallets(static_holder_wallets: Vec<Pubkey>) -> TestHarness {
    let ledger = Arc::new(FakeLedger::new());
    let xp_mint = Keypair::generate().pubkey();
    ledger.set_account(
        &xp_mint.to_string(),
        &program::TOKEN_2022_PROGRAM.to_string(),
        mint_account_data(XP_DECIMALS),
    );

    let program_id: Pubkey = program::DEFAULT_ACADEMY_PROGRAM.parse().unwrap();
    let config = BackendConfig {
        rpc_url: "http://unused.invalid".to_string(),
        program_id,
        xp_mint,
        backend_signer: Keypair::generate(),
        aliases: HashMap::new(),
        static_holder_wallets,
        mirror_db_path: None,
        bind_addr: "127.0.0.1:0".to_string(),
    };

    let clock = Clock::fixed(1_000_000);
    let state = AppState::with_components(
        config,
        ledger.clone() as Arc<dyn RpcTransport>,
        MirrorStore::in_memory(),
        ProgressStore::in_memory(),
        clock.clone(),
    );

    TestHarness {
        app: app_router(state),
        ledger,
        clock,
        program_id,
        xp_mint,
    }
}

impl TestHarness {
    fn deploy_achievement(&self, id: &str, max_supply: u32, minted_count: u32) {
        let address = program::achievement_type_address(id, &self.program_id).unwrap();
        self.ledger.set_account(
            &address.to_string(),
            &self.program_id.to_string(),
            achievement_type_data(
                id,
                "Achievement",
                "ar://metadata",
                &Pubkey::new([77u8; 32]),
                &Pubkey::new([78u8; 32]),
                max_supply,
                minted_count,
            ),
        );
    }

    fn create_receipt(&self, id: &str, recipient: &Pubkey) {
        let address =
            program::achievement_receipt_address(id, recipient, &self.program_id).unwrap();
        self.ledger
            .set_account(&address.to_string(), &self.program_id.to_string(), vec![1]);
    }

    fn add_token_account(&self, seed: u8, owner: &Pubkey, raw_amount: u64) {
        self.ledger.set_account(
            &Pubkey::new([seed; 32]).to_string(),
            &program::TOKEN_2022_PROGRAM.to_string(),
            token_account_data(&self.xp_mint, owner, raw_amount),
        );
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("response");
        into_json(response).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .expect("response");
        into_json(response).await
    }

    async fn complete_lesson(&self, user_id: &str, xp: u64) {
        let (status, payload) = self
            .post(
                "/academy/learning/complete-lesson",
                json!({"user_id": user_id, "xp": xp}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["ok"], true);
    }
}

async fn into_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

// ── Two-phase minting ───────────────────────────────────────────────

#[tokio::test]
async fn first_steps_scenario_end_to_end() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();

    // No lessons yet: the server-side evaluator rejects the prepare.
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-1", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["not_eligible"], true);
    assert!(payload["error"].as_str().is_some());

    h.complete_lesson("learner-1", 10).await;

    // Now eligible: a partially signed transaction comes back.
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-1", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let transaction = payload["transaction"].as_str().expect("transaction");
    let asset_address = payload["asset_address"].as_str().expect("asset address");

    // Three required signatures; the recipient's slot is still zeroed and
    // the backend/asset slots are filled.
    let bytes = BASE64.decode(transaction).unwrap();
    assert_eq!(bytes[0], 3);
    assert!(bytes[1..65].iter().all(|b| *b == 0));
    assert!(bytes[65..129].iter().any(|b| *b != 0));
    assert!(bytes[129..193].iter().any(|b| *b != 0));

    // The wallet countersigns and broadcasts out of band; confirm persists
    // the mirror record.
    let (status, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "first-steps",
                "user_id": "learner-1",
                "signature": "3synthetic5ignature",
                "asset_address": asset_address,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);

    let (_, payload) = h
        .get("/academy/achievements?user_id=learner-1")
        .await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "first-steps")
        .unwrap();
    assert_eq!(entry["earned"], true);
    assert_eq!(entry["minted"], true);

    // Once the broadcast lands, the receipt account exists and a repeat
    // prepare short-circuits idempotently.
    h.create_receipt("first-steps", &wallet);
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-1", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["already_minted"], true);
    assert!(payload["transaction"].is_null());
}

#[tokio::test]
async fn existing_receipt_short_circuits_and_heals_the_mirror() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-2", 10).await;

    // A receipt exists on-ledger, but the mirror has never heard of it.
    h.create_receipt("first-steps", &wallet);

    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-2", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["already_minted"], true);

    let (_, payload) = h.get("/academy/achievements?user_id=learner-2").await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "first-steps")
        .unwrap();
    assert_eq!(entry["earned"], true);
    // A healed record has no asset address, so it is not proof of mint.
    assert_eq!(entry["minted"], false);
}

#[tokio::test]
async fn sold_out_and_not_deployed_are_distinct_outcomes() {
    let h = harness();
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-3", 10).await;

    // Not configured on-ledger at all.
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-3", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["error_code"], "NOT_DEPLOYED");

    // Deployed but fully minted.
    h.deploy_achievement("first-steps", 5, 5);
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-3", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["sold_out"], true);

    // One unit left: the prepare goes through.
    h.deploy_achievement("first-steps", 5, 4);
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-3", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["transaction"].as_str().is_some());
}

#[tokio::test]
async fn confirm_without_prior_prepare_is_accepted() {
    let h = harness();
    let asset = Keypair::generate().pubkey();

    let (status, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "week-warrior",
                "user_id": "learner-4",
                "signature": "synthetic",
                "asset_address": asset.to_string(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);

    let (_, payload) = h.get("/academy/achievements?user_id=learner-4").await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "week-warrior")
        .unwrap();
    assert_eq!(entry["earned"], true);
    assert_eq!(entry["minted"], true);
}

#[tokio::test]
async fn duplicate_creation_broadcast_failure_maps_to_already_minted() {
    let h = harness();

    let (status, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "first-steps",
                "user_id": "learner-5",
                "error": "Transaction simulation failed: account already in use",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], false);
    assert_eq!(payload["already_minted"], true);

    // The losing side of the race still heals the mirror.
    let (_, payload) = h.get("/academy/achievements?user_id=learner-5").await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "first-steps")
        .unwrap();
    assert_eq!(entry["earned"], true);

    // An unrelated failure is reported verbatim, not reinterpreted.
    let (status, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "first-steps",
                "user_id": "learner-5",
                "error": "blockhash not found",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], false);
    assert!(payload["already_minted"].is_null());
}

#[tokio::test]
async fn racing_confirms_keep_one_asset_address() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-6", 10).await;

    // Two concurrent prepares both pass the receipt check by design.
    let prepare = json!({"achievement_id": "first-steps", "user_id": "learner-6", "wallet": wallet.to_string()});
    let (first, second) = tokio::join!(
        h.post("/academy/achievements/prepare", prepare.clone()),
        h.post("/academy/achievements/prepare", prepare.clone()),
    );
    let winner_asset = first.1["transaction"]
        .as_str()
        .map(|_| first.1["asset_address"].as_str().unwrap().to_string())
        .expect("first prepare succeeded");
    assert!(second.1["transaction"].as_str().is_some());

    // The winner's broadcast lands; the loser's fails with a duplicate
    // account error and must not overwrite the stored asset.
    let (_, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "first-steps",
                "user_id": "learner-6",
                "signature": "synthetic",
                "asset_address": winner_asset,
            }),
        )
        .await;
    assert_eq!(payload["success"], true);

    let (_, payload) = h
        .post(
            "/academy/achievements/confirm",
            json!({
                "achievement_id": "first-steps",
                "user_id": "learner-6",
                "error": "account already in use",
            }),
        )
        .await;
    assert_eq!(payload["already_minted"], true);

    let (_, payload) = h.get("/academy/achievements?user_id=learner-6").await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "first-steps")
        .unwrap();
    assert_eq!(entry["minted"], true);
}

#[tokio::test]
async fn prepare_surfaces_ledger_unavailability() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-7", 10).await;

    // A failed receipt lookup is never read as "no receipt".
    h.ledger.set_fail("getAccountInfo", true);
    let (status, payload) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "learner-7", "wallet": wallet.to_string()}),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(payload["error_code"], "LEDGER_UNAVAILABLE");
}

#[tokio::test]
async fn invalid_inputs_are_bad_requests() {
    let h = harness();

    let (status, _) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "no-such-achievement", "user_id": "u", "wallet": "x"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post(
            "/academy/achievements/prepare",
            json!({"achievement_id": "first-steps", "user_id": "u", "wallet": "not-base58!"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post(
            "/academy/achievements/confirm",
            json!({"achievement_id": "first-steps", "user_id": "u", "signature": "sig", "asset_address": "synced"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Mintable listing ────────────────────────────────────────────────

#[tokio::test]
async fn mintable_listing_filters_and_heals() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    h.deploy_achievement("dedicated-learner", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-8", 10).await;

    // Receipt already on-ledger for first-steps.
    h.create_receipt("first-steps", &wallet);

    let (status, payload) = h
        .get(&format!(
            "/academy/achievements/mintable?user_id=learner-8&wallet={wallet}"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = payload["mintable"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();
    // first-steps: receipt exists. dedicated-learner: 1/25 lessons.
    assert!(ids.is_empty(), "unexpected mintable set: {ids:?}");

    // The discovery healed the mirror.
    let (_, payload) = h.get("/academy/achievements?user_id=learner-8").await;
    let entry = payload["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "first-steps")
        .unwrap();
    assert_eq!(entry["earned"], true);
}

#[tokio::test]
async fn mintable_listing_shows_deployed_eligible_achievements() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-9", 10).await;

    let (status, payload) = h
        .get(&format!(
            "/academy/achievements/mintable?user_id=learner-9&wallet={wallet}"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = payload["mintable"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();
    // Only first-steps is both eligible and deployed on-ledger.
    assert_eq!(ids, vec!["first-steps"]);
}

#[tokio::test]
async fn mintable_listing_degrades_when_batch_reads_fail() {
    let h = harness();
    h.deploy_achievement("first-steps", 0, 0);
    let wallet = Keypair::generate().pubkey();
    h.complete_lesson("learner-10", 10).await;

    // Batched reads fail: receipts fall back to the mirror (empty here)
    // and deploy checks assume deployed, favoring availability.
    h.ledger.set_fail("getMultipleAccounts", true);
    let (status, payload) = h
        .get(&format!(
            "/academy/achievements/mintable?user_id=learner-10&wallet={wallet}"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = payload["mintable"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["first-steps"]);
}

// ── Leaderboard ─────────────────────────────────────────────────────

#[tokio::test]
async fn leaderboard_sums_token_accounts_per_owner() {
    let h = harness();
    let owner_a = Pubkey::new([21u8; 32]);
    let owner_b = Pubkey::new([22u8; 32]);

    // Owner A holds two accounts: 150 + 75 raw at 2 decimals. Summing raw
    // first floors to 2; flooring per account would lose a unit.
    h.add_token_account(101, &owner_a, 150);
    h.add_token_account(102, &owner_a, 75);
    h.add_token_account(103, &owner_b, 1_000);
    h.add_token_account(104, &Pubkey::new([23u8; 32]), 0);

    let (status, payload) = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(status, StatusCode::OK);
    let entries = payload["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["wallet"], owner_b.to_string());
    assert_eq!(entries[0]["xp"], 10);
    assert_eq!(entries[1]["rank"], 2);
    assert_eq!(entries[1]["wallet"], owner_a.to_string());
    assert_eq!(entries[1]["xp"], 2);

    // Display names fall back to the 4+4 truncated address.
    let display = entries[0]["display_name"].as_str().unwrap();
    let wallet = owner_b.to_string();
    assert!(display.starts_with(&wallet[..4]) && display.ends_with(&wallet[wallet.len() - 4..]));
}

#[tokio::test]
async fn leaderboard_timeframes_are_monotonic() {
    let h = harness();
    h.add_token_account(110, &Pubkey::new([24u8; 32]), 10_000); // 100 XP

    let (_, alltime) = h.get("/academy/leaderboard?timeframe=alltime").await;
    let (_, monthly) = h.get("/academy/leaderboard?timeframe=monthly").await;
    let (_, weekly) = h.get("/academy/leaderboard?timeframe=weekly").await;

    let xp = |payload: &Value| payload["entries"][0]["xp"].as_u64().unwrap();
    assert_eq!(xp(&alltime), 100);
    assert_eq!(xp(&monthly), 65);
    assert_eq!(xp(&weekly), 30);
}

#[tokio::test]
async fn leaderboard_cache_expires_after_ttl() {
    let h = harness();
    h.add_token_account(120, &Pubkey::new([25u8; 32]), 500);

    let (_, first) = h.get("/academy/leaderboard?timeframe=alltime").await;
    let (_, second) = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(first, second);
    assert_eq!(h.ledger.call_count("getProgramAccounts"), 1);

    // Within the TTL the cache answers; past it a fresh scan runs.
    h.clock.advance(59_000);
    let _ = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(h.ledger.call_count("getProgramAccounts"), 1);

    h.clock.advance(2_000);
    let _ = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(h.ledger.call_count("getProgramAccounts"), 2);
}

#[tokio::test]
async fn leaderboard_falls_back_to_static_holders_on_scan_failure() {
    let owner = Pubkey::new([26u8; 32]);
    let h = harness_with_static_wallets(vec![owner]);
    h.add_token_account(130, &owner, 700);

    h.ledger.set_fail("getProgramAccounts", true);
    let (status, payload) = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(status, StatusCode::OK);
    let entries = payload["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["xp"], 7);
}

#[tokio::test]
async fn leaderboard_without_fallback_reports_unavailable() {
    let h = harness();
    h.ledger.set_fail("getProgramAccounts", true);

    let (status, payload) = h.get("/academy/leaderboard?timeframe=alltime").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(payload["error_code"], "LEDGER_UNAVAILABLE");
}

// ── Balances ────────────────────────────────────────────────────────

#[tokio::test]
async fn xp_endpoint_reports_scaled_balance() {
    let h = harness();
    let owner = Pubkey::new([27u8; 32]);
    h.add_token_account(140, &owner, 1_234);

    let (status, payload) = h.get(&format!("/academy/xp/{owner}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["xp"], 12);

    let (status, _) = h.get("/academy/xp/not-a-wallet").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
