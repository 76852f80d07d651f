//! End-to-end check-in against a local stand-in for the upstream hosts,
//! using the file-backed credential store and the SQLite log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use dailysign::config::{AppConfig, Variant};
use dailysign::credentials::{CredentialPatch, CredentialStore};
use dailysign::storage::{SignStatus, Trigger};
use serde_json::{json, Value};

#[derive(Default)]
struct Calls {
    lottery: AtomicUsize,
    topup: AtomicUsize,
}

async fn upstream(calls: Arc<Calls>, redeem_ok: bool) -> String {
    let lottery_calls = calls.clone();
    let topup_calls = calls.clone();
    let app = Router::new()
        .route(
            "/api/lottery/spin",
            post(move |headers: HeaderMap| {
                let calls = lottery_calls.clone();
                async move {
                    calls.lottery.fetch_add(1, Ordering::SeqCst);
                    if headers["authorization"] != "Bearer reward-token" {
                        return Json(json!({"success": false, "message": "bad token"}));
                    }
                    Json(json!({
                        "success": true,
                        "message": "ok",
                        "data": {"cdk": "CDK-0000-1111", "quota": 5000, "times": 1, "label": "5k"}
                    }))
                }
            }),
        )
        .route(
            "/api/user/topup",
            post(move |Json(body): Json<Value>| {
                let calls = topup_calls.clone();
                async move {
                    calls.topup.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(body["key"], "CDK-0000-1111");
                    if redeem_ok {
                        Json(json!({"success": true, "message": "", "data": 7500}))
                    } else {
                        Json(json!({"success": false, "message": "session expired"}))
                    }
                }
            }),
        )
        .route(
            "/api/checkin",
            post(|| async { Json(json!({"success": true, "message": "signed in", "data": {"points": 3}})) }),
        )
        .route(
            "/api/user/info",
            post(|| async { Json(json!({"success": true, "data": {"total_signs": 40}})) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_for(base: &str, dir: &tempfile::TempDir, variant: Variant) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.token_path = dir.path().join("token.json");
    config.storage.db_path = dir.path().join("sign.db");
    config.upstream.variant = variant;
    config.upstream.lottery_url = format!("{base}/api/lottery/spin");
    config.upstream.sign_url = format!("{base}/api/checkin");
    config.upstream.user_info_url = format!("{base}/api/user/info");
    config.upstream.topup_url = format!("{base}/api/user/topup");
    config.upstream.timeout_secs = 5;
    config
}

fn store_credentials(store: &dyn CredentialStore) {
    store.save(&CredentialPatch {
        reward_token: Some("reward-token".into()),
        redeem_session: Some("sess".into()),
        redeem_user_id: Some("1".into()),
        ..Default::default()
    });
}

#[tokio::test]
async fn test_lottery_and_redeem_end_to_end() {
    let calls = Arc::new(Calls::default());
    let base = upstream(calls.clone(), true).await;
    let dir = tempfile::tempdir().unwrap();
    let state = dailysign::build_state(&config_for(&base, &dir, Variant::LotteryRedeem)).unwrap();
    store_credentials(state.credentials.as_ref());

    let result = state.workflow.run(Trigger::Scheduled).await;
    assert!(result.success, "{}", result.message);
    let data = result.data.unwrap();
    assert_eq!(data.quota, Some(7500.into()));
    assert_eq!(data.cdk.as_deref(), Some("CDK-0000-1111"));

    let page = state.log.list(1, 10).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.logs[0].status, SignStatus::Success);
    assert_eq!(page.logs[0].trigger, Trigger::Scheduled);

    let stats = state.status.status().await;
    assert!(stats.signed_today);
    assert_eq!(stats.continuous_days, 1);
    assert_eq!(stats.total_signs, 40);

    assert_eq!(calls.lottery.load(Ordering::SeqCst), 1);
    assert_eq!(calls.topup.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_redemption_keeps_code_and_logs_failure() {
    let calls = Arc::new(Calls::default());
    let base = upstream(calls.clone(), false).await;
    let dir = tempfile::tempdir().unwrap();
    let state = dailysign::build_state(&config_for(&base, &dir, Variant::LotteryRedeem)).unwrap();
    store_credentials(state.credentials.as_ref());

    let result = state.workflow.run(Trigger::Manual).await;
    assert!(!result.success);
    assert_eq!(result.cdk(), Some("CDK-0000-1111"));
    assert!(result.message.contains("session expired"));

    let page = state.log.list(1, 10).unwrap();
    assert_eq!(page.logs.len(), 1);
    assert_eq!(page.logs[0].status, SignStatus::Failed);
    assert!(page.logs[0].message.contains("CDK-0000..."));
}

#[tokio::test]
async fn test_direct_sign_end_to_end() {
    let calls = Arc::new(Calls::default());
    let base = upstream(calls.clone(), true).await;
    let dir = tempfile::tempdir().unwrap();
    let state = dailysign::build_state(&config_for(&base, &dir, Variant::DirectSign)).unwrap();
    store_credentials(state.credentials.as_ref());

    let result = state.workflow.run(Trigger::Manual).await;
    assert!(result.success);
    assert_eq!(result.message, "signed in");
    assert_eq!(calls.lottery.load(Ordering::SeqCst), 0);
    assert_eq!(state.log.list(1, 10).unwrap().logs[0].message, "signed in");
}
