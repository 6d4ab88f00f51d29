//! Log severity of verification outcomes
//!
//! Rejected tokens are the caller's problem and log at warn; an unreachable
//! identity API is an operator problem and logs at error. Raw tokens never
//! appear in any log line.

mod common;

use std::time::Duration;

use proms_mcp::auth::tokenreview::TOKENREVIEW_PATH;
use proms_mcp::auth::userinfo::USERINFO_PATH;
use proms_mcp::auth::{
    IdentityVerifier, TokenReviewVerifier, TrustConfig, UserInfoVerifier, VerificationOutcome,
};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::CapturedLogs;

const SECRET: &str = "sha256~very-secret-token-value";

async fn capture(verifier: &dyn IdentityVerifier) -> (VerificationOutcome, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let outcome = verifier.verify(SECRET).await;
    (outcome, logs)
}

async fn verify_capturing(api_url: &str) -> (VerificationOutcome, CapturedLogs) {
    verify_with_timeout(api_url, Duration::from_secs(1)).await
}

async fn verify_with_timeout(
    api_url: &str,
    timeout: Duration,
) -> (VerificationOutcome, CapturedLogs) {
    let verifier = UserInfoVerifier::new(api_url, TrustConfig::system_store(), timeout).unwrap();
    capture(&verifier).await
}

async fn review_capturing(
    api_url: &str,
    timeout: Duration,
) -> (VerificationOutcome, CapturedLogs) {
    let verifier =
        TokenReviewVerifier::new(api_url, TrustConfig::system_store(), timeout).unwrap();
    capture(&verifier).await
}

fn has_unreachable_error(logs: &CapturedLogs) -> bool {
    logs.at(Level::ERROR)
        .iter()
        .any(|m| m.contains("Identity API unreachable"))
}

#[tokio::test]
async fn rejected_token_logs_warn_not_error() {
    let api = MockServer::start().await;
    Mock::given(path(USERINFO_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&api)
        .await;

    let (outcome, logs) = verify_capturing(&api.uri()).await;

    assert!(matches!(outcome, VerificationOutcome::Rejected));
    assert!(!logs.at(Level::WARN).is_empty());
    assert!(logs.at(Level::ERROR).is_empty());
    assert!(!logs.contains(SECRET));
}

#[tokio::test]
async fn unexpected_status_logs_warn() {
    let api = MockServer::start().await;
    Mock::given(path(USERINFO_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
        .mount(&api)
        .await;

    let (outcome, logs) = verify_capturing(&api.uri()).await;

    assert!(matches!(outcome, VerificationOutcome::Rejected));
    assert!(logs.at(Level::WARN).iter().any(|m| m.contains("unexpected status")));
    assert!(logs.at(Level::ERROR).is_empty());
}

#[tokio::test]
async fn unreachable_api_logs_error() {
    let (outcome, logs) = verify_capturing("http://127.0.0.1:1").await;

    assert!(matches!(outcome, VerificationOutcome::Unreachable(_)));
    assert!(has_unreachable_error(&logs));
    assert!(!logs.contains(SECRET));
}

#[tokio::test]
async fn slow_userinfo_times_out_at_error() {
    let api = MockServer::start().await;
    Mock::given(path(USERINFO_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"metadata": {"name": "alice"}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&api)
        .await;

    let (outcome, logs) = verify_with_timeout(&api.uri(), Duration::from_millis(200)).await;

    assert!(matches!(&outcome, VerificationOutcome::Unreachable(kind) if kind == "timeout"));
    assert!(has_unreachable_error(&logs));
    assert!(logs.at(Level::WARN).is_empty());
    assert!(!logs.contains(SECRET));
}

#[tokio::test]
async fn tokenreview_unauthorized_logs_warn_not_error() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKENREVIEW_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&api)
        .await;

    let (outcome, logs) = review_capturing(&api.uri(), Duration::from_secs(1)).await;

    assert!(matches!(outcome, VerificationOutcome::Rejected));
    assert!(logs.at(Level::WARN).iter().any(|m| m.contains("unauthorized")));
    assert!(logs.at(Level::ERROR).is_empty());
    assert!(!logs.contains(SECRET));
}

#[tokio::test]
async fn tokenreview_unauthenticated_logs_warn_not_error() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKENREVIEW_PATH))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"status": {"authenticated": false}})),
        )
        .mount(&api)
        .await;

    let (outcome, logs) = review_capturing(&api.uri(), Duration::from_secs(1)).await;

    assert!(matches!(outcome, VerificationOutcome::Rejected));
    assert!(logs.at(Level::WARN).iter().any(|m| m.contains("not authenticated")));
    assert!(logs.at(Level::ERROR).is_empty());
    assert!(!logs.contains(SECRET));
}

#[tokio::test]
async fn slow_tokenreview_times_out_at_error() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKENREVIEW_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"status": {"authenticated": false}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&api)
        .await;

    let (outcome, logs) = review_capturing(&api.uri(), Duration::from_millis(200)).await;

    assert!(matches!(&outcome, VerificationOutcome::Unreachable(kind) if kind == "timeout"));
    assert!(has_unreachable_error(&logs));
    assert!(logs.at(Level::WARN).is_empty());
    assert!(!logs.contains(SECRET));
}

#[test]
fn insecure_trust_warns_at_resolution() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let trust = TrustConfig::resolve(None, true).unwrap();

    assert!(trust.is_insecure());
    assert!(logs.at(Level::WARN).iter().any(|m| m.contains("DISABLED")));
}
