//! End-to-end tests for the inbound webhook and billing entry points,
//! using the in-memory store and mock capabilities.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use genia_gateway::auth::{AuthUser, StaticUserAuth};
use genia_gateway::billing::MockCheckout;
use genia_gateway::dispatch::MockDispatcher;
use genia_gateway::quota::MESSAGE_ACTION;
use genia_gateway::store::Direction;
use genia_gateway::{
    handle_inbound, AppState, CloneKind, Config, GatewayServer, PlanTier, RecordStore,
    StubResponder, TwilioInbound, WebhookOutcome,
};
use std::sync::Arc;
use tower::ServiceExt;

const USER_PHONE: &str = "+15551234567";
const GATEWAY_NUMBER: &str = "+14155238886";

struct Harness {
    state: Arc<AppState>,
    store: Arc<RecordStore>,
    dispatcher: Arc<MockDispatcher>,
}

fn harness_with(dispatcher: MockDispatcher) -> Harness {
    let store = Arc::new(RecordStore::open_in_memory().unwrap());
    let dispatcher = Arc::new(dispatcher);
    let state = AppState::new(
        Config::for_tests(),
        store.clone(),
        dispatcher.clone(),
        Arc::new(StubResponder),
    );
    Harness {
        state: Arc::new(state),
        store,
        dispatcher,
    }
}

fn harness() -> Harness {
    harness_with(MockDispatcher::new(GATEWAY_NUMBER))
}

fn inbound(body: &str) -> TwilioInbound {
    TwilioInbound::text(
        &format!("whatsapp:{}", USER_PHONE),
        &format!("whatsapp:{}", GATEWAY_NUMBER),
        body,
    )
}

#[tokio::test]
async fn first_message_from_free_user_is_processed_as_ads() {
    let h = harness();
    let user_id = h
        .store
        .insert_user(USER_PHONE, None, PlanTier::Free, 0)
        .unwrap();

    let outcome = handle_inbound(&h.state, &inbound("Necesito un anuncio para mi negocio"))
        .await
        .unwrap();

    // "anuncio" is checked before "negocio" in the rule table
    match outcome {
        WebhookOutcome::Processed { clone, .. } => assert_eq!(clone, CloneKind::Ads),
        other => panic!("expected processed, got {:?}", other),
    }

    // Exactly one outbound message, one usage action
    assert_eq!(h.dispatcher.sent().len(), 1);
    let now = chrono::Utc::now().timestamp();
    assert_eq!(
        h.store
            .count_actions_since(user_id, MESSAGE_ACTION, now - 60)
            .unwrap(),
        1
    );

    // Both directions logged; the reply carries the clone tag
    let history = h.store.message_history(USER_PHONE, 10).unwrap();
    assert_eq!(history.len(), 2);
    let outbound = history
        .iter()
        .find(|m| m.direction == Direction::Outbound)
        .unwrap();
    assert_eq!(outbound.clone, Some(CloneKind::Ads));
    let inbound_row = history
        .iter()
        .find(|m| m.direction == Direction::Inbound)
        .unwrap();
    assert_eq!(inbound_row.clone, None);
}

#[tokio::test]
async fn unknown_number_gets_welcome_and_no_usage() {
    let h = harness();

    let outcome = handle_inbound(&h.state, &inbound("hola")).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::WelcomeSent));

    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, USER_PHONE);
    assert!(sent[0].1.contains("Regístrate"));

    // Welcome branch logs both rows, assigns no clone
    let history = h.store.message_history(USER_PHONE, 10).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.clone.is_none()));
}

#[tokio::test]
async fn free_user_at_limit_gets_notice_and_no_new_action() {
    let h = harness();
    let user_id = h
        .store
        .insert_user(USER_PHONE, None, PlanTier::Free, 0)
        .unwrap();

    let now = chrono::Utc::now().timestamp();
    for _ in 0..10 {
        h.store
            .record_action(user_id, MESSAGE_ACTION, Some(CloneKind::Content), now)
            .unwrap();
    }

    let outcome = handle_inbound(&h.state, &inbound("quiero publicidad"))
        .await
        .unwrap();

    match outcome {
        WebhookOutcome::LimitExceeded { used, limit } => {
            assert_eq!(used, 10);
            assert_eq!(limit, 10);
        }
        other => panic!("expected limit_exceeded, got {:?}", other),
    }

    // Notice sent, nothing new recorded
    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("límite"));
    assert_eq!(
        h.store
            .count_actions_since(user_id, MESSAGE_ACTION, now - 60)
            .unwrap(),
        10
    );
}

#[tokio::test]
async fn enterprise_user_is_never_limited() {
    let h = harness();
    let user_id = h
        .store
        .insert_user(USER_PHONE, None, PlanTier::Enterprise, 0)
        .unwrap();

    let now = chrono::Utc::now().timestamp();
    for _ in 0..600 {
        h.store
            .record_action(user_id, MESSAGE_ACTION, None, now)
            .unwrap();
    }

    let outcome = handle_inbound(&h.state, &inbound("estrategia"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::Processed {
            clone: CloneKind::Ceo,
            ..
        }
    ));
}

#[tokio::test]
async fn webhook_route_returns_200_with_outcome() {
    let h = harness();
    h.store
        .insert_user(USER_PHONE, None, PlanTier::Free, 0)
        .unwrap();

    let app = GatewayServer::new(h.state.clone()).build_router();
    let form = "MessageSid=SM123&From=whatsapp%3A%2B15551234567\
&To=whatsapp%3A%2B14155238886&Body=Necesito+un+anuncio+para+mi+negocio";

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["action"], "processed");
    assert_eq!(json["clone"], "ads");
    assert!(json["response"].is_string());
}

#[tokio::test]
async fn webhook_route_returns_500_on_dispatch_failure() {
    let h = harness_with(MockDispatcher::failing(GATEWAY_NUMBER));
    h.store
        .insert_user(USER_PHONE, None, PlanTier::Free, 0)
        .unwrap();

    let app = GatewayServer::new(h.state.clone()).build_router();
    let form = "MessageSid=SM124&From=whatsapp%3A%2B15551234567\
&To=whatsapp%3A%2B14155238886&Body=hola";

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

fn billing_harness() -> Harness {
    let store = Arc::new(RecordStore::open_in_memory().unwrap());
    let dispatcher = Arc::new(MockDispatcher::new(GATEWAY_NUMBER));
    let auth = StaticUserAuth::new().with_token(
        "tok123",
        AuthUser {
            id: "auth-u1".to_string(),
            email: Some("ana@example.com".to_string()),
            phone: Some(USER_PHONE.to_string()),
        },
    );
    let state = AppState::new(
        Config::for_tests(),
        store.clone(),
        dispatcher.clone(),
        Arc::new(StubResponder),
    )
    .with_auth(Arc::new(auth))
    .with_checkout(Arc::new(MockCheckout));

    Harness {
        state: Arc::new(state),
        store,
        dispatcher,
    }
}

#[tokio::test]
async fn checkout_creates_session_for_bearer_token() {
    let h = billing_harness();
    let app = GatewayServer::new(h.state.clone()).build_router();

    let body = serde_json::json!({
        "price_id": "price_pro",
        "success_url": "https://genia.app/ok",
        "cancel_url": "https://genia.app/cancel",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/billing/checkout")
                .header("content-type", "application/json")
                .header("authorization", "Bearer tok123")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["session_id"], "cs_test_auth-u1_price_pro");
}

#[tokio::test]
async fn checkout_rejects_missing_token() {
    let h = billing_harness();
    let app = GatewayServer::new(h.state.clone()).build_router();

    let body = serde_json::json!({
        "price_id": "price_pro",
        "success_url": "https://genia.app/ok",
        "cancel_url": "https://genia.app/cancel",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/billing/checkout")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn credits_consume_decrements_until_insufficient() {
    let h = billing_harness();
    h.store
        .insert_user(USER_PHONE, Some("ana@example.com"), PlanTier::Pro, 2)
        .unwrap();

    let app = GatewayServer::new(h.state.clone()).build_router();

    for expected in [1i64, 0] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/billing/credits/consume")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer tok123")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["credits"], expected);
    }

    // Balance exhausted
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/billing/credits/consume")
                .header("content-type", "application/json")
                .header("authorization", "Bearer tok123")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}
