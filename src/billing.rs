//! Billing Entry Points
//!
//! Checkout-session creation against the payment provider plus the
//! credit-decrement endpoint. Separate HTTP surface from the webhook;
//! callers authenticate with a bearer token resolved through the auth
//! capability.

use crate::auth::AuthError;
use crate::server::AppState;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Error types for checkout-session creation
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Billing not configured")]
    NotConfigured,
}

/// Parameters for a new checkout session
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub price_id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Payment-session creation capability
#[async_trait]
pub trait CheckoutClient: Send + Sync {
    /// Create a checkout session and return its id
    async fn create_checkout_session(&self, params: &CheckoutParams)
        -> Result<String, BillingError>;
}

/// Stripe-backed checkout client
pub struct StripeCheckout {
    secret_key: String,
    client: reqwest::Client,
}

impl StripeCheckout {
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CheckoutClient for StripeCheckout {
    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<String, BillingError> {
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", params.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", params.success_url.clone()),
            ("cancel_url", params.cancel_url.clone()),
            ("client_reference_id", params.user_id.clone()),
        ];
        if let Some(email) = &params.user_email {
            form.push(("customer_email", email.clone()));
        }

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Provider(format!(
                "Stripe error {}: {}",
                status, body
            )));
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        info!("Created checkout session {}", session.id);
        Ok(session.id)
    }
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
}

/// Canned checkout client for tests
pub struct MockCheckout;

#[async_trait]
impl CheckoutClient for MockCheckout {
    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<String, BillingError> {
        Ok(format!("cs_test_{}_{}", params.user_id, params.price_id))
    }
}

/// Request body for POST /billing/checkout
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Request body for POST /billing/credits/consume
#[derive(Debug, Deserialize)]
pub struct ConsumeCreditsRequest {
    #[serde(default = "default_amount")]
    pub amount: i64,
}

fn default_amount() -> i64 {
    1
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn resolve_caller(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<crate::auth::AuthUser, (StatusCode, Json<serde_json::Value>)> {
    let auth = state.auth.as_ref().ok_or_else(|| {
        error!("Billing request but no auth backend configured");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "Internal server error" })),
        )
    })?;

    let token = bearer_token(headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "Missing bearer token" })),
    ))?;

    match auth.get_user(token).await {
        Ok(user) => Ok(user),
        Err(AuthError::Unauthorized) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "Invalid token" })),
        )),
        Err(e) => {
            error!("Auth backend failure: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            ))
        }
    }
}

/// Create a checkout session for the authenticated user
async fn create_checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let caller = match resolve_caller(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let checkout = match state.checkout.as_ref() {
        Some(c) => c,
        None => {
            error!("Checkout requested but no payment provider configured");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            );
        }
    };

    let params = CheckoutParams {
        price_id: req.price_id,
        user_id: caller.id.clone(),
        user_email: caller.email.clone(),
        success_url: req.success_url,
        cancel_url: req.cancel_url,
    };

    match checkout.create_checkout_session(&params).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(json!({ "success": true, "session_id": session_id })),
        ),
        Err(e) => {
            error!("Checkout session creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            )
        }
    }
}

/// Decrement the authenticated user's credit balance
async fn consume_credits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ConsumeCreditsRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let caller = match resolve_caller(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let user = match caller
        .email
        .as_deref()
        .map(|email| state.store.find_user_by_email(email))
        .transpose()
    {
        Ok(found) => found.flatten(),
        Err(e) => {
            error!("User lookup failed: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            );
        }
    };

    let user = match user {
        Some(user) => user,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": "User not found" })),
            )
        }
    };

    match state.store.consume_credits(user.id, req.amount) {
        Ok(Some(balance)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "credits": balance })),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "Insufficient credits" })),
        ),
        Err(e) => {
            error!("Credit decrement failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            )
        }
    }
}

/// Create the billing router
pub fn billing_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/billing/checkout", post(create_checkout))
        .route("/billing/credits/consume", post(consume_credits))
        .with_state(state)
}
