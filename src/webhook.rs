//! Inbound WhatsApp Webhook
//!
//! Handles Twilio's form-encoded webhook POSTs. Each inbound message
//! runs a terminal-state machine with no retries and no intermediate
//! state:
//!
//! 1. resolve the sender by phone number
//! 2. unknown sender -> welcome notice -> done
//! 3. known sender -> quota reserve
//! 4. over limit -> limit notice, no action recorded -> done
//! 5. under limit -> classify -> synthesize -> reply -> done
//!
//! Every branch sends exactly one outbound message and appends the
//! inbound row plus one outbound row to the message log. Downstream
//! failures surface as a generic 500; a logged inbound row is not
//! rolled back when a later step fails.

use crate::classifier::classify;
use crate::clones::CloneKind;
use crate::plans::PlanTier;
use crate::quota::MESSAGE_ACTION;
use crate::server::AppState;
use crate::store::{Direction, MessageRecord};
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Form, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Twilio webhook form payload. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioInbound {
    pub message_sid: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub body: String,
}

/// Terminal state of one handled message
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    WelcomeSent,
    LimitExceeded { used: i64, limit: i64 },
    Processed { clone: CloneKind, reply: String },
}

impl WebhookOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            WebhookOutcome::WelcomeSent => "welcome_sent",
            WebhookOutcome::LimitExceeded { .. } => "limit_exceeded",
            WebhookOutcome::Processed { .. } => "processed",
        }
    }
}

/// Strip the transport prefix Twilio puts on WhatsApp numbers
pub fn strip_transport_prefix(number: &str) -> &str {
    number.strip_prefix("whatsapp:").unwrap_or(number)
}

/// Notice sent to numbers with no registered account
pub const DEFAULT_WELCOME: &str = "¡Hola! Soy Genia, tu equipo de asistentes de IA. \
Aún no encuentro una cuenta con este número. Regístrate en https://genia.app para comenzar.";

/// Limit notice quoting the same table the enforcer decided with
fn limit_notice(plan: PlanTier, used: i64, limit: i64) -> String {
    format!(
        "Has alcanzado el límite de tu plan {} ({}/{} mensajes en los últimos 30 días). \
Mejora tu plan en https://genia.app para seguir conversando.",
        plan, used, limit
    )
}

/// Run the inbound state machine for one message
pub async fn handle_inbound(
    state: &AppState,
    inbound: &TwilioInbound,
) -> anyhow::Result<WebhookOutcome> {
    let now = Utc::now();
    let from = strip_transport_prefix(&inbound.from).to_string();
    let to = strip_transport_prefix(&inbound.to).to_string();

    state.store.log_message(&MessageRecord {
        sid: inbound.message_sid.clone(),
        from_number: from.clone(),
        to_number: to.clone(),
        body: inbound.body.clone(),
        direction: Direction::Inbound,
        status: "received".to_string(),
        clone: None,
        created_at: now.timestamp(),
    })?;

    let user = match state.store.find_user_by_phone(&from)? {
        Some(user) => user,
        None => {
            let receipt = state
                .dispatcher
                .send_message(&from, &state.config.welcome_message)
                .await?;
            state.store.log_message(&MessageRecord {
                sid: receipt.id,
                from_number: state.dispatcher.sender_number().to_string(),
                to_number: from.clone(),
                body: state.config.welcome_message.clone(),
                direction: Direction::Outbound,
                status: receipt.status,
                clone: None,
                created_at: now.timestamp(),
            })?;

            info!(phone = %from, "unknown sender, welcome sent");
            return Ok(WebhookOutcome::WelcomeSent);
        }
    };

    let clone = classify(&inbound.body);
    let decision = state.quota.reserve(&user, MESSAGE_ACTION, clone, now)?;

    if !decision.allowed {
        // Only limited tiers can be denied
        let limit = decision.limit.unwrap_or(0);
        let notice = limit_notice(user.plan, decision.used, limit);

        let receipt = state.dispatcher.send_message(&from, &notice).await?;
        state.store.log_message(&MessageRecord {
            sid: receipt.id,
            from_number: state.dispatcher.sender_number().to_string(),
            to_number: from.clone(),
            body: notice,
            direction: Direction::Outbound,
            status: receipt.status,
            clone: None,
            created_at: now.timestamp(),
        })?;

        return Ok(WebhookOutcome::LimitExceeded {
            used: decision.used,
            limit,
        });
    }

    let reply = state.responder.respond(clone, &inbound.body).await?;
    let receipt = state.dispatcher.send_message(&from, &reply).await?;
    state.store.log_message(&MessageRecord {
        sid: receipt.id,
        from_number: state.dispatcher.sender_number().to_string(),
        to_number: from.clone(),
        body: reply.clone(),
        direction: Direction::Outbound,
        status: receipt.status,
        clone: Some(clone),
        created_at: now.timestamp(),
    })?;

    info!(
        user_id = user.id,
        clone = clone.as_str(),
        used = decision.used + 1,
        "message processed"
    );

    Ok(WebhookOutcome::Processed { clone, reply })
}

/// Webhook handler. Returns 200 on every handled branch, 500 with a
/// generic body on downstream failure - no other status codes.
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    Form(inbound): Form<TwilioInbound>,
) -> (StatusCode, Json<serde_json::Value>) {
    match handle_inbound(&state, &inbound).await {
        Ok(WebhookOutcome::Processed { clone, reply }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "action": "processed",
                "clone": clone.as_str(),
                "response": reply,
            })),
        ),
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "success": true, "action": outcome.action() })),
        ),
        Err(e) => {
            error!("Webhook handling failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            )
        }
    }
}

/// Create the webhook router
pub fn webhook_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .with_state(state)
}

impl TwilioInbound {
    /// Synthetic inbound message (used by tests)
    pub fn text(from: &str, to: &str, body: &str) -> Self {
        Self {
            message_sid: format!("SM{}", Uuid::new_v4().simple()),
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        }
    }
}
