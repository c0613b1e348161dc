//! Genia Gateway
//!
//! WhatsApp front door for the Genia assistant platform.
//!
//! # Features
//!
//! - **Clone Routing**: ordered keyword table mapping messages to assistant personas
//! - **Usage Quotas**: per-plan message allowances over a rolling 30-day window
//! - **Message Log**: append-only bidirectional history in SQLite
//! - **Billing**: Stripe checkout sessions and credit decrement endpoints
//!
//! # Architecture
//!
//! ```text
//! WhatsApp ──► Twilio webhook ──► Gateway ──► Twilio API
//!               (form POST)         │
//!                                   ├── Classifier (keyword table)
//!                                   ├── Quota (guarded insert, 30d window)
//!                                   ├── Store (SQLite: users/messages/actions)
//!                                   ├── Clones (stubbed generation seam)
//!                                   └── Billing (Stripe + auth capability)
//! ```

pub mod auth;
pub mod billing;
pub mod classifier;
pub mod clones;
pub mod config;
pub mod dispatch;
pub mod plans;
pub mod quota;
pub mod server;
pub mod store;
pub mod webhook;

pub use auth::{AuthError, AuthUser, HttpUserAuth, UserAuth};
pub use billing::{BillingError, CheckoutClient, CheckoutParams, StripeCheckout};
pub use classifier::classify;
pub use clones::{CloneKind, CloneResponder, StubResponder};
pub use config::Config;
pub use dispatch::{
    DispatchError, DispatchReceipt, MessageDispatcher, TwilioConfig, TwilioDispatcher,
};
pub use plans::PlanTier;
pub use quota::{QuotaDecision, QuotaEnforcer, MESSAGE_ACTION};
pub use server::{AppState, GatewayServer};
pub use store::{Direction, MessageRecord, RecordStore, UserRecord};
pub use webhook::{handle_inbound, TwilioInbound, WebhookOutcome};
